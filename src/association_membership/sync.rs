use super::{MembershipError, SubscriptionStore};
use crate::{
    domain::{
        CustomerEmail, StripeCheckoutSession, StripeCustomer, StripeSubscription, Subscription,
        SubscriptionStatus,
    },
    stripe_client::{CheckoutSessionParams, StripeClient, SubscriptionObject},
};
use uuid::Uuid;

/// Reconciles local subscriptions with the subscriptions Stripe holds.
#[derive(Clone)]
pub struct StripeSyncAdapter {
    stripe_client: StripeClient,
    subscription_price_id: String,
    domain_url: String,
}

impl StripeSyncAdapter {
    pub fn new(stripe_client: StripeClient, subscription_price_id: String, domain_url: String) -> Self {
        Self {
            stripe_client,
            subscription_price_id,
            domain_url,
        }
    }

    /// Fetches the authoritative Stripe state of `subscription` and merges it
    /// in. The result is not persisted.
    #[tracing::instrument(
        name = "Sync subscription with Stripe",
        skip(self, subscription),
        fields(subscription_id = %subscription.id),
        err
    )]
    pub async fn sync(&self, subscription: Subscription) -> Result<Subscription, MembershipError> {
        let stripe_subscription = match (
            &subscription.stripe_subscription_id,
            &subscription.stripe_customer_id,
        ) {
            (Some(stripe_subscription_id), _) => {
                let object = self
                    .stripe_client
                    .retrieve_subscription(stripe_subscription_id)
                    .await?;
                Some(into_stripe_subscription(object)?)
            }
            (None, Some(stripe_customer_id)) => {
                self.find_live_subscription(stripe_customer_id).await?
            }
            (None, None) => {
                tracing::warn!("Subscription has neither a Stripe subscription nor customer id");
                None
            }
        };

        let stripe_subscription = stripe_subscription.ok_or(MembershipError::NotFound)?;

        tracing::info!(
            stripe_subscription_id = %stripe_subscription.id,
            status = stripe_subscription.status.as_ref(),
            "Merging Stripe subscription"
        );

        Ok(subscription.sync_with_stripe_subscription(&stripe_subscription))
    }

    async fn find_live_subscription(
        &self,
        stripe_customer_id: &str,
    ) -> Result<Option<StripeSubscription>, MembershipError> {
        let candidates = self
            .stripe_client
            .list_subscriptions(stripe_customer_id, SubscriptionStatus::Active)
            .await?
            .into_iter()
            .map(into_stripe_subscription)
            .collect::<Result<Vec<_>, _>>()?;

        select_candidate(stripe_customer_id, candidates)
    }

    #[tracing::instrument(name = "Get or create Stripe customer", skip(self), err)]
    pub async fn get_or_create_customer_by_email(
        &self,
        email: &CustomerEmail,
    ) -> Result<StripeCustomer, MembershipError> {
        let mut customers = self.stripe_client.list_customers(email.as_ref()).await?;

        if customers.len() > 1 {
            return Err(MembershipError::MultipleCustomersReturned(email.to_string()));
        }

        let customer = match customers.pop() {
            Some(customer) => customer,
            None => self.stripe_client.create_customer(email.as_ref()).await?,
        };

        Ok(StripeCustomer {
            id: customer.id,
            email: email.clone(),
        })
    }

    #[tracing::instrument(name = "Create Stripe checkout session", skip(self), err)]
    pub async fn create_checkout_session(
        &self,
        stripe_customer_id: &str,
    ) -> Result<StripeCheckoutSession, MembershipError> {
        let session = self
            .stripe_client
            .create_checkout_session(&CheckoutSessionParams {
                customer_id: stripe_customer_id,
                price_id: &self.subscription_price_id,
                success_url: &self.domain_url,
                cancel_url: &self.domain_url,
            })
            .await?;

        tracing::info!(checkout_session_id = %session.id, "Created checkout session");

        Ok(StripeCheckoutSession {
            id: session.id,
            customer_id: session.customer.unwrap_or_default(),
            subscription_id: session.subscription.unwrap_or_default(),
        })
    }

    #[tracing::instrument(name = "Create Stripe customer portal session", skip(self), err)]
    pub async fn retrieve_customer_portal_session_url(
        &self,
        stripe_customer_id: &str,
    ) -> Result<String, MembershipError> {
        let session = self
            .stripe_client
            .create_billing_portal_session(stripe_customer_id, &self.domain_url)
            .await?;

        Ok(session.url)
    }
}

/// `pending` is local bookkeeping; Stripe never reports it.
fn into_stripe_subscription(
    object: SubscriptionObject,
) -> Result<StripeSubscription, MembershipError> {
    let status = SubscriptionStatus::try_from(object.status.clone())
        .ok()
        .filter(|status| *status != SubscriptionStatus::Pending);

    match status {
        Some(status) => Ok(StripeSubscription {
            id: object.id,
            status,
            customer_id: object.customer,
            canceled_at: object.canceled_at,
        }),
        None => Err(MembershipError::UnknownSubscriptionStatus {
            stripe_subscription_id: object.id,
            status: object.status,
        }),
    }
}

/// Picks the subscription to reconcile with out of those Stripe listed as
/// active for a customer. Terminal ones never block the choice; two or more
/// live ones do.
fn select_candidate(
    stripe_customer_id: &str,
    mut candidates: Vec<StripeSubscription>,
) -> Result<Option<StripeSubscription>, MembershipError> {
    if candidates.len() <= 1 {
        return Ok(candidates.pop());
    }

    let mut live: Vec<_> = candidates
        .into_iter()
        .filter(|candidate| !candidate.status.is_terminal())
        .collect();

    match live.len() {
        0 | 1 => Ok(live.pop()),
        _ => Err(MembershipError::AmbiguousMatch {
            stripe_customer_id: stripe_customer_id.into(),
        }),
    }
}

/// Runs one fetch-merge-save cycle while holding the subscription's row lock,
/// so concurrent syncs of the same subscription are serialized and a failed
/// sync leaves no trace.
#[tracing::instrument(name = "Sync and persist subscription", skip(store, adapter), err)]
pub async fn sync_subscription(
    store: &SubscriptionStore,
    adapter: &StripeSyncAdapter,
    subscription_id: Uuid,
) -> Result<Subscription, MembershipError> {
    let locked = store.lock(subscription_id).await?;
    let synced = adapter.sync(locked.subscription().clone()).await?;
    locked.save(&synced, &[]).await
}
