use super::{MembershipError, StripeSyncAdapter, SubscriptionStore};
use crate::{authentication::AuthenticatedUser, customers::CustomersRepository};

/// Starts a membership checkout for `user` and returns the Stripe checkout
/// session id the frontend redirects to.
///
/// The user's subscription is created as pending on the first checkout and
/// reused afterwards.
#[tracing::instrument(
    name = "Subscribe user to association",
    skip(user, customers, subscriptions, stripe_sync),
    fields(user_id = %user.id),
    err
)]
pub async fn subscribe_user_to_association(
    user: &AuthenticatedUser,
    customers: &CustomersRepository,
    subscriptions: &SubscriptionStore,
    stripe_sync: &StripeSyncAdapter,
) -> Result<String, MembershipError> {
    let customer = match customers.get_for_user_id(user.id).await? {
        Some(customer) => customer,
        None => {
            let stripe_customer = stripe_sync
                .get_or_create_customer_by_email(&user.email)
                .await?;
            customers.create_for_user(user.id, &stripe_customer).await?
        }
    };

    let subscription = subscriptions.get_or_create_pending(&customer).await?;
    if subscription.is_active() {
        return Err(MembershipError::AlreadySubscribed);
    }

    let checkout_session = stripe_sync
        .create_checkout_session(&customer.stripe_customer_id)
        .await?;

    Ok(checkout_session.id)
}
