use super::{StripeSubscription, SubscriptionStatus};
use serde::Serialize;
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, FromRow, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub stripe_subscription_id: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub status: SubscriptionStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub canceled_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Subscription {
    /// Folds the provider snapshot into the aggregate. The provider id is only
    /// recorded when none was known yet; an existing one is never replaced.
    pub fn sync_with_stripe_subscription(mut self, stripe: &StripeSubscription) -> Self {
        self.status = stripe.status;
        self.canceled_at = stripe.canceled_at;

        if self.stripe_subscription_id.is_none() {
            self.stripe_subscription_id = Some(stripe.id.clone());
        }

        self
    }

    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }
}
