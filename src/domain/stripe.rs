use super::{CustomerEmail, SubscriptionStatus};
use time::OffsetDateTime;

/// Provider-side snapshot of a subscription. Fetched fresh on every sync and
/// only ever folded into a [`super::Subscription`].
#[derive(Clone, Debug, PartialEq)]
pub struct StripeSubscription {
    pub id: String,
    pub status: SubscriptionStatus,
    pub customer_id: String,
    pub canceled_at: Option<OffsetDateTime>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StripeCustomer {
    pub id: String,
    pub email: CustomerEmail,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub customer_id: String,
    pub subscription_id: String,
}
