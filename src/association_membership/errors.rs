use crate::domain::UserId;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("Subscription {stripe_subscription_id} is assigned to another customer")]
    OwnershipConflict { stripe_subscription_id: String },
    #[error("Customer {stripe_customer_id} has more than one live Stripe subscription")]
    AmbiguousMatch { stripe_customer_id: String },
    #[error("No Stripe subscription found")]
    NotFound,
    #[error("Subscription {0} does not exist")]
    SubscriptionNotFound(Uuid),
    #[error("User {0} is not a customer")]
    NotACustomer(UserId),
    #[error("More than one Stripe customer is registered with {0}")]
    MultipleCustomersReturned(String),
    #[error("Stripe subscription {stripe_subscription_id} has unsupported status `{status}`")]
    UnknownSubscriptionStatus {
        stripe_subscription_id: String,
        status: String,
    },
    #[error("Stripe request failed")]
    ExternalServiceError(#[from] reqwest::Error),
    #[error("Customer already has an active subscription")]
    AlreadySubscribed,
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl MembershipError {
    /// Whether the caller may retry the operation later with backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ExternalServiceError(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|status| {
                        status.is_server_error() || status.as_u16() == 429
                    })
            }
            _ => false,
        }
    }
}

