mod checkout;
mod errors;
mod store;
mod sync;

pub use checkout::subscribe_user_to_association;
pub use errors::MembershipError;
pub use store::{LockedSubscription, SubscriptionStore};
pub use sync::{sync_subscription, StripeSyncAdapter};
