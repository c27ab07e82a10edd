use crate::{
    association_membership::{StripeSyncAdapter, SubscriptionStore},
    customers::CustomersRepository,
};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub subscription_store: SubscriptionStore,
    pub customers: CustomersRepository,
    pub stripe_sync: StripeSyncAdapter,
}

impl AppState {
    pub fn new(db_pool: PgPool, stripe_sync: StripeSyncAdapter) -> Self {
        Self {
            subscription_store: SubscriptionStore::new(db_pool.clone()),
            customers: CustomersRepository::new(db_pool),
            stripe_sync,
        }
    }
}
