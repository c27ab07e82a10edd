use crate::{
    association_membership::MembershipError,
    domain::{Customer, StripeCustomer, UserId},
};
use anyhow::{anyhow, Context};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Clone)]
pub struct CustomersRepository {
    db_pool: PgPool,
}

impl CustomersRepository {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    #[tracing::instrument(name = "Get customer of a user", skip(self))]
    pub async fn get_for_user_id(&self, user_id: UserId) -> Result<Option<Customer>, MembershipError> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT id, user_id, email, stripe_customer_id, created_at
            FROM customers
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to fetch customer by user id")?;

        Ok(customer)
    }

    /// Records the local customer of `user_id`. When a concurrent request
    /// registered the user first, that customer is returned instead.
    #[tracing::instrument(
        name = "Create customer for a user",
        skip(self, stripe_customer),
        fields(stripe_customer_id = %stripe_customer.id)
    )]
    pub async fn create_for_user(
        &self,
        user_id: UserId,
        stripe_customer: &StripeCustomer,
    ) -> Result<Customer, MembershipError> {
        let inserted = sqlx::query_as::<_, Customer>(
            r#"
            INSERT INTO customers (id, user_id, email, stripe_customer_id, created_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT DO NOTHING
            RETURNING id, user_id, email, stripe_customer_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(stripe_customer.email.as_ref())
        .bind(&stripe_customer.id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to insert new customer")?;

        if let Some(customer) = inserted {
            return Ok(customer);
        }

        tracing::warn!("Customer was registered concurrently, reading it back");

        let customer = self
            .get_for_user_id(user_id)
            .await?
            .ok_or_else(|| {
                anyhow!(
                    "Stripe customer {} is already registered for another user",
                    stripe_customer.id
                )
            })?;

        Ok(customer)
    }
}
