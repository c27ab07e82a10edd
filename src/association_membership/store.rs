use super::MembershipError;
use crate::domain::{
    Customer, NewSubscriptionInvoice, Subscription, SubscriptionInvoice, SubscriptionStatus,
};
use anyhow::{anyhow, Context};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

type PgTransaction = Transaction<'static, Postgres>;

/// Postgres-backed repository of [`Subscription`] aggregates. Every public
/// operation runs in its own transaction.
#[derive(Clone)]
pub struct SubscriptionStore {
    db_pool: PgPool,
}

impl SubscriptionStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    #[tracing::instrument(name = "Get subscription by Stripe subscription id", skip(self))]
    pub async fn get_by_provider_id(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<Subscription>, MembershipError> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, customer_id, stripe_subscription_id, stripe_customer_id,
                   status, canceled_at, created_at
            FROM subscriptions
            WHERE stripe_subscription_id = $1
            "#,
        )
        .bind(stripe_subscription_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to fetch subscription by Stripe subscription id")?;

        Ok(subscription)
    }

    #[tracing::instrument(name = "Get subscription by Stripe customer id", skip(self))]
    pub async fn get_by_stripe_customer_id(
        &self,
        stripe_customer_id: &str,
    ) -> Result<Option<Subscription>, MembershipError> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, customer_id, stripe_subscription_id, stripe_customer_id,
                   status, canceled_at, created_at
            FROM subscriptions
            WHERE stripe_customer_id = $1
            "#,
        )
        .bind(stripe_customer_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to fetch subscription by Stripe customer id")?;

        Ok(subscription)
    }

    #[tracing::instrument(name = "Get subscription of a customer", skip(self))]
    pub async fn get_by_customer(
        &self,
        customer_id: Uuid,
    ) -> Result<Option<Subscription>, MembershipError> {
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, customer_id, stripe_subscription_id, stripe_customer_id,
                   status, canceled_at, created_at
            FROM subscriptions
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to fetch subscription by customer id")?;

        Ok(subscription)
    }

    /// Returns the subscription known under `stripe_subscription_id`, creating
    /// a pending one for `customer` if there is none yet.
    #[tracing::instrument(
        name = "Get or create subscription",
        skip(self, customer),
        fields(customer_id = %customer.id)
    )]
    pub async fn get_or_create(
        &self,
        customer: &Customer,
        stripe_subscription_id: &str,
    ) -> Result<Subscription, MembershipError> {
        let mut transaction = self
            .db_pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let existing = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, customer_id, stripe_subscription_id, stripe_customer_id,
                   status, canceled_at, created_at
            FROM subscriptions
            WHERE stripe_subscription_id = $1
            FOR UPDATE
            "#,
        )
        .bind(stripe_subscription_id)
        .fetch_optional(&mut *transaction)
        .await
        .context("Failed to fetch subscription by Stripe subscription id")?;

        let subscription = match existing {
            Some(subscription) if subscription.customer_id != customer.id => {
                return Err(MembershipError::OwnershipConflict {
                    stripe_subscription_id: stripe_subscription_id.into(),
                });
            }
            Some(subscription) => subscription,
            None => insert_subscription(&mut transaction, customer, stripe_subscription_id).await?,
        };

        transaction
            .commit()
            .await
            .context("Failed to commit transaction")?;

        Ok(subscription)
    }

    /// Returns the subscription of `customer`, creating a pending one without a
    /// Stripe subscription id if the customer has none yet. Such a subscription
    /// can only be located in Stripe through the customer id.
    #[tracing::instrument(
        name = "Get or create pending subscription",
        skip(self, customer),
        fields(customer_id = %customer.id)
    )]
    pub async fn get_or_create_pending(
        &self,
        customer: &Customer,
    ) -> Result<Subscription, MembershipError> {
        let mut transaction = self
            .db_pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        // A concurrent insert for the same customer makes this a no-op; the
        // select below then reads the winner's row.
        let inserted = sqlx::query(
            r#"
            INSERT INTO subscriptions (id, customer_id, stripe_customer_id, status, created_at)
            VALUES ($1, $2, $3, $4, now())
            ON CONFLICT (customer_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(customer.id)
        .bind(&customer.stripe_customer_id)
        .bind(SubscriptionStatus::Pending.as_ref())
        .execute(&mut *transaction)
        .await
        .context("Failed to insert pending subscription")?;

        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, customer_id, stripe_subscription_id, stripe_customer_id,
                   status, canceled_at, created_at
            FROM subscriptions
            WHERE customer_id = $1
            "#,
        )
        .bind(customer.id)
        .fetch_one(&mut *transaction)
        .await
        .context("Failed to fetch subscription by customer id")?;

        transaction
            .commit()
            .await
            .context("Failed to commit transaction")?;

        if inserted.rows_affected() == 1 {
            tracing::info!(subscription_id = %subscription.id, "Created pending subscription");
        }

        Ok(subscription)
    }

    /// Persists the mutable fields of `subscription` and attaches
    /// `pending_invoices` to it, all in one transaction.
    #[tracing::instrument(
        name = "Save subscription",
        skip(self, subscription, pending_invoices),
        fields(subscription_id = %subscription.id, invoices = pending_invoices.len())
    )]
    pub async fn save(
        &self,
        subscription: &Subscription,
        pending_invoices: &[NewSubscriptionInvoice],
    ) -> Result<Subscription, MembershipError> {
        let mut transaction = self
            .db_pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let saved = save_subscription(&mut transaction, subscription, pending_invoices).await?;

        transaction
            .commit()
            .await
            .context("Failed to commit transaction")?;

        Ok(saved)
    }

    #[tracing::instrument(
        name = "Delete subscription",
        skip(self, subscription),
        fields(subscription_id = %subscription.id)
    )]
    pub async fn delete(&self, subscription: &Subscription) -> Result<(), MembershipError> {
        let result = sqlx::query(
            r#"
            DELETE FROM subscriptions
            WHERE id = $1
            "#,
        )
        .bind(subscription.id)
        .execute(&self.db_pool)
        .await
        .context("Failed to delete subscription")?;

        if result.rows_affected() == 0 {
            return Err(MembershipError::SubscriptionNotFound(subscription.id));
        }

        Ok(())
    }

    #[tracing::instrument(name = "Get invoice by Stripe invoice id", skip(self))]
    pub async fn get_invoice_by_stripe_invoice_id(
        &self,
        stripe_invoice_id: &str,
    ) -> Result<Option<SubscriptionInvoice>, MembershipError> {
        let invoice = sqlx::query_as::<_, SubscriptionInvoice>(
            r#"
            SELECT id, subscription_id, stripe_invoice_id, status,
                   payment_date, period_start, period_end, invoice_pdf
            FROM subscription_invoices
            WHERE stripe_invoice_id = $1
            "#,
        )
        .bind(stripe_invoice_id)
        .fetch_optional(&self.db_pool)
        .await
        .context("Failed to fetch invoice by Stripe invoice id")?;

        Ok(invoice)
    }

    /// Takes a row lock on the subscription until the returned guard is saved
    /// or dropped. Concurrent lockers of the same subscription wait.
    #[tracing::instrument(name = "Lock subscription", skip(self))]
    pub async fn lock(&self, subscription_id: Uuid) -> Result<LockedSubscription, MembershipError> {
        let mut transaction = self
            .db_pool
            .begin()
            .await
            .context("Failed to begin transaction")?;

        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            SELECT id, customer_id, stripe_subscription_id, stripe_customer_id,
                   status, canceled_at, created_at
            FROM subscriptions
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(&mut *transaction)
        .await
        .context("Failed to lock subscription")?
        .ok_or(MembershipError::SubscriptionNotFound(subscription_id))?;

        Ok(LockedSubscription {
            transaction,
            subscription,
        })
    }
}

/// A subscription read under a row lock. Nothing is written unless
/// [`LockedSubscription::save`] is called; dropping it rolls back.
pub struct LockedSubscription {
    transaction: PgTransaction,
    subscription: Subscription,
}

impl LockedSubscription {
    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    #[tracing::instrument(
        name = "Save locked subscription",
        skip_all,
        fields(subscription_id = %self.subscription.id)
    )]
    pub async fn save(
        mut self,
        subscription: &Subscription,
        pending_invoices: &[NewSubscriptionInvoice],
    ) -> Result<Subscription, MembershipError> {
        if subscription.id != self.subscription.id {
            return Err(anyhow!(
                "Subscription {} is not the locked subscription {}",
                subscription.id,
                self.subscription.id
            )
            .into());
        }

        let saved = save_subscription(&mut self.transaction, subscription, pending_invoices).await?;

        self.transaction
            .commit()
            .await
            .context("Failed to commit transaction")?;

        Ok(saved)
    }
}

#[tracing::instrument(skip_all)]
async fn insert_subscription(
    transaction: &mut PgTransaction,
    customer: &Customer,
    stripe_subscription_id: &str,
) -> Result<Subscription, MembershipError> {
    let subscription = sqlx::query_as::<_, Subscription>(
        r#"
        INSERT INTO subscriptions (
            id,
            customer_id,
            stripe_subscription_id,
            stripe_customer_id,
            status,
            created_at
        )
        VALUES ($1, $2, $3, $4, $5, now())
        RETURNING id, customer_id, stripe_subscription_id, stripe_customer_id,
                  status, canceled_at, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(customer.id)
    .bind(stripe_subscription_id)
    .bind(&customer.stripe_customer_id)
    .bind(SubscriptionStatus::Pending.as_ref())
    .fetch_one(&mut **transaction)
    .await
    .context("Failed to insert new subscription")?;

    tracing::info!(subscription_id = %subscription.id, "Created pending subscription");

    Ok(subscription)
}

#[tracing::instrument(skip_all)]
async fn save_subscription(
    transaction: &mut PgTransaction,
    subscription: &Subscription,
    pending_invoices: &[NewSubscriptionInvoice],
) -> Result<Subscription, MembershipError> {
    // `customer_id` is immutable and a known Stripe subscription id is never
    // overwritten.
    let saved = sqlx::query_as::<_, Subscription>(
        r#"
        UPDATE subscriptions
        SET
            stripe_subscription_id = COALESCE(stripe_subscription_id, $2),
            stripe_customer_id = $3,
            status = $4,
            canceled_at = $5
        WHERE id = $1
        RETURNING id, customer_id, stripe_subscription_id, stripe_customer_id,
                  status, canceled_at, created_at
        "#,
    )
    .bind(subscription.id)
    .bind(&subscription.stripe_subscription_id)
    .bind(&subscription.stripe_customer_id)
    .bind(subscription.status.as_ref())
    .bind(subscription.canceled_at)
    .fetch_optional(&mut **transaction)
    .await
    .context("Failed to update subscription")?
    .ok_or(MembershipError::SubscriptionNotFound(subscription.id))?;

    for invoice in pending_invoices {
        insert_invoice(transaction, saved.id, invoice).await?;
    }

    Ok(saved)
}

#[tracing::instrument(skip_all, fields(stripe_invoice_id = %invoice.stripe_invoice_id))]
async fn insert_invoice(
    transaction: &mut PgTransaction,
    subscription_id: Uuid,
    invoice: &NewSubscriptionInvoice,
) -> Result<(), MembershipError> {
    sqlx::query(
        r#"
        INSERT INTO subscription_invoices (
            id,
            subscription_id,
            stripe_invoice_id,
            status,
            payment_date,
            period_start,
            period_end,
            invoice_pdf
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(subscription_id)
    .bind(&invoice.stripe_invoice_id)
    .bind(invoice.status.as_ref())
    .bind(invoice.payment_date)
    .bind(invoice.period_start)
    .bind(invoice.period_end)
    .bind(&invoice.invoice_pdf)
    .execute(&mut **transaction)
    .await
    .context("Failed to insert subscription invoice")?;

    Ok(())
}
