use crate::domain::SubscriptionStatus;
use reqwest::{Client, Error};
use secrecy::{ExposeSecret, Secret};
use serde::{de::DeserializeOwned, Deserialize};
use std::time::Duration;
use time::OffsetDateTime;

/// Thin client over the Stripe REST API. Every call is bounded by the
/// timeout the client was built with.
#[derive(Clone)]
pub struct StripeClient {
    http_client: Client,
    base_url: String,
    secret_api_key: Secret<String>,
}

impl StripeClient {
    pub fn new(
        base_url: String,
        secret_api_key: Secret<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            base_url,
            secret_api_key,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn retrieve_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<SubscriptionObject, Error> {
        self.get(&format!("v1/subscriptions/{subscription_id}"), &[])
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_subscriptions(
        &self,
        customer_id: &str,
        status: SubscriptionStatus,
    ) -> Result<Vec<SubscriptionObject>, Error> {
        let list: List<SubscriptionObject> = self
            .get(
                "v1/subscriptions",
                &[("customer", customer_id), ("status", status.as_ref())],
            )
            .await?;

        Ok(list.data)
    }

    #[tracing::instrument(skip(self))]
    pub async fn list_customers(&self, email: &str) -> Result<Vec<CustomerObject>, Error> {
        let list: List<CustomerObject> = self.get("v1/customers", &[("email", email)]).await?;
        Ok(list.data)
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_customer(&self, email: &str) -> Result<CustomerObject, Error> {
        self.post("v1/customers", &[("email", email)]).await
    }

    #[tracing::instrument(skip(self, params))]
    pub async fn create_checkout_session(
        &self,
        params: &CheckoutSessionParams<'_>,
    ) -> Result<CheckoutSessionObject, Error> {
        let form = [
            ("success_url", params.success_url),
            ("cancel_url", params.cancel_url),
            ("payment_method_types[0]", "card"),
            ("mode", "subscription"),
            ("customer", params.customer_id),
            ("line_items[0][price]", params.price_id),
            ("line_items[0][quantity]", "1"),
        ];

        self.post("v1/checkout/sessions", &form).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_billing_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<BillingPortalSessionObject, Error> {
        self.post(
            "v1/billing_portal/sessions",
            &[("customer", customer_id), ("return_url", return_url)],
        )
        .await
    }

    async fn get<T>(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        self.http_client
            .get(self.url(endpoint))
            .bearer_auth(self.secret_api_key.expose_secret())
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    async fn post<T>(&self, endpoint: &str, form: &[(&str, &str)]) -> Result<T, Error>
    where
        T: DeserializeOwned,
    {
        self.http_client
            .post(self.url(endpoint))
            .bearer_auth(self.secret_api_key.expose_secret())
            .form(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url.trim_end_matches('/'))
    }
}

pub struct CheckoutSessionParams<'a> {
    pub customer_id: &'a str,
    pub price_id: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
}

#[derive(Deserialize)]
struct List<T> {
    data: Vec<T>,
}

/// Stripe's status is kept verbatim; statuses this service does not model,
/// such as `paused`, are rejected when the object is interpreted.
#[derive(Debug, Deserialize)]
pub struct SubscriptionObject {
    pub id: String,
    pub status: String,
    pub customer: String,
    #[serde(default, with = "time::serde::timestamp::option")]
    pub canceled_at: Option<OffsetDateTime>,
}

#[derive(Debug, Deserialize)]
pub struct CustomerObject {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckoutSessionObject {
    pub id: String,
    pub customer: Option<String>,
    pub subscription: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BillingPortalSessionObject {
    pub url: String,
}
