use crate::{
    app_state::AppState,
    association_membership::{subscribe_user_to_association, sync_subscription, MembershipError},
    authentication::AuthenticatedUser,
    domain::Subscription,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use uuid::Uuid;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/association/subscribe", post(subscribe))
        .route("/association/subscriptions/:subscription_id/sync", post(sync))
        .route("/association/customer-portal", get(customer_portal))
}

#[tracing::instrument(name = "Subscribe to association", skip(app_state, user), fields(user_id = %user.id))]
async fn subscribe(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<CheckoutResponse>, MembershipError> {
    let checkout_session_id = subscribe_user_to_association(
        &user,
        &app_state.customers,
        &app_state.subscription_store,
        &app_state.stripe_sync,
    )
    .await?;

    Ok(Json(CheckoutResponse {
        checkout_session_id,
    }))
}

#[tracing::instrument(name = "Sync subscription", skip(app_state))]
async fn sync(
    State(app_state): State<AppState>,
    Path(subscription_id): Path<Uuid>,
) -> Result<Json<Subscription>, MembershipError> {
    let subscription = sync_subscription(
        &app_state.subscription_store,
        &app_state.stripe_sync,
        subscription_id,
    )
    .await?;

    Ok(Json(subscription))
}

#[tracing::instrument(name = "Open customer portal", skip(app_state, user), fields(user_id = %user.id))]
async fn customer_portal(
    State(app_state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<CustomerPortalResponse>, MembershipError> {
    let customer = app_state
        .customers
        .get_for_user_id(user.id)
        .await?
        .ok_or(MembershipError::NotACustomer(user.id))?;

    let url = app_state
        .stripe_sync
        .retrieve_customer_portal_session_url(&customer.stripe_customer_id)
        .await?;

    Ok(Json(CustomerPortalResponse { url }))
}

#[derive(Serialize)]
struct CheckoutResponse {
    checkout_session_id: String,
}

#[derive(Serialize)]
struct CustomerPortalResponse {
    url: String,
}

impl IntoResponse for MembershipError {
    fn into_response(self) -> Response {
        match &self {
            Self::AlreadySubscribed | Self::NotACustomer(_) => tracing::info!("{}", self),
            _ => tracing::error!("{:#?}", self),
        }

        match self {
            Self::NotFound | Self::SubscriptionNotFound(_) | Self::NotACustomer(_) => {
                (StatusCode::NOT_FOUND, self.to_string()).into_response()
            }
            Self::OwnershipConflict { .. }
            | Self::AmbiguousMatch { .. }
            | Self::MultipleCustomersReturned(_)
            | Self::AlreadySubscribed => (StatusCode::CONFLICT, self.to_string()).into_response(),
            Self::ExternalServiceError(ref e) if e.is_timeout() => {
                StatusCode::GATEWAY_TIMEOUT.into_response()
            }
            Self::ExternalServiceError(_) | Self::UnknownSubscriptionStatus { .. } => {
                StatusCode::BAD_GATEWAY.into_response()
            }
            Self::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}
