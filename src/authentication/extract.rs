use crate::domain::{CustomerEmail, UserId};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};

const USER_ID_HEADER: &str = "x-user-id";
const USER_EMAIL_HEADER: &str = "x-user-email";

/// The user the gateway authenticated for this request.
#[derive(Clone, Debug)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub email: CustomerEmail,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let id = header_value(&parts.headers, USER_ID_HEADER)
            .and_then(|value| match value.parse::<i64>() {
                Ok(id) => Some(UserId(id)),
                Err(e) => {
                    tracing::warn!("Failed to parse {USER_ID_HEADER}: {e:?}");
                    None
                }
            })
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let email = header_value(&parts.headers, USER_EMAIL_HEADER)
            .and_then(|value| match CustomerEmail::parse(value.to_string()) {
                Ok(email) => Some(email),
                Err(e) => {
                    tracing::warn!("Failed to parse {USER_EMAIL_HEADER}: {e}");
                    None
                }
            })
            .ok_or(StatusCode::UNAUTHORIZED)?;

        Ok(AuthenticatedUser { id, email })
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| match value.to_str() {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Failed to convert {name} to str: {e:?}");
            None
        }
    })
}
