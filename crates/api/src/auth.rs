//! Caller identity extraction.
//!
//! Authentication happens upstream; the authenticator forwards the verified
//! identity in the `x-user-id` and `x-user-role` headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use orders::{Caller, Role};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";

/// The authenticated caller of a request.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser(pub Caller);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?
            .to_str()
            .ok()
            .and_then(|value| value.trim().parse::<i64>().ok())
            .ok_or_else(|| ApiError::Unauthorized("Invalid user identity".to_string()))?;

        let role = match parts.headers.get(USER_ROLE_HEADER) {
            None => Role::User,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(|value| value.parse::<Role>().ok())
                .ok_or_else(|| ApiError::Unauthorized("Invalid user role".to_string()))?,
        };

        Ok(AuthenticatedUser(Caller {
            user_id: UserId::new(user_id),
            role,
        }))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(headers: &[(&str, &str)]) -> Result<Caller, ApiError> {
        let mut builder = Request::builder().uri("/orders/1");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        AuthenticatedUser::from_request_parts(&mut parts, &())
            .await
            .map(|AuthenticatedUser(caller)| caller)
    }

    #[tokio::test]
    async fn test_user_with_default_role() {
        let caller = extract(&[(USER_ID_HEADER, "42")]).await.unwrap();
        assert_eq!(caller, Caller::user(42));
    }

    #[tokio::test]
    async fn test_admin_role() {
        let caller = extract(&[(USER_ID_HEADER, "7"), (USER_ROLE_HEADER, "ADMIN")])
            .await
            .unwrap();
        assert!(caller.is_admin());
    }

    #[tokio::test]
    async fn test_missing_or_invalid_identity_is_unauthorized() {
        for headers in [
            vec![],
            vec![(USER_ID_HEADER, "abc")],
            vec![(USER_ID_HEADER, "1"), (USER_ROLE_HEADER, "SUPERUSER")],
        ] {
            let err = extract(&headers).await.unwrap_err();
            assert_eq!(err.kind(), "UNAUTHORIZED");
        }
    }
}
