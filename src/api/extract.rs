//! Request extractors and the small validation helpers handlers share.

use axum::{
    extract::{FromRequest, FromRequestParts, Multipart, Request},
    http::request::Parts,
};
use serde::Deserialize;

use super::response::{ApiError, ApiResult};
use crate::object_id::ObjectId;

/// Header carrying the authenticated user's id. Authentication itself happens
/// upstream; this service trusts the value it is handed.
pub const USER_ID_HEADER: &str = "x-user-id";

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_PAGE_LIMIT: u64 = 10;

/// JSON body whose rejections render as the error envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// Query string whose rejections render as the error envelope.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct QueryParams<T>(pub T);

/// Multipart body whose rejections render as the error envelope.
pub struct MultipartForm(pub Multipart);

impl<S: Send + Sync> FromRequest<S> for MultipartForm {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(Multipart::from_request(req, state).await?))
    }
}

/// The user on whose behalf a mutating request runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActingUser(pub ObjectId);

impl<S: Send + Sync> FromRequestParts<S> for ActingUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ApiError::unauthorized("Unauthorized request"))?;
        raw.parse()
            .map(Self)
            .map_err(|_| ApiError::unauthorized("Invalid user identity"))
    }
}

/// Parses a path identifier, reporting failures as "Invalid {entity} ID".
pub fn parse_id(raw: &str, entity: &str) -> ApiResult<ObjectId> {
    raw.trim().parse().map_err(|_| ApiError::invalid_id(entity))
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

impl Pagination {
    /// Returns `(page, limit)` with defaults applied. Both must be at least 1.
    pub fn resolve(&self) -> ApiResult<(u64, u64)> {
        let page = self.page.unwrap_or(DEFAULT_PAGE);
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if page == 0 {
            return Err(ApiError::bad_request("page must be at least 1"));
        }
        if limit == 0 {
            return Err(ApiError::bad_request("limit must be at least 1"));
        }
        Ok((page, limit))
    }
}

/// Trims `value` and rejects it when absent or blank with "{field} is required".
pub fn required_text(value: Option<String>, field: &str) -> ApiResult<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("{field} is required")))
}

/// Like [`required_text`], but only for fields the caller chose to send.
pub fn optional_text(value: Option<String>, field: &str) -> ApiResult<Option<String>> {
    match value {
        Some(value) => required_text(Some(value), field).map(Some),
        None => Ok(None),
    }
}

pub fn ensure_owner(owner: ObjectId, actor: ActingUser, entity: &str) -> ApiResult<()> {
    if owner == actor.0 {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!(
            "You are not allowed to modify this {entity}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{Request as HttpRequest, StatusCode};

    async fn acting_user_from(header: Option<&str>) -> Result<ActingUser, ApiError> {
        let mut builder = HttpRequest::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header(USER_ID_HEADER, value);
        }
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        ActingUser::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn acting_user_requires_a_valid_header() {
        let id = ObjectId::new();
        let user = acting_user_from(Some(&id.to_string())).await.unwrap();
        assert_eq!(user, ActingUser(id));

        for header in [None, Some(""), Some("not-an-id")] {
            let err = acting_user_from(header).await.unwrap_err();
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[test]
    fn parse_id_names_the_entity() {
        let err = parse_id("123", "playlist").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Invalid playlist ID");
        assert!(parse_id("65a1f0c2e4b0a1b2c3d4e5f6", "playlist").is_ok());
    }

    #[test]
    fn pagination_defaults_and_bounds() {
        assert_eq!(Pagination::default().resolve().unwrap(), (1, 10));
        let custom = Pagination {
            page: Some(3),
            limit: Some(25),
        };
        assert_eq!(custom.resolve().unwrap(), (3, 25));
        for bad in [
            Pagination {
                page: Some(0),
                limit: None,
            },
            Pagination {
                page: None,
                limit: Some(0),
            },
        ] {
            assert_eq!(bad.resolve().unwrap_err().status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn required_text_trims_and_rejects_blank() {
        assert_eq!(
            required_text(Some("  hi ".into()), "Content").unwrap(),
            "hi"
        );
        assert_eq!(
            required_text(Some("   ".into()), "Content")
                .unwrap_err()
                .message(),
            "Content is required"
        );
        assert!(required_text(None, "Content").is_err());
        assert_eq!(optional_text(None, "Name").unwrap(), None);
        assert!(optional_text(Some(String::new()), "Name").is_err());
    }

    #[test]
    fn ownership_is_enforced() {
        let owner = ObjectId::new();
        assert!(ensure_owner(owner, ActingUser(owner), "tweet").is_ok());
        let err = ensure_owner(owner, ActingUser(ObjectId::new()), "tweet").unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }
}
