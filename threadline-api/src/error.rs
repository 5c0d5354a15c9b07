use std::str::FromStr;

use anyhow::{anyhow, Context};
use serde_json::json;
use uuid::Uuid;

use crate::Time;

#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Storage unavailable: {0}")]
    Persistence(String),

    #[error("Sign-in required")]
    AuthRequired,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Uuid already used {0}")]
    UuidAlreadyUsed(Uuid),

    #[error("Unknown comment {0}")]
    UnknownComment(Uuid),

    #[error("Null byte in string is not allowed {0:?}")]
    NullByteInString(String),

    #[error("Invalid article slug {0:?}")]
    InvalidSlug(String),

    #[error("Invalid character in name {0:?}")]
    InvalidName(String),

    #[error("Comment is empty")]
    EmptyContent,

    #[error("Comment is too long ({0} characters)")]
    ContentTooLong(usize),

    #[error("Time is out of supported range {0}")]
    InvalidTime(Time),

    #[error("This store does not serve live comment feeds")]
    LiveFeedUnavailable,
}

impl Error {
    pub fn status_code(&self) -> http::StatusCode {
        use http::StatusCode;
        match self {
            Error::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Persistence(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::AuthRequired => StatusCode::UNAUTHORIZED,
            Error::PermissionDenied => StatusCode::FORBIDDEN,
            Error::UuidAlreadyUsed(_) => StatusCode::CONFLICT,
            Error::UnknownComment(_) => StatusCode::NOT_FOUND,
            Error::NullByteInString(_) => StatusCode::BAD_REQUEST,
            Error::InvalidSlug(_) => StatusCode::BAD_REQUEST,
            Error::InvalidName(_) => StatusCode::BAD_REQUEST,
            Error::EmptyContent => StatusCode::BAD_REQUEST,
            Error::ContentTooLong(_) => StatusCode::BAD_REQUEST,
            Error::InvalidTime(_) => StatusCode::BAD_REQUEST,
            Error::LiveFeedUnavailable => StatusCode::NOT_IMPLEMENTED,
        }
    }

    pub fn contents(&self) -> Vec<u8> {
        serde_json::to_vec(&match self {
            Error::Unknown(msg) => json!({
                "message": msg,
                "type": "unknown",
            }),
            Error::Persistence(msg) => json!({
                "message": msg,
                "type": "persistence",
            }),
            Error::AuthRequired => json!({
                "message": "sign-in required",
                "type": "auth-required",
            }),
            Error::PermissionDenied => json!({
                "message": "permission denied",
                "type": "permission-denied",
            }),
            Error::UuidAlreadyUsed(u) => json!({
                "message": "uuid conflict",
                "type": "conflict-uuid",
                "uuid": u,
            }),
            Error::UnknownComment(u) => json!({
                "message": "comment does not exist",
                "type": "unknown-comment",
                "uuid": u,
            }),
            Error::NullByteInString(s) => json!({
                "message": "there was a null byte in argument string",
                "type": "null-byte",
                "string": s,
            }),
            Error::InvalidSlug(s) => json!({
                "message": "article slug is not valid",
                "type": "invalid-slug",
                "slug": s,
            }),
            Error::InvalidName(n) => json!({
                "message": "there was an invalid character in a user name",
                "type": "invalid-name",
                "name": n,
            }),
            Error::EmptyContent => json!({
                "message": "comment is empty",
                "type": "empty-content",
            }),
            Error::ContentTooLong(len) => json!({
                "message": "comment is too long",
                "type": "content-too-long",
                "length": len,
            }),
            Error::InvalidTime(t) => json!({
                "message": "time is out of range",
                "type": "invalid-time",
                "time": t,
            }),
            Error::LiveFeedUnavailable => json!({
                "message": "live comment feeds are not served by this store",
                "type": "live-feed-unavailable",
            }),
        })
        .expect("serializing error contents")
    }

    pub fn parse(body: &[u8]) -> anyhow::Result<Error> {
        let data: serde_json::Value =
            serde_json::from_slice(body).context("parsing error contents")?;
        let str_field = |field: &str| -> anyhow::Result<String> {
            data.get(field)
                .and_then(|s| s.as_str())
                .map(String::from)
                .ok_or_else(|| anyhow!("error contents has no string field {field:?}"))
        };
        let uuid_field = || -> anyhow::Result<Uuid> {
            data.get("uuid")
                .and_then(|uuid| uuid.as_str())
                .and_then(|uuid| Uuid::from_str(uuid).ok())
                .ok_or_else(|| anyhow!("error is about a uuid but has no proper uuid"))
        };
        Ok(
            match data
                .get("type")
                .and_then(|t| t.as_str())
                .ok_or_else(|| anyhow!("error type is not a string"))?
            {
                "unknown" => Error::Unknown(str_field("message").unwrap_or_default()),
                "persistence" => Error::Persistence(str_field("message").unwrap_or_default()),
                "auth-required" => Error::AuthRequired,
                "permission-denied" => Error::PermissionDenied,
                "conflict-uuid" => Error::UuidAlreadyUsed(uuid_field()?),
                "unknown-comment" => Error::UnknownComment(uuid_field()?),
                "null-byte" => Error::NullByteInString(str_field("string")?),
                "invalid-slug" => Error::InvalidSlug(str_field("slug")?),
                "invalid-name" => Error::InvalidName(str_field("name")?),
                "empty-content" => Error::EmptyContent,
                "content-too-long" => Error::ContentTooLong(
                    data.get("length")
                        .and_then(|l| l.as_u64())
                        .ok_or_else(|| anyhow!("error is about a length but has no length"))?
                        as usize,
                ),
                "invalid-time" => Error::InvalidTime(
                    serde_json::from_value(
                        data.get("time")
                            .cloned()
                            .ok_or_else(|| anyhow!("error is about a time but has no time"))?,
                    )
                    .context("parsing time of invalid-time error")?,
                ),
                "live-feed-unavailable" => Error::LiveFeedUnavailable,
                _ => return Err(anyhow!("error contents has unknown type")),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_survive_the_wire() {
        let errors = [
            Error::Unknown(String::from("boom")),
            Error::Persistence(String::from("database is down")),
            Error::AuthRequired,
            Error::PermissionDenied,
            Error::UuidAlreadyUsed(Uuid::new_v4()),
            Error::UnknownComment(Uuid::new_v4()),
            Error::NullByteInString(String::from("a\0")),
            Error::InvalidSlug(String::from("A B")),
            Error::InvalidName(String::from(" x")),
            Error::EmptyContent,
            Error::ContentTooLong(12345),
            Error::InvalidTime(crate::now()),
            Error::LiveFeedUnavailable,
        ];
        for e in errors {
            assert_eq!(Error::parse(&e.contents()).unwrap(), e);
        }
    }

    #[test]
    fn unparseable_error_bodies() {
        assert!(Error::parse(b"not json").is_err());
        assert!(Error::parse(br#"{"type": "martian"}"#).is_err());
        assert!(Error::parse(br#"{"type": "conflict-uuid"}"#).is_err());
    }

    #[test]
    fn auth_statuses() {
        assert_eq!(Error::AuthRequired.status_code(), http::StatusCode::UNAUTHORIZED);
        assert_eq!(Error::PermissionDenied.status_code(), http::StatusCode::FORBIDDEN);
    }
}
