use threadline_api::{Error as ApiError, Uuid};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl Error {
    pub fn auth_required() -> Error {
        Error::Api(ApiError::AuthRequired)
    }

    pub fn permission_denied() -> Error {
        Error::Api(ApiError::PermissionDenied)
    }

    pub fn uuid_already_used(uuid: Uuid) -> Error {
        Error::Api(ApiError::UuidAlreadyUsed(uuid))
    }

    /// The error as clients get to see it
    ///
    /// Every internal failure of this server is one of its database, so they all
    /// surface as `Persistence`. Their details only leave the logs in tests.
    pub fn into_api(self) -> ApiError {
        match self {
            Error::Api(err) => err,
            Error::Anyhow(err) => {
                tracing::error!(?err, "comment store failure");
                #[cfg(not(test))]
                let msg = String::from("comment store failure, see server logs for details");
                #[cfg(test)]
                let msg = format!("comment store failure: {err:?}");
                ApiError::Persistence(msg)
            }
        }
    }
}

impl axum::response::IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let err = self.into_api();
        let status = err.status_code();
        if status.is_client_error() {
            tracing::info!(%status, "rejecting request: {err}");
        }
        (status, err.contents()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_become_persistence_errors() {
        assert!(matches!(
            Error::Anyhow(anyhow::anyhow!("connection reset")).into_api(),
            ApiError::Persistence(msg) if msg.contains("connection reset")
        ));
        assert_eq!(
            Error::Api(ApiError::EmptyContent).into_api(),
            ApiError::EmptyContent
        );
    }

    #[test]
    fn responses_carry_the_api_status() {
        use axum::response::IntoResponse;
        assert_eq!(
            Error::auth_required().into_response().status(),
            axum::http::StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            Error::Anyhow(anyhow::anyhow!("pool timed out"))
                .into_response()
                .status(),
            axum::http::StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
