use axum::http::StatusCode;
use thiserror::Error;

/// Failures surfaced by the repository, auth session and store.
///
/// Reads that find nothing return `Ok(None)`; only writes against a missing
/// entity produce the `*NotFound` variants.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("calendar {calendar_id} already has a check-in for {date}")]
    DuplicateCheckIn { calendar_id: String, date: String },

    #[error("calendar {0} not found")]
    CalendarNotFound(String),

    #[error("record {0} not found")]
    RecordNotFound(String),

    #[error("not signed in")]
    NotAuthenticated,

    #[error("auth error: {0}")]
    Auth(String),

    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        let status = match &err {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::DuplicateCheckIn { .. } => StatusCode::CONFLICT,
            Error::CalendarNotFound(_) | Error::RecordNotFound(_) => StatusCode::NOT_FOUND,
            Error::NotAuthenticated | Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::Backend { .. } | Error::Http(_) => StatusCode::BAD_GATEWAY,
            Error::Config(_) | Error::Io(_) | Error::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, self.message).into_response()
    }
}
