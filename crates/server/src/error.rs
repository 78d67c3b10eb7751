use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};

#[derive(Debug)]
pub enum AppError {
    /// Poll or choice identifier does not resolve.
    NotFound(String),
    /// Poll is outside its voting window.
    VotingClosed,
    /// No choice submitted, or the choice belongs to another poll. The vote
    /// handler intercepts this to re-render the form; a 400 is the fallback.
    InvalidChoice(String),
    Unauthorized,
    BadRequest(String),
    Database(sqlx::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err)
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppError::NotFound(msg)
            | AppError::InvalidChoice(msg)
            | AppError::BadRequest(msg) => write!(f, "{msg}"),
            AppError::VotingClosed => write!(f, "voting is not allowed on this poll"),
            AppError::Unauthorized => write!(f, "authentication required"),
            AppError::Database(err) => write!(f, "database error: {err}"),
        }
    }
}

impl std::error::Error for AppError {}

/// 303 redirect carrying a flash message the target page echoes back.
pub fn redirect_with_flash(path: &str, message: &str) -> Response {
    let location = format!("{path}?flash={}", urlencoding::encode(message));
    Redirect::to(&location).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            AppError::NotFound(msg) => redirect_with_flash("/polls", &msg),
            AppError::VotingClosed => {
                redirect_with_flash("/polls", "Voting is not allowed on this poll")
            }
            AppError::Unauthorized => redirect_with_flash("/auth/login", "Please log in first"),
            AppError::InvalidChoice(msg) | AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, msg).into_response()
            }
            AppError::Database(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
                    .into_response()
            }
        }
    }
}
