use axum::http::Uri;
use warden_core::AppError;

use crate::error::ApiError;

pub mod admin;
pub mod audit;
pub mod health;
pub mod invitations;
pub mod organizations;
pub mod pages;


/// Paths the guard lets through but nothing here serves, such as `/login`.
pub async fn not_found_handler(uri: Uri) -> ApiError {
    ApiError(AppError::NotFound(format!(
        "route '{}' does not exist",
        uri.path()
    )))
}
