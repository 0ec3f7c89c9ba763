use actix_web::HttpRequest;

use crate::collab::Identity;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub mod offers;
pub mod orders;
pub mod presence;
pub mod replay;
pub mod timeline;

/// Resolve the caller's identity from the `Authorization: Bearer`
/// header via the auth collaborator.
pub async fn authenticate(req: &HttpRequest, state: &AppState) -> AppResult<Identity> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;
    state.auth.verify(token).await.ok_or(AppError::Unauthorized)
}
