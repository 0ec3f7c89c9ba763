use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use serde_json::json;
use uuid::Uuid;

use super::authenticate;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[get("/broadcasts/{broadcast_id}/presence")]
pub async fn current_presence(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let count = state.presence.current(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "count": count })))
}

/// Fallback for clients that cannot hold a socket (the socket lifecycle
/// joins and leaves automatically).
#[post("/broadcasts/{broadcast_id}/presence/join")]
pub async fn join_presence(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let count = state.presence.join(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "count": count })))
}

#[post("/broadcasts/{broadcast_id}/presence/leave")]
pub async fn leave_presence(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let count = state.presence.leave(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "count": count })))
}

/// Host-only: clears the counter when the broadcast ends.
#[delete("/broadcasts/{broadcast_id}/presence")]
pub async fn reset_presence(
    req: HttpRequest,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let broadcast_id = path.into_inner();
    let identity = authenticate(&req, &state).await?;
    let info = state
        .directory
        .get(broadcast_id)
        .await
        .ok_or(AppError::NotFound)?;
    if info.host_id != identity.user_id {
        return Err(AppError::Forbidden);
    }
    state.presence.reset(broadcast_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
