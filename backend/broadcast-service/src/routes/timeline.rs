use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use timeline_store::EventPayload;
use uuid::Uuid;

use super::authenticate;
use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AppendRequest {
    #[serde(flatten)]
    pub event: EventPayload,
    pub idempotency_key: String,
    /// Broadcast-relative milliseconds; computed server-side when
    /// omitted (manual corrections may supply it).
    #[serde(default)]
    pub timestamp_ms: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    500
}

#[post("/broadcasts/{broadcast_id}/timeline")]
pub async fn append_event(
    req: HttpRequest,
    path: web::Path<Uuid>,
    body: web::Json<AppendRequest>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let broadcast_id = path.into_inner();
    let identity = authenticate(&req, &state).await?;
    let body = body.into_inner();

    let event = state
        .timeline
        .append_from_host(
            broadcast_id,
            identity.user_id,
            body.event,
            &body.idempotency_key,
            body.timestamp_ms,
        )
        .await?;
    Ok(HttpResponse::Created().json(event))
}

#[get("/broadcasts/{broadcast_id}/timeline")]
pub async fn list_events(
    path: web::Path<Uuid>,
    query: web::Query<ListQuery>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let events = state
        .timeline
        .list(path.into_inner(), query.limit, query.offset)
        .await?;
    Ok(HttpResponse::Ok().json(events))
}

#[get("/broadcasts/{broadcast_id}/timeline/since/{event_id}")]
pub async fn list_events_since(
    path: web::Path<(Uuid, Uuid)>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let (broadcast_id, event_id) = path.into_inner();
    let events = state.timeline.list_since(broadcast_id, event_id).await?;
    Ok(HttpResponse::Ok().json(events))
}

#[get("/broadcasts/{broadcast_id}/chapters")]
pub async fn list_chapters(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let chapters = state.timeline.chapters(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(chapters))
}
