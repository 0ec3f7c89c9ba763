use actix_web::{get, web, HttpResponse};
use uuid::Uuid;

use crate::error::AppResult;
use crate::state::AppState;

#[get("/broadcasts/{broadcast_id}/replay")]
pub async fn get_replay(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let replay = state.replay.build_replay(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(replay))
}
