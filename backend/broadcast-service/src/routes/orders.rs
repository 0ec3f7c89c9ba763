use actix_web::{post, web, HttpResponse};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::OrderUpdate;
use crate::state::AppState;

/// Internal callback from the order service as a purchase progresses.
#[post("/broadcasts/{broadcast_id}/orders/notify")]
pub async fn notify_order(
    path: web::Path<Uuid>,
    body: web::Json<OrderUpdate>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    state
        .orders
        .notify(path.into_inner(), body.into_inner())
        .await?;
    Ok(HttpResponse::Accepted().finish())
}
