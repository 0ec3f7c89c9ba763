use actix_web::{get, post, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use uuid::Uuid;

use super::authenticate;
use crate::error::AppResult;
use crate::models::NewOffer;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateOfferBody {
    pub product_id: Uuid,
    pub product_name: String,
    #[serde(default)]
    pub product_image_url: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub offer_price: f64,
    #[serde(default)]
    pub original_price: Option<f64>,
    #[serde(default)]
    pub discount_percent: Option<i32>,
    #[serde(default)]
    pub quantity_limit: Option<i32>,
    #[serde(default)]
    pub time_limit_seconds: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct TransitionBody {
    pub idempotency_key: String,
}

#[post("/broadcasts/{broadcast_id}/offers")]
pub async fn create_offer(
    req: HttpRequest,
    path: web::Path<Uuid>,
    body: web::Json<CreateOfferBody>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let identity = authenticate(&req, &state).await?;
    let body = body.into_inner();
    let offer = state
        .offers
        .create(
            identity.user_id,
            NewOffer {
                broadcast_id: path.into_inner(),
                product_id: body.product_id,
                product_name: body.product_name,
                product_image_url: body.product_image_url,
                title: body.title,
                description: body.description,
                offer_price: body.offer_price,
                original_price: body.original_price,
                discount_percent: body.discount_percent,
                quantity_limit: body.quantity_limit,
                time_limit_seconds: body.time_limit_seconds,
            },
        )
        .await?;
    Ok(HttpResponse::Created().json(offer))
}

#[get("/broadcasts/{broadcast_id}/offers")]
pub async fn list_offers(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let offers = state.offers.list_for_broadcast(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(offers))
}

#[get("/broadcasts/{broadcast_id}/offers/active")]
pub async fn active_offer(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let offer = state.offers.find_active(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(offer))
}

#[get("/offers/{offer_id}")]
pub async fn get_offer(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let offer = state.offers.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(offer))
}

#[post("/offers/{offer_id}/open")]
pub async fn open_offer(
    req: HttpRequest,
    path: web::Path<Uuid>,
    body: web::Json<TransitionBody>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let identity = authenticate(&req, &state).await?;
    let offer = state
        .offers
        .open(path.into_inner(), identity.user_id, &body.idempotency_key)
        .await?;
    Ok(HttpResponse::Ok().json(offer))
}

#[post("/offers/{offer_id}/close")]
pub async fn close_offer(
    req: HttpRequest,
    path: web::Path<Uuid>,
    body: web::Json<TransitionBody>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let identity = authenticate(&req, &state).await?;
    let offer = state
        .offers
        .close(path.into_inner(), identity.user_id, &body.idempotency_key)
        .await?;
    Ok(HttpResponse::Ok().json(offer))
}

#[post("/offers/{offer_id}/pause")]
pub async fn pause_offer(
    req: HttpRequest,
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let identity = authenticate(&req, &state).await?;
    let offer = state
        .offers
        .pause(path.into_inner(), identity.user_id)
        .await?;
    Ok(HttpResponse::Ok().json(offer))
}

/// Called by the payment flow while creating an order. The outcome
/// tells the caller whether a unit was reserved.
#[post("/offers/{offer_id}/claim")]
pub async fn claim_offer(
    path: web::Path<Uuid>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let outcome = state.offers.claim(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(outcome))
}
