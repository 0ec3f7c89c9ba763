use actix_web::{web, App, HttpServer};
use broadcast_service::collab::{
    HttpAuthVerifier, HttpBroadcastDirectory, HttpOrderLedger, HttpRecordingProvider,
};
use broadcast_service::services::{
    ChatService, OfferService, OrderNotifier, PresenceService, RedisRateLimiter, ReplayService,
    TimelineService,
};
use broadcast_service::store::{PgOfferStore, RedisPresenceStore};
use broadcast_service::websocket::{session, FanoutHub, RoomRegistry};
use broadcast_service::{config, db, error, jobs, logging, redis_client::RedisClient, routes,
                        state::AppState};
use idempotency::{IdempotencyGuard, RedisIdempotencyStore};
use std::sync::Arc;
use std::time::Duration;
use timeline_store::PostgresTimelineStore;

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let pool = db::init_pool(&cfg.database_url)
        .await
        .map_err(|e| error::AppError::StartServer(format!("db: {e}")))?;

    let redis = RedisClient::from_url(&cfg.redis_url)
        .await
        .map_err(|e| error::AppError::StartServer(format!("redis: {e}")))?;

    let registry = RoomRegistry::new();
    let hub = FanoutHub::new(registry, Some(redis.clone()));

    let guard = IdempotencyGuard::new(
        Arc::new(RedisIdempotencyStore::new(redis.manager())),
        Duration::from_secs(cfg.idempotency_ttl_seconds),
    );

    let auth = Arc::new(HttpAuthVerifier::new(cfg.auth_service_url.clone()));
    let directory = Arc::new(HttpBroadcastDirectory::new(cfg.broadcast_service_url.clone()));
    let orders_ledger = Arc::new(HttpOrderLedger::new(cfg.order_service_url.clone()));
    let recordings = Arc::new(HttpRecordingProvider::new(cfg.recording_service_url.clone()));

    let timeline_store = Arc::new(PostgresTimelineStore::new(pool.clone()));
    let timeline = Arc::new(TimelineService::new(
        timeline_store.clone(),
        guard.clone(),
        directory.clone(),
        hub.clone(),
    ));
    let offers = Arc::new(OfferService::new(
        Arc::new(PgOfferStore::new(pool.clone())),
        guard.clone(),
        directory.clone(),
        orders_ledger,
        timeline.clone(),
    ));
    let presence = Arc::new(PresenceService::new(
        Arc::new(RedisPresenceStore::new(redis.manager())),
        hub.clone(),
    ));
    let chat = Arc::new(ChatService::new(
        guard.clone(),
        directory.clone(),
        Arc::new(RedisRateLimiter::new(
            redis.manager(),
            cfg.chat_rate_limit_max,
            Duration::from_secs(cfg.chat_rate_limit_window_seconds),
        )),
        timeline.clone(),
        hub.clone(),
    ));
    let replay = Arc::new(ReplayService::new(
        timeline_store,
        directory.clone(),
        recordings,
    ));
    let order_notifier = Arc::new(OrderNotifier::new(timeline.clone(), hub.clone()));

    let state = AppState {
        config: cfg.clone(),
        timeline,
        offers: offers.clone(),
        presence,
        chat,
        replay,
        orders: order_notifier,
        auth,
        directory,
        hub: hub.clone(),
    };

    // Cross-instance fan-out listener.
    tokio::spawn(hub.clone().run_listener(redis.clone()));

    // Durable offer expiry sweep.
    tokio::spawn(jobs::offer_expiry::run_sweeper(
        offers,
        Duration::from_secs(cfg.offer_sweep_interval_seconds),
    ));

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting broadcast-service");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .service(
                web::scope("/api/v1")
                    .service(routes::timeline::append_event)
                    .service(routes::timeline::list_events)
                    .service(routes::timeline::list_events_since)
                    .service(routes::timeline::list_chapters)
                    .service(routes::offers::create_offer)
                    .service(routes::offers::list_offers)
                    .service(routes::offers::active_offer)
                    .service(routes::offers::get_offer)
                    .service(routes::offers::open_offer)
                    .service(routes::offers::close_offer)
                    .service(routes::offers::pause_offer)
                    .service(routes::offers::claim_offer)
                    .service(routes::presence::current_presence)
                    .service(routes::presence::join_presence)
                    .service(routes::presence::leave_presence)
                    .service(routes::presence::reset_presence)
                    .service(routes::replay::get_replay)
                    .service(routes::orders::notify_order),
            )
            .route("/ws", web::get().to(session::ws_handler))
            .route("/health", web::get().to(|| async { "OK" }))
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("run: {e}")))
}
