//! Offer persistence. Every transition that races with another writer
//! is a single conditional statement (or one transaction), so the
//! database is the arbiter: at most one active offer per broadcast,
//! and claims can never push `quantity_claimed` past the limit.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use std::sync::Mutex;
use timeline_store::CloseReason;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{ClaimOutcome, NewOffer, Offer, OfferStatus};

#[async_trait]
pub trait OfferStore: Send + Sync {
    async fn create(&self, input: NewOffer) -> AppResult<Offer>;
    async fn get(&self, offer_id: Uuid) -> AppResult<Option<Offer>>;
    async fn list_for_broadcast(&self, broadcast_id: Uuid) -> AppResult<Vec<Offer>>;
    async fn find_active(&self, broadcast_id: Uuid) -> AppResult<Option<Offer>>;

    /// `pending|paused -> active`. Force-closes any other active offer
    /// for the broadcast first, then stamps `opened_at` and
    /// `expires_at`. Displaced offers are returned so the caller can
    /// announce their closure.
    async fn activate(&self, offer_id: Uuid, now: DateTime<Utc>)
        -> AppResult<(Offer, Vec<Offer>)>;

    /// `active -> paused`.
    async fn pause(&self, offer_id: Uuid) -> AppResult<Offer>;

    /// `active -> closed` with the given reason. Returns `None` when
    /// the offer is not currently active, so a repeated close (or a
    /// sweep racing a manual close) is a clean no-op.
    async fn close_if_active(
        &self,
        offer_id: Uuid,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Offer>>;

    /// One claim attempt. Succeeds only while the offer is active and
    /// under its limit.
    async fn claim_one(&self, offer_id: Uuid) -> AppResult<ClaimOutcome>;

    /// Active offers whose window has elapsed.
    async fn due_expiries(&self, now: DateTime<Utc>) -> AppResult<Vec<Offer>>;
}

fn expires_at_for(opened_at: DateTime<Utc>, time_limit_seconds: Option<i32>) -> Option<DateTime<Utc>> {
    time_limit_seconds.map(|s| opened_at + Duration::seconds(s.into()))
}

fn outcome_from(offer: &Offer, success: bool) -> ClaimOutcome {
    let remaining = offer.quantity_remaining();
    ClaimOutcome {
        success,
        quantity_claimed: offer.quantity_claimed,
        quantity_limit: offer.quantity_limit,
        quantity_remaining: remaining,
        sold_out: success && remaining == Some(0),
    }
}

// ---------------------------------------------------------------------------
// Postgres
// ---------------------------------------------------------------------------

const OFFER_COLUMNS: &str = "id, broadcast_id, product_id, product_name, product_image_url, \
                             title, description, offer_price, original_price, discount_percent, \
                             quantity_limit, quantity_claimed, time_limit_seconds, status, \
                             close_reason, opened_at, closed_at, expires_at, created_at";

pub struct PgOfferStore {
    pool: PgPool,
}

impl PgOfferStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OfferStore for PgOfferStore {
    async fn create(&self, input: NewOffer) -> AppResult<Offer> {
        let row: OfferRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO offers
                (id, broadcast_id, product_id, product_name, product_image_url,
                 title, description, offer_price, original_price, discount_percent,
                 quantity_limit, time_limit_seconds)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {OFFER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(input.broadcast_id)
        .bind(input.product_id)
        .bind(&input.product_name)
        .bind(&input.product_image_url)
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.offer_price)
        .bind(input.original_price)
        .bind(input.discount_percent)
        .bind(input.quantity_limit)
        .bind(input.time_limit_seconds)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get(&self, offer_id: Uuid) -> AppResult<Option<Offer>> {
        let row: Option<OfferRow> =
            sqlx::query_as(&format!("SELECT {OFFER_COLUMNS} FROM offers WHERE id = $1"))
                .bind(offer_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_for_broadcast(&self, broadcast_id: Uuid) -> AppResult<Vec<Offer>> {
        let rows: Vec<OfferRow> = sqlx::query_as(&format!(
            "SELECT {OFFER_COLUMNS} FROM offers WHERE broadcast_id = $1 ORDER BY created_at"
        ))
        .bind(broadcast_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn find_active(&self, broadcast_id: Uuid) -> AppResult<Option<Offer>> {
        let row: Option<OfferRow> = sqlx::query_as(&format!(
            "SELECT {OFFER_COLUMNS} FROM offers WHERE broadcast_id = $1 AND status = 'active'"
        ))
        .bind(broadcast_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn activate(
        &self,
        offer_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<(Offer, Vec<Offer>)> {
        let mut tx: Transaction<'_, Postgres> = self.pool.begin().await?;

        let target: Option<OfferRow> = sqlx::query_as(&format!(
            "SELECT {OFFER_COLUMNS} FROM offers WHERE id = $1 FOR UPDATE"
        ))
        .bind(offer_id)
        .fetch_optional(&mut *tx)
        .await?;
        let target: Offer = target.ok_or(AppError::NotFound)?.try_into()?;

        if !matches!(target.status, OfferStatus::Pending | OfferStatus::Paused) {
            return Err(AppError::Conflict(format!(
                "cannot open offer in status {}",
                target.status.as_str()
            )));
        }

        let displaced: Vec<OfferRow> = sqlx::query_as(&format!(
            r#"
            UPDATE offers
            SET status = 'closed', close_reason = 'manual', closed_at = $2
            WHERE broadcast_id = $1 AND status = 'active' AND id <> $3
            RETURNING {OFFER_COLUMNS}
            "#
        ))
        .bind(target.broadcast_id)
        .bind(now)
        .bind(offer_id)
        .fetch_all(&mut *tx)
        .await?;

        let expires_at = expires_at_for(now, target.time_limit_seconds);
        let activated: OfferRow = sqlx::query_as(&format!(
            r#"
            UPDATE offers
            SET status = 'active', opened_at = $2, expires_at = $3,
                close_reason = NULL, closed_at = NULL
            WHERE id = $1 AND status IN ('pending', 'paused')
            RETURNING {OFFER_COLUMNS}
            "#
        ))
        .bind(offer_id)
        .bind(now)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            // A concurrent activation of a sibling offer can win the
            // single-active index between our displacement and this
            // update. The invariant holds; report it as a conflict.
            if let sqlx::Error::Database(db) = &e {
                if db.is_unique_violation() {
                    return AppError::Conflict(
                        "another offer is already active for this broadcast".into(),
                    );
                }
            }
            AppError::from(e)
        })?;

        tx.commit().await?;

        let displaced = displaced
            .into_iter()
            .map(TryInto::try_into)
            .collect::<AppResult<Vec<Offer>>>()?;
        Ok((activated.try_into()?, displaced))
    }

    async fn pause(&self, offer_id: Uuid) -> AppResult<Offer> {
        let row: Option<OfferRow> = sqlx::query_as(&format!(
            r#"
            UPDATE offers SET status = 'paused'
            WHERE id = $1 AND status = 'active'
            RETURNING {OFFER_COLUMNS}
            "#
        ))
        .bind(offer_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => match self.get(offer_id).await? {
                Some(offer) => Err(AppError::Conflict(format!(
                    "cannot pause offer in status {}",
                    offer.status.as_str()
                ))),
                None => Err(AppError::NotFound),
            },
        }
    }

    async fn close_if_active(
        &self,
        offer_id: Uuid,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Offer>> {
        let row: Option<OfferRow> = sqlx::query_as(&format!(
            r#"
            UPDATE offers
            SET status = 'closed', close_reason = $2, closed_at = $3
            WHERE id = $1 AND status = 'active'
            RETURNING {OFFER_COLUMNS}
            "#
        ))
        .bind(offer_id)
        .bind(reason.as_str())
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn claim_one(&self, offer_id: Uuid) -> AppResult<ClaimOutcome> {
        let row: Option<OfferRow> = sqlx::query_as(&format!(
            r#"
            UPDATE offers
            SET quantity_claimed = quantity_claimed + 1
            WHERE id = $1 AND status = 'active'
              AND (quantity_limit IS NULL OR quantity_claimed < quantity_limit)
            RETURNING {OFFER_COLUMNS}
            "#
        ))
        .bind(offer_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let offer: Offer = row.try_into()?;
                Ok(outcome_from(&offer, true))
            }
            None => {
                let offer = self.get(offer_id).await?.ok_or(AppError::NotFound)?;
                Ok(outcome_from(&offer, false))
            }
        }
    }

    async fn due_expiries(&self, now: DateTime<Utc>) -> AppResult<Vec<Offer>> {
        let rows: Vec<OfferRow> = sqlx::query_as(&format!(
            "SELECT {OFFER_COLUMNS} FROM offers \
             WHERE status = 'active' AND expires_at IS NOT NULL AND expires_at <= $1"
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct OfferRow {
    id: Uuid,
    broadcast_id: Uuid,
    product_id: Uuid,
    product_name: String,
    product_image_url: Option<String>,
    title: String,
    description: Option<String>,
    offer_price: f64,
    original_price: Option<f64>,
    discount_percent: Option<i32>,
    quantity_limit: Option<i32>,
    quantity_claimed: i32,
    time_limit_seconds: Option<i32>,
    status: String,
    close_reason: Option<String>,
    opened_at: Option<DateTime<Utc>>,
    closed_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OfferRow> for Offer {
    type Error = AppError;

    fn try_from(row: OfferRow) -> Result<Self, Self::Error> {
        let status = OfferStatus::parse(&row.status)
            .ok_or_else(|| AppError::Database(format!("unknown offer status {}", row.status)))?;
        let close_reason = row
            .close_reason
            .as_deref()
            .map(|r| {
                CloseReason::parse(r)
                    .ok_or_else(|| AppError::Database(format!("unknown close reason {r}")))
            })
            .transpose()?;
        Ok(Offer {
            id: row.id,
            broadcast_id: row.broadcast_id,
            product_id: row.product_id,
            product_name: row.product_name,
            product_image_url: row.product_image_url,
            title: row.title,
            description: row.description,
            offer_price: row.offer_price,
            original_price: row.original_price,
            discount_percent: row.discount_percent,
            quantity_limit: row.quantity_limit,
            quantity_claimed: row.quantity_claimed,
            time_limit_seconds: row.time_limit_seconds,
            status,
            close_reason,
            opened_at: row.opened_at,
            closed_at: row.closed_at,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// All transitions happen under one lock, giving the same atomicity
/// the conditional SQL statements provide.
#[derive(Default)]
pub struct MemoryOfferStore {
    offers: Mutex<HashMap<Uuid, Offer>>,
}

impl MemoryOfferStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OfferStore for MemoryOfferStore {
    async fn create(&self, input: NewOffer) -> AppResult<Offer> {
        let offer = Offer {
            id: Uuid::new_v4(),
            broadcast_id: input.broadcast_id,
            product_id: input.product_id,
            product_name: input.product_name,
            product_image_url: input.product_image_url,
            title: input.title,
            description: input.description,
            offer_price: input.offer_price,
            original_price: input.original_price,
            discount_percent: input.discount_percent,
            quantity_limit: input.quantity_limit,
            quantity_claimed: 0,
            time_limit_seconds: input.time_limit_seconds,
            status: OfferStatus::Pending,
            close_reason: None,
            opened_at: None,
            closed_at: None,
            expires_at: None,
            created_at: Utc::now(),
        };
        self.offers.lock().unwrap().insert(offer.id, offer.clone());
        Ok(offer)
    }

    async fn get(&self, offer_id: Uuid) -> AppResult<Option<Offer>> {
        Ok(self.offers.lock().unwrap().get(&offer_id).cloned())
    }

    async fn list_for_broadcast(&self, broadcast_id: Uuid) -> AppResult<Vec<Offer>> {
        let mut offers: Vec<Offer> = self
            .offers
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.broadcast_id == broadcast_id)
            .cloned()
            .collect();
        offers.sort_by_key(|o| o.created_at);
        Ok(offers)
    }

    async fn find_active(&self, broadcast_id: Uuid) -> AppResult<Option<Offer>> {
        Ok(self
            .offers
            .lock()
            .unwrap()
            .values()
            .find(|o| o.broadcast_id == broadcast_id && o.status == OfferStatus::Active)
            .cloned())
    }

    async fn activate(
        &self,
        offer_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<(Offer, Vec<Offer>)> {
        let mut offers = self.offers.lock().unwrap();
        let target = offers.get(&offer_id).cloned().ok_or(AppError::NotFound)?;

        if !matches!(target.status, OfferStatus::Pending | OfferStatus::Paused) {
            return Err(AppError::Conflict(format!(
                "cannot open offer in status {}",
                target.status.as_str()
            )));
        }

        let mut displaced = Vec::new();
        for offer in offers.values_mut() {
            if offer.broadcast_id == target.broadcast_id
                && offer.status == OfferStatus::Active
                && offer.id != offer_id
            {
                offer.status = OfferStatus::Closed;
                offer.close_reason = Some(CloseReason::Manual);
                offer.closed_at = Some(now);
                displaced.push(offer.clone());
            }
        }

        let offer = offers.get_mut(&offer_id).ok_or(AppError::NotFound)?;
        offer.status = OfferStatus::Active;
        offer.opened_at = Some(now);
        offer.expires_at = expires_at_for(now, offer.time_limit_seconds);
        offer.close_reason = None;
        offer.closed_at = None;
        Ok((offer.clone(), displaced))
    }

    async fn pause(&self, offer_id: Uuid) -> AppResult<Offer> {
        let mut offers = self.offers.lock().unwrap();
        let offer = offers.get_mut(&offer_id).ok_or(AppError::NotFound)?;
        if offer.status != OfferStatus::Active {
            return Err(AppError::Conflict(format!(
                "cannot pause offer in status {}",
                offer.status.as_str()
            )));
        }
        offer.status = OfferStatus::Paused;
        Ok(offer.clone())
    }

    async fn close_if_active(
        &self,
        offer_id: Uuid,
        reason: CloseReason,
        now: DateTime<Utc>,
    ) -> AppResult<Option<Offer>> {
        let mut offers = self.offers.lock().unwrap();
        let Some(offer) = offers.get_mut(&offer_id) else {
            return Err(AppError::NotFound);
        };
        if offer.status != OfferStatus::Active {
            return Ok(None);
        }
        offer.status = OfferStatus::Closed;
        offer.close_reason = Some(reason);
        offer.closed_at = Some(now);
        Ok(Some(offer.clone()))
    }

    async fn claim_one(&self, offer_id: Uuid) -> AppResult<ClaimOutcome> {
        let mut offers = self.offers.lock().unwrap();
        let offer = offers.get_mut(&offer_id).ok_or(AppError::NotFound)?;

        let under_limit = offer
            .quantity_limit
            .map(|limit| offer.quantity_claimed < limit)
            .unwrap_or(true);
        if offer.status != OfferStatus::Active || !under_limit {
            let snapshot = offer.clone();
            return Ok(outcome_from(&snapshot, false));
        }

        offer.quantity_claimed += 1;
        let snapshot = offer.clone();
        Ok(outcome_from(&snapshot, true))
    }

    async fn due_expiries(&self, now: DateTime<Utc>) -> AppResult<Vec<Offer>> {
        Ok(self
            .offers
            .lock()
            .unwrap()
            .values()
            .filter(|o| {
                o.status == OfferStatus::Active
                    && o.expires_at.map(|t| t <= now).unwrap_or(false)
            })
            .cloned()
            .collect())
    }
}
