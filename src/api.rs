//! Operator endpoints for the relay.

use std::sync::Arc;

use actix_web::{get, post, web, Responder, Scope};
use serde::{Deserialize, Serialize};

use crate::{
    message::OutboxMessage,
    metrics::OutboxMetrics,
    store::{OutboxStore, SqliteOutboxStore},
};

pub struct AdminState {
    pub store: SqliteOutboxStore,
    pub metrics: Arc<OutboxMetrics>,
    /// Default and maximum size of the failed-message listing.
    pub failed_scan_limit: u32,
}

#[get("/metrics")]
async fn get_metrics(state: web::Data<AdminState>) -> impl Responder {
    web::Json(state.metrics.snapshot())
}

#[post("/metrics/reset")]
async fn reset_metrics(state: web::Data<AdminState>) -> impl Responder {
    state.metrics.reset();
    tracing::info!("Outbox metrics reset");

    "OK"
}

#[derive(Deserialize)]
pub struct ListFailedQuery {
    limit: Option<u32>,
}

#[derive(Serialize, Deserialize)]
pub struct ListFailedResponse {
    pub messages: Vec<OutboxMessage>,
}

#[get("/failed")]
async fn list_failed(
    state: web::Data<AdminState>,
    query: web::Query<ListFailedQuery>,
) -> actix_web::Result<impl Responder> {
    let limit = query
        .limit
        .unwrap_or(state.failed_scan_limit)
        .clamp(1, state.failed_scan_limit.max(1));

    let messages = state.store.get_failed(limit).await?;

    Ok(web::Json(ListFailedResponse { messages }))
}

pub fn service() -> Scope {
    web::scope("/outbox")
        .service(get_metrics)
        .service(reset_metrics)
        .service(list_failed)
}
