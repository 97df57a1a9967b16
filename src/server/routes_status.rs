//! `GET /api/status`: live transfers and per-user totals.

use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::server::AppContext;
use crate::streaming::TransferSnapshot;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub transfers: Vec<TransferSnapshot>,
    /// Bytes streamed per user since startup.
    pub users: BTreeMap<String, u64>,
}

pub async fn status(State(ctx): State<AppContext>) -> Json<StatusResponse> {
    Json(StatusResponse {
        transfers: ctx.registry.snapshot(),
        users: ctx.stats.snapshot(),
    })
}
