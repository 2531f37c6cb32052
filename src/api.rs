//! HTTP boundary: request validation, outcome serialization.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::config::CrawlerConfig;
use crate::crawler::{self, RankOutcome};
use crate::product;

pub struct AppState {
    pub config: CrawlerConfig,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RankRequest {
    /// Search keyword to rank against.
    #[schema(example = "wireless mouse")]
    pub keyword: String,
    /// Product page URL carrying a `vendorItemId` query parameter.
    #[schema(example = "https://www.coupang.com/vp/products/76334?vendorItemId=87654321")]
    pub product_url: String,
}

/// Semantic outcome of a rank lookup. Well-formed requests always get HTTP
/// 200 with one of these; only malformed requests get a 4xx.
#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RankResponse {
    Success {
        rank: u32,
        page: u32,
        #[serde(rename = "productName")]
        product_name: String,
    },
    NotFound {
        message: String,
    },
    Error {
        message: String,
    },
}

impl RankResponse {
    fn from_outcome(outcome: RankOutcome, max_pages: u32) -> Self {
        match outcome {
            RankOutcome::Success {
                rank,
                page,
                product_name,
            } => RankResponse::Success {
                rank,
                page,
                product_name,
            },
            RankOutcome::NotFound { pages_searched } => RankResponse::NotFound {
                message: format!(
                    "Searched {} of {} pages without finding the product.",
                    pages_searched, max_pages
                ),
            },
            RankOutcome::Error { message } => RankResponse::Error { message },
        }
    }
}

/// Check a keyword and product URL before any browser session exists.
/// Returns the target vendor item id, or the client-facing rejection message.
fn validate(req: &RankRequest) -> Result<String, String> {
    if req.keyword.trim().is_empty() || req.product_url.trim().is_empty() {
        return Err("Both keyword and productUrl are required.".to_string());
    }
    product::extract_vendor_item_id(&req.product_url)
        .ok_or_else(|| "productUrl does not contain a vendorItemId parameter.".to_string())
}

#[utoipa::path(
    post,
    path = "/api/rank",
    request_body = RankRequest,
    responses(
        (status = 200, description = "Rank lookup completed (semantic outcome in body)", body = RankResponse),
        (status = 400, description = "Missing field or unparseable product URL", body = RankResponse)
    ),
    tag = "rank"
)]
pub async fn check_rank(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RankRequest>,
) -> (StatusCode, Json<RankResponse>) {
    let target_id = match validate(&req) {
        Ok(id) => id,
        Err(message) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(RankResponse::Error { message }),
            );
        }
    };

    tracing::info!(
        "Rank lookup: keyword='{}' vendorItemId={}",
        req.keyword,
        target_id
    );

    let outcome = crawler::resolve_rank(&state.config, &req.keyword, &target_id).await;

    (
        StatusCode::OK,
        Json(RankResponse::from_outcome(outcome, state.config.max_pages)),
    )
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up")),
    tag = "rank"
)]
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
