mod api;
mod config;
mod crawler;
mod product;
mod proxy;
mod stealth;

use axum::{
    routing::{get, post},
    Router,
};
use dotenv::dotenv;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(api::check_rank, api::health),
    components(schemas(api::RankRequest, api::RankResponse)),
    tags(
        (name = "rank", description = "Keyword Rank API")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::CrawlerConfig::from_env();
    match config.proxy {
        Some(ref proxy) => tracing::info!("📡 Proxy configured: {}", proxy.to_chrome_arg()),
        None => tracing::info!("📡 No proxy configured. Using direct connection."),
    }
    tracing::info!(
        "Max pages: {}, per-page timeout: {:?}, headless: {}",
        config.max_pages,
        config.page_timeout,
        config.headless
    );

    let state = Arc::new(api::AppState { config });

    let app = Router::new()
        .merge(SwaggerUi::new("/rank-crawler-swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/rank", post(api::check_rank))
        .route("/health", get(api::health))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    println!("Listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
