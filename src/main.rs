use axum::Router;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod db;
mod entities;
mod handler;
mod openapi;
mod repo;
mod schema;
mod service;
mod state;
#[cfg(test)]
mod test_support;

use service::config::{ConfigService, ConfigServiceImpl};
use state::AppState;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false).compact())
        .init();

    tracing::info!(
        "starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );

    let config: Arc<dyn ConfigService> = Arc::new(ConfigServiceImpl::new());
    let port = config.port();

    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(err) => {
            tracing::error!(error = %err, "startup failed");
            std::process::exit(1);
        }
    };

    let app = Router::new()
        .merge(handler::health::routes(state.clone()))
        .merge(handler::auth::google::routes(state.clone()))
        .merge(handler::auth::tokens::routes(state.clone()))
        .merge(handler::me::routes(state))
        .merge(
            SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()),
        );

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|_| panic!("failed to bind to {}", bind_addr));
    tracing::info!(%bind_addr, "listening");

    axum::serve(listener, app)
        .await
        .expect("server error");
}
