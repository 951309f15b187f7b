use axum::response::Response;
use axum::routing::get;
use axum::{Router, middleware};
use log::info;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use campus_messenger::integration::Config;
use campus_messenger::state::AppState;
use campus_messenger::{actor, api, conversation, directory, message};

#[tokio::main]
async fn main() {
    let config = Config::default();

    let state = AppState::init(&config)
        .await
        .expect("Failed to initialize application state");

    let api_routes = Router::new()
        .merge(conversation::api(state.clone()))
        .merge(message::api(state.clone()))
        .merge(directory::api(state))
        .layer(middleware::from_fn(actor::identity));

    let router = Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(config.env.allow_origin())
                .allow_methods(config.env.allow_methods())
                .allow_headers(config.env.allow_headers()),
        );

    let addr = config.env.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    info!("Listening on {addr}");

    axum::serve(listener, router)
        .await
        .expect("Failed to start server");
}

async fn health() -> Response {
    api::ok("OK", ())
}
