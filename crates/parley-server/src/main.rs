use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use parley_api::ApiState;
use parley_auth::TokenSigner;
use parley_gateway::connection;
use parley_gateway::dispatcher::Dispatcher;
use parley_gateway::push::PushNotifier;
use parley_gateway::router::EventRouter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .init();

    // Config. The signing secret has no safe default.
    let jwt_secret = std::env::var("PARLEY_JWT_SECRET")
        .map_err(|_| anyhow::anyhow!("PARLEY_JWT_SECRET must be set"))?;
    let db_path = std::env::var("PARLEY_DB_PATH").unwrap_or_else(|_| "parley.db".into());
    let host = std::env::var("PARLEY_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("PARLEY_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    // Init database
    let db = Arc::new(parley_db::Database::open(&PathBuf::from(&db_path))?);

    // Shared state
    let signer = TokenSigner::new(jwt_secret);
    let push = PushNotifier::from_env();
    if push.is_none() {
        warn!("PARLEY_PUSH_URL not set, push notifications disabled");
    }
    let router = EventRouter::new(db.clone(), Dispatcher::new(), signer.clone(), push);

    // Routes
    let api_routes = parley_api::router(ApiState::new(db, signer));

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(router);

    let app = Router::new()
        .merge(api_routes)
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Parley server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn ws_upgrade(State(router): State<EventRouter>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, router))
}
