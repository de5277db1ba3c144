mod config;
mod error;
mod routes;
mod seed;
mod services;
mod state;
mod tree;
mod util;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = config::AppConfig::from_env();
    let port = config.port;
    let seed_mock_data = config.seed_mock_data;
    tracing::info!(
        %port,
        delivery = ?config.webhook_delivery,
        sim_latency_ms = config.sim_latency.as_millis(),
        sim_success_rate = config.sim_success_rate,
        "configuration loaded"
    );

    let state = state::AppState::from_config(config).expect("webhook client init failed");
    if seed_mock_data {
        seed::seed(&state).await.expect("seeding mock data failed");
    }

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "site console listening");
    axum::serve(listener, app).await.expect("server failed");
}
