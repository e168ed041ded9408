use anyhow::Result;
use std::env;
use tracing::info;
use warp::{reject::Rejection, reply::Reply, Filter};

async fn health_check() -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&serde_json::json!({
        "status": "ok",
        "layer": "api",
        "decision_ready": false
    })))
}

fn routes() -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(health_check)
}

#[tokio::main]
async fn main() -> Result<()> {
    churnstore::init_logging("info");

    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "8000".to_string())
        .parse()
        .unwrap_or(8000);

    info!("Health check: http://localhost:{}/health", port);
    warp::serve(routes()).run(([0, 0, 0, 0], port)).await;

    Ok(())
}
