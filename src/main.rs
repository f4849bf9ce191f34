mod api;
mod geo;
mod gtfs;
mod matcher;
mod realtime;
mod tracker;

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "drift-tracker")]
#[command(about = "Realtime transit vehicle tracking and ride detection for Drift")]
struct Args {
    /// Port to run the HTTP server on
    #[arg(short, long, env = "SERVER_PORT", default_value = "8080")]
    port: u16,

    /// Static GTFS archive with shapes, trips and routes
    #[arg(long, env = "GTFS_URL")]
    gtfs_url: String,

    /// SSE endpoint streaming vehicle telemetry
    #[arg(long, env = "VEHICLE_STREAM_URL")]
    vehicle_stream_url: String,

    /// SSE endpoint streaming the rider's location
    #[arg(long, env = "RIDER_STREAM_URL")]
    rider_stream_url: String,

    /// Boarding classifier endpoint
    #[arg(long, env = "CLASSIFIER_URL")]
    classifier_url: String,

    /// Fare-charge endpoint
    #[arg(long, env = "PAYMENT_URL")]
    payment_url: String,

    /// Rider the fare charges belong to
    #[arg(long, env = "DRIFT_USER_ID")]
    user_id: String,

    /// Fare amount charged per completed ride
    #[arg(long, env = "CHARGE_AMT", default_value = "3.50")]
    charge_amt: f64,

    /// Vehicle telemetry flush cadence in milliseconds
    #[arg(long, env = "VEHICLE_FLUSH_MS", default_value = "3000")]
    vehicle_flush_ms: u64,

    /// Rider location flush cadence in milliseconds
    #[arg(long, env = "RIDER_FLUSH_MS", default_value = "1500")]
    rider_flush_ms: u64,

    /// Marker transition duration in milliseconds
    #[arg(long, env = "ANIMATION_MS", default_value = "2000")]
    animation_ms: u64,

    /// Position updates closer than this many meters do not retarget
    #[arg(long, env = "ANIMATION_EPSILON_M", default_value = "1.0")]
    animation_epsilon_m: f64,

    /// How many nearest routes to report
    #[arg(long, env = "CLOSEST_ROUTES", default_value = "4")]
    closest_routes: usize,

    /// Rider samples accumulated before a classifier submission
    #[arg(long, env = "HISTORY_FLUSH_THRESHOLD", default_value = "100")]
    history_flush_threshold: usize,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    tracing::info!("starting drift-tracker");

    let shapes = match gtfs::load_shape_index(&args.gtfs_url).await {
        Ok(index) => {
            tracing::info!(
                shapes = index.shape_count(),
                routes = index.route_count(),
                "loaded shape index"
            );
            Arc::new(index)
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to load shape index");
            return;
        }
    };

    let reconciler = Arc::new(RwLock::new(tracker::Reconciler::new(
        Duration::from_millis(args.animation_ms),
        args.animation_epsilon_m,
    )));

    let http = reqwest::Client::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let vehicle_handle = tokio::spawn(realtime::pipeline::run_vehicle_pipeline(
        http.clone(),
        args.vehicle_stream_url.clone(),
        Duration::from_millis(args.vehicle_flush_ms),
        reconciler.clone(),
        shutdown_rx.clone(),
    ));

    let classifier = matcher::ClassifierClient::new(http.clone(), args.classifier_url.clone());
    let payments = matcher::PaymentClient::new(
        http.clone(),
        args.payment_url.clone(),
        args.user_id.clone(),
        args.charge_amt,
    );
    let detector =
        matcher::BoardingDetector::with_threshold(classifier, payments, args.history_flush_threshold);
    let ranker = matcher::ProximityRanker::new(args.closest_routes);

    let rider_handle = tokio::spawn(realtime::pipeline::run_rider_pipeline(
        http.clone(),
        args.rider_stream_url.clone(),
        Duration::from_millis(args.rider_flush_ms),
        shapes.clone(),
        ranker,
        detector,
        shutdown_rx,
    ));

    let server_handle = tokio::spawn(api::server::run_server(
        shapes.clone(),
        reconciler.clone(),
        args.closest_routes,
        args.port,
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("shutdown signal received"),
        _ = server_handle => tracing::error!("API server exited"),
    }

    // Teardown: stop both timers and streams, let the pipelines run their
    // final flushes, then release the animated entities.
    let _ = shutdown_tx.send(true);
    let _ = vehicle_handle.await;
    let _ = rider_handle.await;
    reconciler.write().await.clear();

    tracing::info!("drift-tracker stopped");
}
