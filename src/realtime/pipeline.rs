use crate::gtfs::ShapeIndex;
use crate::matcher::clients::{FareCharger, RideClassifier};
use crate::matcher::{BoardingDetector, ProximityRanker};
use crate::realtime::batcher::{RiderBatcher, TelemetryBatcher};
use crate::realtime::stream::EventStream;
use crate::tracker::Reconciler;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;

fn epoch_secs() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}

/// Consume the vehicle telemetry stream and drive the reconciler.
///
/// The batcher absorbs the transport's arrival cadence; every
/// `flush_interval` the consolidated snapshot is applied. On disconnect or
/// shutdown a final flush runs before the task returns, so no pending
/// message is silently lost.
pub async fn run_vehicle_pipeline(
    client: reqwest::Client,
    url: String,
    flush_interval: Duration,
    reconciler: Arc<RwLock<Reconciler>>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(%url, interval_ms = flush_interval.as_millis() as u64, "starting vehicle pipeline");

    let mut stream = match EventStream::connect(&client, &url).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(%url, error = %e, "vehicle stream connection failed");
            return;
        }
    };

    let mut batcher = TelemetryBatcher::new();
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = stream.next_event() => match event {
                Some(raw) => batcher.push(raw),
                None => {
                    tracing::info!("vehicle stream closed");
                    break;
                }
            },
            _ = ticker.tick() => apply_snapshots(&mut batcher, &reconciler).await,
            _ = shutdown.changed() => break,
        }
    }

    apply_snapshots(&mut batcher, &reconciler).await;
    tracing::info!("vehicle pipeline stopped");
}

async fn apply_snapshots(batcher: &mut TelemetryBatcher, reconciler: &RwLock<Reconciler>) {
    let snapshots = batcher.flush(epoch_secs());
    if snapshots.is_empty() {
        return;
    }
    tracing::debug!(vehicles = snapshots.len(), "applying telemetry snapshot");
    reconciler.write().await.apply(&snapshots, Instant::now());
}

/// Consume the rider location stream: rank nearby routes and feed the
/// boarding detector. Independent of the vehicle pipeline; the two share no
/// mutable state.
pub async fn run_rider_pipeline<C, P>(
    client: reqwest::Client,
    url: String,
    flush_interval: Duration,
    shapes: Arc<ShapeIndex>,
    mut ranker: ProximityRanker,
    mut detector: BoardingDetector<C, P>,
    mut shutdown: watch::Receiver<bool>,
) where
    C: RideClassifier,
    P: FareCharger,
{
    tracing::info!(%url, interval_ms = flush_interval.as_millis() as u64, "starting rider pipeline");

    let mut stream = match EventStream::connect(&client, &url).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::error!(%url, error = %e, "rider stream connection failed");
            return;
        }
    };

    let mut batcher = RiderBatcher::new();
    let mut ticker = tokio::time::interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            event = stream.next_event() => match event {
                Some(raw) => batcher.push(raw),
                None => {
                    tracing::info!("rider stream closed");
                    break;
                }
            },
            _ = ticker.tick() => {
                process_fixes(&mut batcher, &shapes, &mut ranker, &mut detector).await;
            }
            _ = shutdown.changed() => break,
        }
    }

    // Drain whatever is pending, then submit the remaining history once.
    process_fixes(&mut batcher, &shapes, &mut ranker, &mut detector).await;
    detector.finish().await;
    tracing::info!("rider pipeline stopped");
}

async fn process_fixes<C, P>(
    batcher: &mut RiderBatcher,
    shapes: &ShapeIndex,
    ranker: &mut ProximityRanker,
    detector: &mut BoardingDetector<C, P>,
) where
    C: RideClassifier,
    P: FareCharger,
{
    for fix in batcher.flush() {
        let ranked = ranker.update(fix.lat, fix.lon, shapes);

        // The first word of the trip headsign is the rider-facing route
        // number, so that is what a boarding gets pinned to.
        let nearby = ranked.first().map(|closest| {
            shapes
                .headsign_for_route(closest.route_id)
                .and_then(|headsign| headsign.split(' ').next())
                .map(str::to_string)
                .unwrap_or_else(|| closest.route_id.to_string())
        });
        detector.set_nearby_route(nearby);

        detector.record_fix(fix.lat, fix.lon, &fix.timestamp).await;
    }
}
