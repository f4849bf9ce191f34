use serde::Deserialize;
use std::collections::HashMap;

/// One inbound vehicle telemetry message: zero or more updates per message.
#[derive(Debug, Clone, Deserialize)]
pub struct VehicleFeedMessage {
    pub data: Vec<VehicleUpdate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleUpdate {
    pub route_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub bearing: Option<f32>,
    #[serde(default)]
    pub timestamp: Option<u64>,
}

/// The most recent known state of one vehicle, keyed by route.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSnapshot {
    pub route_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub bearing: Option<f32>,
    pub timestamp: u64,
}

/// One inbound rider-location message. Only the first entry per message is
/// consumed downstream.
#[derive(Debug, Clone, Deserialize)]
pub struct RiderFeedMessage {
    pub data: Vec<RiderFix>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RiderFix {
    pub lat: f64,
    pub lon: f64,
    pub timestamp: String,
}

/// Decouples the arrival cadence of the streaming transport from the
/// consumption cadence.
///
/// Raw messages are buffered as received; `flush` parses everything pending,
/// folds updates into one latest-wins snapshot per route in arrival order,
/// and clears the buffer. Malformed messages are dropped individually without
/// aborting the batch. A per-route latest-applied timestamp rejects
/// stragglers the transport delivered out of order across ticks.
#[derive(Debug, Default)]
pub struct TelemetryBatcher {
    pending: Vec<String>,
    last_applied: HashMap<i64, u64>,
}

impl TelemetryBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, raw: String) {
        self.pending.push(raw);
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Consolidate everything pending into one snapshot per route.
    ///
    /// `default_timestamp` stamps updates whose message carries no timestamp.
    pub fn flush(&mut self, default_timestamp: u64) -> Vec<VehicleSnapshot> {
        let mut latest: HashMap<i64, VehicleSnapshot> = HashMap::new();
        let mut order: Vec<i64> = Vec::new();

        for raw in self.pending.drain(..) {
            let message: VehicleFeedMessage = match serde_json::from_str(&raw) {
                Ok(message) => message,
                Err(e) => {
                    tracing::debug!(error = %e, "dropping malformed telemetry message");
                    continue;
                }
            };

            for update in message.data {
                let timestamp = update.timestamp.unwrap_or(default_timestamp);

                if let Some(&applied) = self.last_applied.get(&update.route_id) {
                    if timestamp < applied {
                        tracing::debug!(
                            route_id = update.route_id,
                            timestamp,
                            applied,
                            "discarding out-of-order telemetry straggler"
                        );
                        continue;
                    }
                }

                if !latest.contains_key(&update.route_id) {
                    order.push(update.route_id);
                }
                latest.insert(
                    update.route_id,
                    VehicleSnapshot {
                        route_id: update.route_id,
                        latitude: update.latitude,
                        longitude: update.longitude,
                        bearing: update.bearing,
                        timestamp,
                    },
                );
            }
        }

        let mut snapshots = Vec::with_capacity(order.len());
        for route_id in order {
            if let Some(snapshot) = latest.remove(&route_id) {
                self.last_applied.insert(route_id, snapshot.timestamp);
                snapshots.push(snapshot);
            }
        }
        snapshots
    }
}

/// Pending-buffer counterpart for the rider-location stream. Each message
/// yields at most its first fix; malformed messages are dropped individually.
#[derive(Debug, Default)]
pub struct RiderBatcher {
    pending: Vec<String>,
}

impl RiderBatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, raw: String) {
        self.pending.push(raw);
    }

    pub fn flush(&mut self) -> Vec<RiderFix> {
        let mut fixes = Vec::new();
        for raw in self.pending.drain(..) {
            match serde_json::from_str::<RiderFeedMessage>(&raw) {
                Ok(message) => {
                    if let Some(fix) = message.data.into_iter().next() {
                        fixes.push(fix);
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "dropping malformed rider message");
                }
            }
        }
        fixes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn flushing_empty_pending_yields_nothing() {
        let mut batcher = TelemetryBatcher::new();
        assert_eq!(batcher.flush(100), Vec::new());
    }

    #[test]
    fn later_arrival_wins_within_one_tick() {
        let mut batcher = TelemetryBatcher::new();
        batcher.push(r#"{"data":[{"route_id":5,"latitude":49.26,"longitude":-123.25}]}"#.into());
        batcher.push(r#"{"data":[{"route_id":5,"latitude":49.261,"longitude":-123.251}]}"#.into());

        let snapshots = batcher.flush(100);
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].latitude, 49.261);
        assert_eq!(snapshots[0].longitude, -123.251);
    }

    #[test]
    fn malformed_messages_do_not_abort_the_batch() {
        let mut batcher = TelemetryBatcher::new();
        batcher.push("{not json".into());
        batcher.push(r#"{"nodata":true}"#.into());
        batcher.push(r#"{"data":[{"route_id":7,"latitude":49.0,"longitude":-123.0}]}"#.into());

        let snapshots = batcher.flush(100);
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].route_id, 7);
    }

    #[test]
    fn pending_is_cleared_so_nothing_double_counts() {
        let mut batcher = TelemetryBatcher::new();
        batcher.push(r#"{"data":[{"route_id":5,"latitude":49.26,"longitude":-123.25}]}"#.into());
        assert_eq!(batcher.flush(100).len(), 1);
        assert_eq!(batcher.flush(101).len(), 0);
        assert_eq!(batcher.pending_len(), 0);
    }

    #[test]
    fn stale_straggler_cannot_overwrite_newer_state() {
        let mut batcher = TelemetryBatcher::new();
        batcher.push(
            r#"{"data":[{"route_id":5,"latitude":49.26,"longitude":-123.25,"timestamp":200}]}"#
                .into(),
        );
        assert_eq!(batcher.flush(0).len(), 1);

        // Delayed message from before the applied snapshot arrives a tick later.
        batcher.push(
            r#"{"data":[{"route_id":5,"latitude":40.0,"longitude":-120.0,"timestamp":150}]}"#
                .into(),
        );
        assert_eq!(batcher.flush(0), Vec::new());
    }

    #[test]
    fn multiple_routes_fold_independently() {
        let mut batcher = TelemetryBatcher::new();
        batcher.push(
            r#"{"data":[
                {"route_id":5,"latitude":49.26,"longitude":-123.25},
                {"route_id":9,"latitude":49.30,"longitude":-123.10}
            ]}"#
            .into(),
        );
        let snapshots = batcher.flush(100);
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].route_id, 5);
        assert_eq!(snapshots[1].route_id, 9);
    }

    #[test]
    fn rider_batcher_takes_first_entry_per_message() {
        let mut batcher = RiderBatcher::new();
        batcher.push(
            r#"{"data":[
                {"lat":49.26,"lon":-123.25,"timestamp":"2025-03-01 10:00:00"},
                {"lat":40.00,"lon":-120.00,"timestamp":"2025-03-01 10:00:01"}
            ]}"#
            .into(),
        );
        batcher.push("garbage".into());

        let fixes = batcher.flush();
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].lat, 49.26);
    }
}
