use serde::Serialize;

/// One rider fix, tagged with the timestamp of the first sample in the
/// current batch so the classifier can reason about elapsed time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationSample {
    pub first_timestamp: String,
    pub timestamp: String,
    pub lat: f64,
    pub lon: f64,
}

/// Ordered rider-location history for one boarding window.
///
/// Stationary duplicates are filtered on append; the owner drains the whole
/// batch at the flush threshold, so the length stays bounded.
#[derive(Debug, Default)]
pub struct LocationHistory {
    samples: Vec<LocationSample>,
}

impl LocationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fix unless it repeats the immediately preceding coordinate.
    /// Returns whether the sample was accepted.
    pub fn record(&mut self, lat: f64, lon: f64, timestamp: &str) -> bool {
        if let Some(last) = self.samples.last() {
            if last.lat == lat && last.lon == lon {
                return false;
            }
        }

        let first_timestamp = self
            .samples
            .first()
            .map(|s| s.first_timestamp.clone())
            .unwrap_or_else(|| timestamp.to_string());

        self.samples.push(LocationSample {
            first_timestamp,
            timestamp: timestamp.to_string(),
            lat,
            lon,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Take the full batch, leaving the history empty. The next accepted fix
    /// starts a fresh batch with its own first timestamp.
    pub fn drain(&mut self) -> Vec<LocationSample> {
        std::mem::take(&mut self.samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_coordinate_does_not_grow_history() {
        let mut history = LocationHistory::new();
        assert!(history.record(49.26, -123.25, "2025-03-01 10:00:00"));
        assert!(!history.record(49.26, -123.25, "2025-03-01 10:00:05"));
        assert_eq!(history.len(), 1);

        assert!(history.record(49.261, -123.25, "2025-03-01 10:00:10"));
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn samples_carry_the_batch_first_timestamp() {
        let mut history = LocationHistory::new();
        history.record(49.26, -123.25, "2025-03-01 10:00:00");
        history.record(49.261, -123.25, "2025-03-01 10:00:10");

        let batch = history.drain();
        assert_eq!(batch[0].first_timestamp, "2025-03-01 10:00:00");
        assert_eq!(batch[1].first_timestamp, "2025-03-01 10:00:00");
        assert_eq!(batch[1].timestamp, "2025-03-01 10:00:10");
    }

    #[test]
    fn drain_resets_the_batch() {
        let mut history = LocationHistory::new();
        history.record(49.26, -123.25, "2025-03-01 10:00:00");
        assert_eq!(history.drain().len(), 1);
        assert!(history.is_empty());

        // A new batch gets a new first timestamp.
        history.record(49.262, -123.25, "2025-03-01 10:05:00");
        let batch = history.drain();
        assert_eq!(batch[0].first_timestamp, "2025-03-01 10:05:00");
    }

    #[test]
    fn reappearing_coordinate_is_accepted_when_not_adjacent() {
        let mut history = LocationHistory::new();
        history.record(49.26, -123.25, "t1");
        history.record(49.27, -123.24, "t2");
        assert!(history.record(49.26, -123.25, "t3"));
        assert_eq!(history.len(), 3);
    }
}
