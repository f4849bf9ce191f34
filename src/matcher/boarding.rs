use crate::matcher::clients::{FareCharger, RideClassifier};
use crate::matcher::history::LocationHistory;

const DEFAULT_FLUSH_THRESHOLD: usize = 100;

/// Decides from the rider-location stream whether the rider is riding a
/// tracked vehicle, and triggers exactly one fare charge per boarding event.
///
/// Fixes accumulate in a bounded [`LocationHistory`]; at the flush threshold
/// the full batch goes to the external classifier and the history is cleared
/// whatever the outcome, so a batch is consumed exactly once. A positive
/// verdict opens a boarding window pinned to the route that was nearest when
/// boarding was detected; the next negative verdict closes the window and
/// charges the fare. Classifier failures degrade to "unknown" and never stop
/// the tracking pipeline.
pub struct BoardingDetector<C, P> {
    history: LocationHistory,
    flush_threshold: usize,
    classifier: C,
    payments: P,
    nearby_route: Option<String>,
    boarded_route: Option<String>,
}

impl<C: RideClassifier, P: FareCharger> BoardingDetector<C, P> {
    pub fn new(classifier: C, payments: P) -> Self {
        Self::with_threshold(classifier, payments, DEFAULT_FLUSH_THRESHOLD)
    }

    pub fn with_threshold(classifier: C, payments: P, flush_threshold: usize) -> Self {
        Self {
            history: LocationHistory::new(),
            flush_threshold: flush_threshold.max(1),
            classifier,
            payments,
            nearby_route: None,
            boarded_route: None,
        }
    }

    /// Route currently closest to the rider, fed in by the proximity ranker.
    /// This is the route a detected boarding gets pinned to.
    pub fn set_nearby_route(&mut self, route: Option<String>) {
        self.nearby_route = route;
    }

    /// The route of the open boarding window, if any.
    pub fn boarded_route(&self) -> Option<&str> {
        self.boarded_route.as_deref()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Feed one rider fix. Duplicates of the previous fix are discarded;
    /// reaching the flush threshold submits the batch.
    pub async fn record_fix(&mut self, lat: f64, lon: f64, timestamp: &str) {
        if !self.history.record(lat, lon, timestamp) {
            return;
        }
        if self.history.len() >= self.flush_threshold {
            self.submit().await;
        }
    }

    /// Best-effort final submission on stream teardown.
    pub async fn finish(&mut self) {
        if !self.history.is_empty() {
            self.submit().await;
        }
    }

    async fn submit(&mut self) {
        // Drain before the call so the batch cannot be re-submitted no
        // matter how the classifier responds.
        let batch = self.history.drain();
        let sample_count = batch.len();

        match self.classifier.classify(&batch).await {
            Ok(verdict) => {
                tracing::info!(
                    sample_count,
                    is_on_bus = verdict.is_on_bus,
                    message = verdict.message.as_deref().unwrap_or(""),
                    "classifier verdict"
                );
                self.apply_verdict(verdict.is_on_bus).await;
            }
            Err(e) => {
                tracing::warn!(sample_count, error = %e, "classifier unavailable, verdict unknown");
            }
        }
    }

    async fn apply_verdict(&mut self, is_on_bus: bool) {
        if is_on_bus {
            if self.boarded_route.is_none() {
                match self.nearby_route.clone() {
                    Some(route) => {
                        tracing::info!(%route, "rider boarded");
                        self.boarded_route = Some(route);
                    }
                    None => {
                        tracing::debug!("boarding detected with no nearby route, window not opened");
                    }
                }
            }
            return;
        }

        // Negative verdict: close the boarding window, if one is open, with
        // exactly one charge attempt.
        if let Some(route) = self.boarded_route.take() {
            match self.payments.charge(&route).await {
                Ok(true) => tracing::info!(%route, "fare charged"),
                Ok(false) => tracing::warn!(%route, "fare charge declined"),
                Err(e) => tracing::warn!(%route, error = %e, "fare charge failed, not retrying"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::clients::{ClassifierVerdict, ClientError};
    use crate::matcher::history::LocationSample;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct ScriptedClassifier {
        calls: Cell<usize>,
        verdicts: RefCell<VecDeque<Result<bool, ()>>>,
        last_batch_len: Cell<usize>,
    }

    impl ScriptedClassifier {
        fn scripted(verdicts: &[Result<bool, ()>]) -> Self {
            Self {
                verdicts: RefCell::new(verdicts.to_vec().into()),
                ..Self::default()
            }
        }
    }

    impl RideClassifier for ScriptedClassifier {
        async fn classify(
            &self,
            samples: &[LocationSample],
        ) -> Result<ClassifierVerdict, ClientError> {
            self.calls.set(self.calls.get() + 1);
            self.last_batch_len.set(samples.len());
            match self.verdicts.borrow_mut().pop_front() {
                Some(Ok(is_on_bus)) => Ok(ClassifierVerdict {
                    is_on_bus,
                    message: None,
                }),
                Some(Err(())) => Err(ClientError::Unavailable("scripted outage".into())),
                None => Ok(ClassifierVerdict {
                    is_on_bus: false,
                    message: None,
                }),
            }
        }
    }

    #[derive(Default)]
    struct RecordingCharger {
        charges: RefCell<Vec<String>>,
        fail: Cell<bool>,
    }

    impl FareCharger for RecordingCharger {
        async fn charge(&self, bus_route: &str) -> Result<bool, ClientError> {
            if self.fail.get() {
                return Err(ClientError::Unavailable("scripted outage".into()));
            }
            self.charges.borrow_mut().push(bus_route.to_string());
            Ok(true)
        }
    }

    async fn feed_distinct_fixes<C: RideClassifier, P: FareCharger>(
        detector: &mut BoardingDetector<C, P>,
        count: usize,
    ) {
        for i in 0..count {
            let lat = 49.26 + i as f64 * 0.001;
            detector.record_fix(lat, -123.25, "2025-03-01 10:00:00").await;
        }
    }

    #[tokio::test]
    async fn threshold_triggers_exactly_one_classifier_call() {
        let classifier = ScriptedClassifier::scripted(&[Ok(false)]);
        let mut detector =
            BoardingDetector::with_threshold(classifier, RecordingCharger::default(), 5);

        feed_distinct_fixes(&mut detector, 4).await;
        assert_eq!(detector.classifier.calls.get(), 0);
        assert_eq!(detector.history_len(), 4);

        detector.record_fix(49.30, -123.25, "t").await;
        assert_eq!(detector.classifier.calls.get(), 1);
        assert_eq!(detector.classifier.last_batch_len.get(), 5);
        assert_eq!(detector.history_len(), 0);
    }

    #[tokio::test]
    async fn duplicate_fixes_do_not_reach_the_threshold() {
        let classifier = ScriptedClassifier::default();
        let mut detector =
            BoardingDetector::with_threshold(classifier, RecordingCharger::default(), 2);

        detector.record_fix(49.26, -123.25, "t1").await;
        detector.record_fix(49.26, -123.25, "t2").await;
        detector.record_fix(49.26, -123.25, "t3").await;
        assert_eq!(detector.classifier.calls.get(), 0);
        assert_eq!(detector.history_len(), 1);
    }

    #[tokio::test]
    async fn one_charge_per_boarding_event() {
        let classifier = ScriptedClassifier::scripted(&[Ok(true), Ok(true), Ok(false), Ok(false)]);
        let mut detector =
            BoardingDetector::with_threshold(classifier, RecordingCharger::default(), 2);
        detector.set_nearby_route(Some("49".into()));

        // Boarding detected, pinned to route 49.
        feed_distinct_fixes(&mut detector, 2).await;
        assert_eq!(detector.boarded_route(), Some("49"));

        // Still on the bus: no charge.
        detector.set_nearby_route(Some("99".into()));
        feed_distinct_fixes(&mut detector, 2).await;
        assert_eq!(detector.boarded_route(), Some("49"));
        assert!(detector.payments.charges.borrow().is_empty());

        // Got off: exactly one charge for the pinned route.
        feed_distinct_fixes(&mut detector, 2).await;
        assert_eq!(*detector.payments.charges.borrow(), vec!["49".to_string()]);
        assert_eq!(detector.boarded_route(), None);

        // Another negative verdict with no open window charges nothing.
        feed_distinct_fixes(&mut detector, 2).await;
        assert_eq!(detector.payments.charges.borrow().len(), 1);
    }

    #[tokio::test]
    async fn classifier_failure_clears_history_and_continues() {
        let classifier = ScriptedClassifier::scripted(&[Err(()), Ok(true)]);
        let mut detector =
            BoardingDetector::with_threshold(classifier, RecordingCharger::default(), 2);
        detector.set_nearby_route(Some("49".into()));

        feed_distinct_fixes(&mut detector, 2).await;
        assert_eq!(detector.history_len(), 0);
        assert_eq!(detector.boarded_route(), None);
        assert!(detector.payments.charges.borrow().is_empty());

        // Tracking continues and the next batch still classifies.
        feed_distinct_fixes(&mut detector, 2).await;
        assert_eq!(detector.classifier.calls.get(), 2);
        assert_eq!(detector.boarded_route(), Some("49"));
    }

    #[tokio::test]
    async fn failed_charge_is_not_retried() {
        let classifier = ScriptedClassifier::scripted(&[Ok(true), Ok(false), Ok(false)]);
        let charger = RecordingCharger::default();
        charger.fail.set(true);
        let mut detector = BoardingDetector::with_threshold(classifier, charger, 2);
        detector.set_nearby_route(Some("49".into()));

        feed_distinct_fixes(&mut detector, 2).await;
        feed_distinct_fixes(&mut detector, 2).await;

        // The window is closed even though the charge failed; the following
        // negative verdict does not attempt another charge.
        assert_eq!(detector.boarded_route(), None);
        detector.payments.fail.set(false);
        feed_distinct_fixes(&mut detector, 2).await;
        assert!(detector.payments.charges.borrow().is_empty());
    }

    #[tokio::test]
    async fn finish_flushes_a_partial_batch_once() {
        let classifier = ScriptedClassifier::scripted(&[Ok(false)]);
        let mut detector =
            BoardingDetector::with_threshold(classifier, RecordingCharger::default(), 100);

        feed_distinct_fixes(&mut detector, 3).await;
        detector.finish().await;
        assert_eq!(detector.classifier.calls.get(), 1);
        assert_eq!(detector.classifier.last_batch_len.get(), 3);

        // Nothing left to flush.
        detector.finish().await;
        assert_eq!(detector.classifier.calls.get(), 1);
    }
}
