//! Asynchronous telemetry pipeline.
//!
//! Sealed traces are handed to a bounded queue and consumed by a single
//! worker task that applies the metric extractor and accumulates counters.
//! The request path never blocks on telemetry: when the queue is full the
//! handle raises a metrics-lag signal and re-enqueues the trace from a
//! spawned task instead of dropping it. A trace that reached `submit` is
//! always counted eventually.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::domain::{CounterSnapshot, Trace};
use crate::telemetry::extractor::MetricExtractor;

/// Accumulated counters for one namespace.
pub struct CounterStore {
    namespace: String,
    counters: RwLock<BTreeMap<String, u64>>,
}

impl CounterStore {
    /// Create a store with every counter present at zero, so consumers see
    /// the full set before the first trace arrives.
    pub fn new(namespace: impl Into<String>, counter_names: &[String]) -> Self {
        Self {
            namespace: namespace.into(),
            counters: RwLock::new(counter_names.iter().map(|n| (n.clone(), 0)).collect()),
        }
    }

    fn add(&self, increments: &BTreeMap<String, u64>) {
        let mut counters = self.counters.write().unwrap_or_else(PoisonError::into_inner);
        for (name, increment) in increments {
            *counters.entry(name.clone()).or_insert(0) += increment;
        }
    }

    /// Point-in-time snapshot of all counters.
    pub fn snapshot(&self) -> CounterSnapshot {
        let counters = self.counters.read().unwrap_or_else(PoisonError::into_inner);
        CounterSnapshot {
            namespace: self.namespace.clone(),
            taken_at: Utc::now(),
            counters: counters.clone(),
        }
    }
}

/// Destination for counter snapshots (an external metrics backend).
pub trait CounterSink: Send + Sync {
    fn publish(&self, snapshot: &CounterSnapshot);
}

/// Sink that emits counters as structured log events.
pub struct LogCounterSink {
    unit: String,
}

impl LogCounterSink {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }
}

impl CounterSink for LogCounterSink {
    fn publish(&self, snapshot: &CounterSnapshot) {
        for (name, value) in &snapshot.counters {
            tracing::info!(
                namespace = %snapshot.namespace,
                counter = %name,
                value,
                unit = %self.unit,
                "Counter published"
            );
        }
    }
}

/// Producer-side handle to the pipeline. Cheap to clone.
#[derive(Clone)]
pub struct TelemetryHandle {
    tx: mpsc::Sender<Trace>,
    counters: Arc<CounterStore>,
    lag_events: Arc<AtomicU64>,
}

impl TelemetryHandle {
    /// Enqueue a sealed trace for counting. Never blocks and never drops:
    /// on a full queue the lag signal is raised and the trace is re-enqueued
    /// from a spawned task.
    pub fn submit(&self, trace: Trace) {
        match self.tx.try_send(trace) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(trace)) => {
                let lagging = self.lag_events.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    request_id = %trace.request_id,
                    lag_events = lagging,
                    "Metrics pipeline lagging; re-enqueueing trace"
                );
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    if tx.send(trace).await.is_err() {
                        tracing::error!("Metrics pipeline shut down; trace not counted");
                    }
                });
            }
            Err(mpsc::error::TrySendError::Closed(trace)) => {
                tracing::error!(
                    request_id = %trace.request_id,
                    "Metrics pipeline shut down; trace not counted"
                );
            }
        }
    }

    /// Number of times the queue was found full.
    pub fn lag_events(&self) -> u64 {
        self.lag_events.load(Ordering::Relaxed)
    }

    /// Explicit lag signal: an error when the queue has ever overflowed.
    pub fn backpressure(&self) -> crate::error::AegisResult<()> {
        let lag = self.lag_events();
        if lag > 0 {
            return Err(crate::error::AegisError::Backpressure(format!(
                "trace queue overflowed {} time(s)",
                lag
            )));
        }
        Ok(())
    }

    /// Current counter values.
    pub fn snapshot(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }
}

/// The consumer side: spawns the worker task.
pub struct TelemetryPipeline;

impl TelemetryPipeline {
    /// Start the pipeline and return the producer handle.
    ///
    /// The worker applies the extractor to each trace and periodically
    /// publishes a snapshot to the sink. It exits when every handle is
    /// dropped, publishing one final snapshot.
    pub fn spawn(
        extractor: MetricExtractor,
        namespace: impl Into<String>,
        queue_capacity: usize,
        publish_interval: Duration,
        sink: Option<Arc<dyn CounterSink>>,
    ) -> TelemetryHandle {
        let counters = Arc::new(CounterStore::new(namespace, &extractor.rule_names()));
        let (tx, mut rx) = mpsc::channel::<Trace>(queue_capacity.max(1));

        let worker_counters = counters.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(publish_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // The first tick completes immediately; skip it.
            ticker.tick().await;

            loop {
                tokio::select! {
                    received = rx.recv() => match received {
                        Some(trace) => {
                            worker_counters.add(&extractor.apply(&trace));
                        }
                        None => break,
                    },
                    _ = ticker.tick() => {
                        if let Some(sink) = &sink {
                            sink.publish(&worker_counters.snapshot());
                        }
                    }
                }
            }

            if let Some(sink) = &sink {
                sink.publish(&worker_counters.snapshot());
            }
            tracing::info!("Telemetry pipeline stopped");
        });

        TelemetryHandle {
            tx,
            counters,
            lag_events: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Decision, EvaluationDirection, PolicyDocument, TraceBuilder, WordRules};
    use crate::telemetry::extractor::standard_rules;

    fn policy() -> PolicyDocument {
        PolicyDocument {
            id: "p".to_string(),
            version: 1,
            denied_topics: Vec::new(),
            content_filters: Vec::new(),
            word_rules: WordRules::default(),
            sensitive_info_rules: Vec::new(),
            blocked_input_message: "no".to_string(),
            blocked_output_message: "no".to_string(),
        }
    }

    fn clean_trace(id: &str) -> Trace {
        let mut builder = TraceBuilder::begin(id, &policy());
        builder
            .record_input(Decision::pass(EvaluationDirection::Input))
            .unwrap();
        builder
            .record_output(Decision::pass(EvaluationDirection::Output))
            .unwrap();
        builder.seal().unwrap()
    }

    async fn wait_for_count(handle: &TelemetryHandle, counter: &str, expected: u64) {
        for _ in 0..200 {
            if handle.snapshot().get(counter) == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "counter '{}' never reached {}: {:?}",
            counter,
            expected,
            handle.snapshot().counters
        );
    }

    fn pipeline(capacity: usize) -> TelemetryHandle {
        TelemetryPipeline::spawn(
            MetricExtractor::with_rules(standard_rules()).unwrap(),
            "aegis/test",
            capacity,
            Duration::from_secs(3600),
            None,
        )
    }

    #[tokio::test]
    async fn test_counters_start_at_zero() {
        let handle = pipeline(16);
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.get("invocations"), 0);
        assert!(snapshot.counters.contains_key("backend_invocations"));
    }

    #[tokio::test]
    async fn test_traces_are_counted() {
        let handle = pipeline(16);
        for i in 0..3 {
            handle.submit(clean_trace(&format!("r{}", i)));
        }

        wait_for_count(&handle, "invocations", 3).await;
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.get("backend_invocations"), 3);
        assert_eq!(snapshot.get("input_blocked"), 0);
    }

    #[tokio::test]
    async fn test_queue_full_raises_lag_but_loses_nothing() {
        // Single-slot queue on a current-thread runtime: the worker cannot
        // drain between submits, so overflow is guaranteed.
        let handle = pipeline(1);
        for i in 0..5 {
            handle.submit(clean_trace(&format!("r{}", i)));
        }

        assert!(handle.lag_events() >= 1);
        wait_for_count(&handle, "invocations", 5).await;
    }

    #[tokio::test]
    async fn test_namespace_in_snapshot() {
        let handle = pipeline(4);
        assert_eq!(handle.snapshot().namespace, "aegis/test");
    }
}
