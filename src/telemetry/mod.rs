//! Trace-driven telemetry for Aegis Core.
//!
//! - Extractor: declarative metric rules applied to sealed traces
//! - Pipeline: bounded-queue consumer, counter store, and counter sinks

mod extractor;
mod pipeline;

pub use extractor::{rules_for_policy, standard_rules, MetricExtractor};
pub use pipeline::{
    CounterSink, CounterStore, LogCounterSink, TelemetryHandle, TelemetryPipeline,
};
