//! # Pipeline Metrics
//!
//! Metrics for the fetch → render → apply pipeline.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::IntCounterVec;
use std::sync::LazyLock;

static OBJECTS_APPLIED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "portal_controller_objects_applied_total",
            "Total number of objects created or updated",
        ),
        &["operation"],
    )
    .expect("Failed to create OBJECTS_APPLIED_TOTAL metric - this should never happen")
});

static REPOSITORY_FETCH_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "portal_controller_repository_fetch_total",
            "Total number of application config fetches by result",
        ),
        &["result"],
    )
    .expect("Failed to create REPOSITORY_FETCH_TOTAL metric - this should never happen")
});

/// Register pipeline metrics with the registry
pub(crate) fn register_pipeline_metrics() -> Result<()> {
    REGISTRY.register(Box::new(OBJECTS_APPLIED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REPOSITORY_FETCH_TOTAL.clone()))?;
    Ok(())
}

/// `operation` is `created` or `updated`
pub fn increment_objects_applied(operation: &str) {
    OBJECTS_APPLIED_TOTAL.with_label_values(&[operation]).inc();
}

/// `result` is `success` or `failure`
pub fn increment_repository_fetch(result: &str) {
    REPOSITORY_FETCH_TOTAL.with_label_values(&[result]).inc();
}
