use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry, Encoder,
    IntCounter, IntCounterVec, Registry, TextEncoder,
};
use tracing::error;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref SCHEDULER_TICKS_TOTAL: IntCounter = register_int_counter_with_registry!(
        "maintwatch_scheduler_ticks_total",
        "Total number of completed alert poll ticks.",
        REGISTRY
    )
    .expect("Failed to register maintwatch_scheduler_ticks_total");
    pub static ref SCHEDULER_TICK_FAILURES_TOTAL: IntCounter = register_int_counter_with_registry!(
        "maintwatch_scheduler_tick_failures_total",
        "Total number of poll ticks skipped because tasks could not be read.",
        REGISTRY
    )
    .expect("Failed to register maintwatch_scheduler_tick_failures_total");
    pub static ref ALERTS_DISPATCHED_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
        "maintwatch_alerts_dispatched_total",
        "Total number of deadline alerts dispatched, by level.",
        &["level"],
        REGISTRY
    )
    .expect("Failed to register maintwatch_alerts_dispatched_total");
    pub static ref ALERT_DELIVERY_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec_with_registry!(
        "maintwatch_alert_delivery_failures_total",
        "Total number of alert notifications that could not be delivered, by channel.",
        &["channel"],
        REGISTRY
    )
    .expect("Failed to register maintwatch_alert_delivery_failures_total");
}

// Touch every metric so the exposition lists them before the first tick.
pub fn register_metrics() {
    lazy_static::initialize(&SCHEDULER_TICKS_TOTAL);
    lazy_static::initialize(&SCHEDULER_TICK_FAILURES_TOTAL);
    lazy_static::initialize(&ALERTS_DISPATCHED_TOTAL);
    lazy_static::initialize(&ALERT_DELIVERY_FAILURES_TOTAL);
}

// Function to gather metrics for exposition
pub fn gather_metrics() -> String {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_registered_counters() {
        register_metrics();
        SCHEDULER_TICKS_TOTAL.inc();
        ALERTS_DISPATCHED_TOTAL.with_label_values(&["Level 1"]).inc();

        let output = gather_metrics();
        assert!(output.contains("maintwatch_scheduler_ticks_total"));
        assert!(output.contains("maintwatch_alerts_dispatched_total{level=\"Level 1\"}"));
    }
}
