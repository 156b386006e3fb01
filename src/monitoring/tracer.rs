/*!
 * Tracing
 * Structured logging for kernel subsystems using the tracing crate
 *
 * Environment variables:
 * - RUST_LOG: log level and per-module directives (default: info)
 * - KERNEL_TRACE_JSON: JSON output when `1` or `true`
 */

use crate::core::types::CpuId;
use std::time::Instant;
use tracing::{debug, info, span, warn, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Install the global subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("KERNEL_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
    };

    if installed.is_ok() {
        info!(json = use_json, "Structured tracing initialized");
    }
}

/// Span covering one CPU's share of a workload; logs its duration on drop
pub struct WorkloadSpan {
    span: tracing::Span,
    start: Instant,
    operations: u64,
}

impl WorkloadSpan {
    pub fn new(name: &str, cpu: CpuId) -> Self {
        let span = span!(
            Level::DEBUG,
            "workload",
            workload = name,
            cpu = %cpu,
            operations = tracing::field::Empty,
            duration_ms = tracing::field::Empty,
        );
        span.in_scope(|| debug!(workload = name, %cpu, "workload started"));

        Self {
            span,
            start: Instant::now(),
            operations: 0,
        }
    }

    /// Count completed operations
    pub fn record_operations(&mut self, count: u64) {
        self.operations += count;
    }

    pub fn operations(&self) -> u64 {
        self.operations
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for WorkloadSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        let _entered = self.span.enter();
        self.span.record("operations", self.operations);
        self.span.record("duration_ms", duration.as_millis() as u64);

        if duration.as_secs() >= 1 {
            warn!(
                operations = self.operations,
                duration_ms = duration.as_millis() as u64,
                slow = true,
                "slow workload"
            );
        } else {
            debug!(
                operations = self.operations,
                duration_us = duration.as_micros() as u64,
                "workload completed"
            );
        }
    }
}

/// Helper to create a workload span for the given CPU
#[inline]
pub fn span_workload(name: &str, cpu: CpuId) -> WorkloadSpan {
    WorkloadSpan::new(name, cpu)
}
