//! Structured observability hooks for bootstrap events.
//!
//! Provides a build-scoped `BootstrapSpan` guard and `emit_*` functions for
//! the decisions worth finding in logs later: which config was picked,
//! which patches were applied, rollout lag, and package acquisition.

use tracing::{info, warn};

/// RAII guard that enters a build-scoped tracing span. Only for synchronous
/// code; the guard must not be held across `.await`.
///
/// # Example
///
/// ```ignore
/// let _span = BootstrapSpan::enter(8812345, "chromium/try/linux-rel");
/// // tracing calls are now tagged with build_id and builder
/// ```
pub struct BootstrapSpan {
    _span: tracing::span::EnteredSpan,
}

impl BootstrapSpan {
    pub fn enter(build_id: i64, builder: &str) -> Self {
        Self {
            _span: bootstrap_span(build_id, builder).entered(),
        }
    }
}

/// Build-scoped span for async work; attach with
/// [`tracing::Instrument::instrument`] rather than entering it.
pub fn bootstrap_span(build_id: i64, builder: &str) -> tracing::Span {
    tracing::info_span!("bootstrap.build", build_id = build_id, builder = %builder)
}

/// Emit event: bootstrap config resolved.
pub fn emit_config_resolved(commit: &str, change: Option<&str>, skip_reasons: usize) {
    info!(
        event = "config.resolved",
        commit = %commit,
        change = change.unwrap_or(""),
        skip_analysis_reasons = skip_reasons,
    );
}

/// Emit event: a diff from a pending change was applied to `path`.
pub fn emit_patch_applied(path: &str, change: &str) {
    info!(event = "patch.applied", path = %path, change = %change);
}

/// Emit event: properties file missing at a revision that exists (warning level).
pub fn emit_rollout_lag_detected(path: &str, revision: &str, upstream: &str) {
    warn!(
        event = "rollout_lag.detected",
        path = %path,
        revision = %revision,
        upstream = %upstream,
    );
}

/// Emit event: both package acquisition branches finished.
pub fn emit_packages_acquired(exe_source: &str, duration_ms: u64) {
    info!(event = "packages.acquired", exe_source = %exe_source, duration_ms = duration_ms);
}

/// Emit event: build has no properties config, nothing to resolve.
pub fn emit_bootstrap_skipped(builder: &str) {
    info!(event = "bootstrap.skipped", builder = %builder);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_span_create() {
        let _span = BootstrapSpan::enter(1, "p/b/builder");
        emit_bootstrap_skipped("p/b/builder");
    }

    #[tokio::test]
    async fn test_bootstrap_span_instruments_future() {
        use tracing::Instrument;

        let value = async { 7 }
            .instrument(bootstrap_span(2, "p/b/builder"))
            .await;
        assert_eq!(value, 7);
    }
}
