//! Accounting records for registration and subscription changes

use tracing::info;

/// Sink for per-binding and per-subscription accounting records
///
/// Records are fire-and-forget; a sink must not block the caller. An
/// `expires_delta` of zero signals deregistration or termination.
pub trait AnalyticsSink: Send + Sync {
    fn registration(&self, aor: &str, binding_id: &str, contact_uri: &str, expires_delta: i64);

    fn subscription(
        &self,
        aor: &str,
        subscription_id: &str,
        req_uri: &str,
        expires_delta: i64,
    );
}

/// Default sink writing structured log records
pub struct LogAnalyticsSink;

impl AnalyticsSink for LogAnalyticsSink {
    fn registration(&self, aor: &str, binding_id: &str, contact_uri: &str, expires_delta: i64) {
        info!(
            target: "analytics",
            aor, binding_id, contact_uri, expires_delta, "registration"
        );
    }

    fn subscription(
        &self,
        aor: &str,
        subscription_id: &str,
        req_uri: &str,
        expires_delta: i64,
    ) {
        info!(
            target: "analytics",
            aor, subscription_id, req_uri, expires_delta, "subscription"
        );
    }
}
