//! Logging utilities module
//!
//! Centralized tracing initialization plus structured security audit events.

use tracing::warn;

/// Logging utilities for the application
pub struct LoggingUtils;

impl LoggingUtils {
    /// Initialize logging with the specified level
    pub fn initialize(level: &str) -> crate::shared::error::AppResult<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level));

        let subscriber = fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| crate::shared::error::AppError::Internal(format!("Failed to initialize logging: {}", e)))?;

        Ok(())
    }

    /// Log a rate limit violation as a security audit event
    pub fn log_rate_limit(client_ip: &str, path: &str, user_agent: &str) {
        warn!(
            event_type = "rate_limit_exceeded",
            client_ip = %client_ip,
            path = %path,
            user_agent = %user_agent,
            "Security event detected"
        );
    }

    /// Log a CSRF verification failure as a security audit event
    pub fn log_csrf_failure(client_ip: &str, path: &str) {
        warn!(
            event_type = "csrf_validation_failed",
            client_ip = %client_ip,
            path = %path,
            "Security event detected"
        );
    }

    /// Log acceptance of an unverified voucher link (degraded provider path)
    pub fn log_unverified_voucher(user_id: &str, transaction_id: &str) {
        warn!(
            event_type = "unverified_voucher_accepted",
            user_id = %user_id,
            transaction_id = %transaction_id,
            "Voucher validation endpoint unavailable; stored link for manual settlement"
        );
    }
}
