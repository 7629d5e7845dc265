//! # Structured Logging Module
//!
//! Environment-aware structured logging for submit-time splitting and
//! worker-side step execution.

use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
///
/// Filter precedence: `STEPCHAIN_LOG`, then `RUST_LOG`, then a level derived
/// from `STEPCHAIN_ENV`. Output goes to stderr so stdout stays free for
/// machine-readable command output.
pub fn init_structured_logging(json: bool) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let filter = env_filter(&environment);

        let layer = if json {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(filter)
                .boxed()
        };

        // try_init so an embedding process may own the global subscriber
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::debug!(
            pid = std::process::id(),
            environment = %environment,
            json,
            "Structured logging initialized"
        );
    });
}

fn env_filter(environment: &str) -> EnvFilter {
    EnvFilter::try_from_env("STEPCHAIN_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(get_log_level(environment)))
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("STEPCHAIN_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "production".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "test" | "development" => "debug",
        "production" => "info",
        _ => "info",
    }
}

/// Log structured data for job-level operations
pub fn log_job_operation(
    operation: &str,
    request_name: Option<&str>,
    job_index: Option<u64>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        request_name = request_name,
        job_index = job_index,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "JOB_OPERATION"
    );
}

/// Log structured data for step and copy operations
pub fn log_step_operation(
    operation: &str,
    job_index: u64,
    step: u32,
    copy_index: Option<u32>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        job_index = job_index,
        step = step,
        copy_index = copy_index,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "STEP_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
