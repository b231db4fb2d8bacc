use std::sync::OnceLock;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use crate::Result;

/// Environment variable holding the log filter directives; `RUST_LOG` is the fallback.
pub const LOG_FILTER_ENV: &str = "POINTDASH_LOG";

static SUBSCRIBER: OnceLock<std::result::Result<(), String>> = OnceLock::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Error,
}

/// One engine or service record. `component` and `stage` come from the dotted section
/// name passed to [`log_event`], e.g. `dataset.load` or `impact.window`.
#[derive(Debug, Serialize)]
pub struct LogEvent<'a> {
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub component: &'a str,
    pub stage: Option<&'a str>,
    pub source: &'a str,
    pub function: &'a str,
    pub file: &'a str,
    pub line: u32,
    pub phase: &'a str,
    pub method: &'a str,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
}

impl<'a> LogEvent<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        filename: &'a str,
        classname: &'a str,
        function: &'a str,
        system_section: &'a str,
        line_num: u32,
        message: &'a str,
        error: Option<&'a str>,
        phase: &'a str,
        method: &'a str,
    ) -> Self {
        let (component, stage) = match system_section.split_once('.') {
            Some((component, stage)) => (component, Some(stage)),
            None => (system_section, None),
        };

        Self {
            timestamp: Utc::now(),
            severity: if error.is_some() {
                Severity::Error
            } else {
                Severity::Info
            },
            component,
            stage,
            source: classname,
            function,
            file: filename,
            line: line_num,
            phase,
            method,
            message,
            error,
        }
    }
}

/// Install the JSON subscriber. Only the first call installs it; later calls report the
/// outcome of that first attempt.
pub fn init_logging() -> Result<()> {
    let outcome = SUBSCRIBER.get_or_init(|| {
        let filter = EnvFilter::try_from_env(LOG_FILTER_ENV)
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_target(false)
            .try_init()
            .map_err(|error| error.to_string())
    });

    outcome.clone().map_err(|message| anyhow!(message))
}

/// Emit a structured record; records carrying an error go out at error level.
#[allow(clippy::too_many_arguments)]
pub fn log_event(
    filename: &str,
    classname: &str,
    function: &str,
    system_section: &str,
    line_num: u32,
    message: &str,
    error: Option<&str>,
    phase: &str,
    method: &str,
) {
    let event = LogEvent::new(
        filename,
        classname,
        function,
        system_section,
        line_num,
        message,
        error,
        phase,
        method,
    );

    let Ok(record) = serde_json::to_string(&event) else {
        match error {
            Some(cause) => error!(target: "pointdash", message, cause),
            None => info!(target: "pointdash", message),
        }
        return;
    };

    match event.severity {
        Severity::Error => error!(target: "pointdash", component = event.component, record = %record),
        Severity::Info => info!(target: "pointdash", component = event.component, record = %record),
    }
}
