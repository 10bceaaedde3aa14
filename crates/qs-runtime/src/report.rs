use log::{debug, error, info};
use parking_lot::Mutex;
use serde::Serialize;

/// One contained failure: the queue keeps running after it is reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub queue_id: String,
    pub command: String,
    pub script: String,
    pub line: Option<usize>,
    pub code: String,
    pub message: String,
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.queue_id, self.script)?;
        if let Some(line) = self.line {
            write!(f, ":{}", line)?;
        }
        write!(f, " '{}': {}: {}", self.command, self.code, self.message)
    }
}

/// Where error reports, debug traces and `narrate` output go.
pub trait ScriptReporter: Send + Sync {
    fn report_error(&self, report: &ErrorReport);

    fn report_debug(&self, queue_id: &str, message: &str);

    fn report_output(&self, queue_id: &str, text: &str);
}

/// Default reporter: everything goes through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ScriptReporter for LogReporter {
    fn report_error(&self, report: &ErrorReport) {
        error!("{}", report);
    }

    fn report_debug(&self, queue_id: &str, message: &str) {
        debug!("[{}] {}", queue_id, message);
    }

    fn report_output(&self, queue_id: &str, text: &str) {
        info!("[{}] {}", queue_id, text);
    }
}

/// Keeps everything it is given; hosts use it to inspect a run afterwards.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    errors: Mutex<Vec<ErrorReport>>,
    debug: Mutex<Vec<String>>,
    output: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<ErrorReport> {
        self.errors.lock().clone()
    }

    pub fn error_codes(&self) -> Vec<String> {
        self.errors
            .lock()
            .iter()
            .map(|report| report.code.clone())
            .collect()
    }

    pub fn debug_lines(&self) -> Vec<String> {
        self.debug.lock().clone()
    }

    pub fn output(&self) -> Vec<String> {
        self.output.lock().clone()
    }

    pub fn take_output(&self) -> Vec<String> {
        std::mem::take(&mut *self.output.lock())
    }
}

impl ScriptReporter for RecordingReporter {
    fn report_error(&self, report: &ErrorReport) {
        debug!("recorded error {}", report);
        self.errors.lock().push(report.clone());
    }

    fn report_debug(&self, _queue_id: &str, message: &str) {
        self.debug.lock().push(message.to_string());
    }

    fn report_output(&self, _queue_id: &str, text: &str) {
        self.output.lock().push(text.to_string());
    }
}
