use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use qs_runtime::{ErrorReport, ScriptReporter};

use crate::json_string;

/// Prints script output and failures as tagged stdout lines.
#[derive(Debug, Default)]
pub(crate) struct StdoutReporter {
    errors: AtomicUsize,
    outputs: AtomicUsize,
}

impl StdoutReporter {
    pub(crate) fn error_count(&self) -> usize {
        self.errors.load(Ordering::Acquire)
    }

    pub(crate) fn output_count(&self) -> usize {
        self.outputs.load(Ordering::Acquire)
    }
}

impl ScriptReporter for StdoutReporter {
    fn report_error(&self, report: &ErrorReport) {
        self.errors.fetch_add(1, Ordering::AcqRel);
        match serde_json::to_string(report) {
            Ok(json) => println!("SCRIPT_ERROR_JSON:{}", json),
            Err(_) => println!("SCRIPT_ERROR:{}", report),
        }
    }

    fn report_debug(&self, queue_id: &str, message: &str) {
        debug!("[{}] {}", queue_id, message);
    }

    fn report_output(&self, queue_id: &str, text: &str) {
        self.outputs.fetch_add(1, Ordering::AcqRel);
        println!("OUTPUT:{}:{}", queue_id, json_string(text));
    }
}

#[cfg(test)]
mod reporter_tests {
    use super::*;

    #[test]
    fn stdout_reporter_counts_what_it_prints() {
        let reporter = StdoutReporter::default();
        reporter.report_output("main_A", "hello");
        reporter.report_output("main_A", "again");
        reporter.report_debug("main_A", "not counted");
        reporter.report_error(&ErrorReport {
            queue_id: "main_A".to_string(),
            command: "narrate".to_string(),
            script: "main".to_string(),
            line: Some(3),
            code: "TAG_RESOLVE_ERROR".to_string(),
            message: "bad tag".to_string(),
        });
        assert_eq!(reporter.output_count(), 2);
        assert_eq!(reporter.error_count(), 1);
    }
}
