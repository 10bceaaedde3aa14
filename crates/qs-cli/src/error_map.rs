use qs_core::ScriptQueueError;
use std::fmt::Display;

fn map_error(code: &'static str, error: impl Display) -> ScriptQueueError {
    ScriptQueueError::new(code, error.to_string())
}

pub(crate) fn emit_error(error: ScriptQueueError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!("ERROR_MSG_JSON:{}", json_string(&error.message));
    1
}

pub(crate) fn json_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text.escape_default()))
}

pub(crate) fn map_cli_source_path(error: std::io::Error) -> ScriptQueueError {
    map_error("CLI_SOURCE_PATH", error)
}

pub(crate) fn map_cli_source_scan(error: impl Display) -> ScriptQueueError {
    map_error("CLI_SOURCE_SCAN", error)
}

pub(crate) fn map_cli_source_read(error: std::io::Error) -> ScriptQueueError {
    map_error("CLI_SOURCE_READ", error)
}

pub(crate) fn map_cli_dump(error: serde_json::Error) -> ScriptQueueError {
    map_error("CLI_DUMP_QUEUES", error)
}
