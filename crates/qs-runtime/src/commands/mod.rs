use std::sync::Arc;
use std::time::Duration;

use qs_core::{format_duration, parse_duration, QsValue, QueueSpeed, ScriptQueueError};

use crate::command::{invalid_arguments, CommandRegistry};

mod basic;
pub mod condition;
pub mod flow;
mod scripts;
pub mod timing;

pub use condition::evaluate_condition;

pub fn register_builtins(registry: &mut CommandRegistry) {
    registry.register(Arc::new(basic::NarrateCommand));
    registry.register(Arc::new(basic::DebugCommand));
    registry.register(Arc::new(basic::DefineCommand));
    registry.register(Arc::new(basic::StopCommand));
    registry.register(Arc::new(basic::QueueCommand));
    registry.register(Arc::new(timing::WaitCommand));
    registry.register(Arc::new(timing::SleepCommand));
    registry.register(Arc::new(flow::IfCommand));
    registry.register(Arc::new(flow::WhileCommand));
    registry.register(Arc::new(flow::RepeatCommand));
    registry.register(Arc::new(flow::ForeachCommand));
    registry.register(Arc::new(scripts::InjectCommand));
    registry.register(Arc::new(scripts::RunCommand));
}

/// Reads a list out of a resolved value: arrays as-is, map values in key
/// order, and text split on `|` (a leading `li@` is dropped).
pub(crate) fn list_items(value: &QsValue) -> Vec<QsValue> {
    match value {
        QsValue::Array(items) => items.clone(),
        QsValue::Map(values) => values.values().cloned().collect(),
        other => {
            let text = other.to_string();
            let text = text.strip_prefix("li@").unwrap_or(&text);
            if text.is_empty() {
                return Vec::new();
            }
            text.split('|').map(QsValue::from).collect()
        }
    }
}

pub(crate) fn duration_arg(value: &QsValue) -> Result<Duration, ScriptQueueError> {
    parse_duration(&value.to_string()).map_err(|error| invalid_arguments(error.message))
}

pub(crate) fn speed_arg(value: &QsValue) -> Result<QueueSpeed, ScriptQueueError> {
    let text = value.to_string();
    if text.trim().eq_ignore_ascii_case("instant") {
        return Ok(QueueSpeed::Instant);
    }
    Ok(QueueSpeed::Every(duration_arg(value)?))
}

/// Durations travel through `CommandArgs` in their text form.
pub(crate) fn duration_value(duration: Duration) -> QsValue {
    QsValue::from(format_duration(duration))
}

pub(crate) fn value_duration(value: Option<&QsValue>) -> Option<Duration> {
    value.and_then(|value| parse_duration(&value.to_string()).ok())
}

pub(crate) fn speed_value(speed: QueueSpeed) -> QsValue {
    match speed {
        QueueSpeed::Instant => QsValue::from("instant"),
        QueueSpeed::Every(spacing) => duration_value(spacing),
    }
}

pub(crate) fn value_speed(value: Option<&QsValue>) -> Option<QueueSpeed> {
    value.and_then(|value| speed_arg(value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn list_items_accepts_arrays_maps_and_text() {
        assert_eq!(
            list_items(&QsValue::from("li@a|b")),
            vec![QsValue::from("a"), QsValue::from("b")]
        );
        assert_eq!(list_items(&QsValue::from("")), Vec::<QsValue>::new());
        assert_eq!(
            list_items(&QsValue::Map(BTreeMap::from([
                ("b".to_string(), QsValue::Number(2.0)),
                ("a".to_string(), QsValue::Number(1.0)),
            ]))),
            vec![QsValue::Number(1.0), QsValue::Number(2.0)]
        );
        assert_eq!(list_items(&QsValue::Number(3.0)), vec![QsValue::from("3")]);
    }

    #[test]
    fn speed_and_duration_arguments() {
        assert_eq!(speed_arg(&QsValue::from("Instant")).expect("speed"), QueueSpeed::Instant);
        assert_eq!(
            speed_arg(&QsValue::from("2t")).expect("speed"),
            QueueSpeed::Every(Duration::from_millis(100))
        );
        let error = duration_arg(&QsValue::from("soon")).expect_err("invalid");
        assert_eq!(error.code, crate::command::DISPATCH_INVALID_ARGUMENTS);
        assert_eq!(
            value_duration(Some(&duration_value(Duration::from_millis(250)))),
            Some(Duration::from_millis(250))
        );
        let oversized = duration_arg(&QsValue::from("99999999999999999999h")).expect_err("range");
        assert_eq!(oversized.code, crate::command::DISPATCH_INVALID_ARGUMENTS);
    }

    #[test]
    fn sub_millisecond_speeds_survive_command_args() {
        let speed = speed_arg(&QsValue::from("0.4ms")).expect("speed");
        let carried = value_speed(Some(&speed_value(speed))).expect("carried");
        assert!(!carried.is_instant());
        assert!(carried.spacing() > Duration::from_micros(300));
        assert_eq!(
            value_speed(Some(&speed_value(QueueSpeed::Instant))),
            Some(QueueSpeed::Instant)
        );
    }
}
