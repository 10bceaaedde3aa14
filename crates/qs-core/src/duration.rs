use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::error::ScriptQueueError;

/// Length of one host tick, the unit behind the `t` duration suffix.
pub const TICK: Duration = Duration::from_millis(50);

fn duration_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^(\d+(?:\.\d+)?)(ms|t|s|m|h)?$").expect("duration regex must compile")
    })
}

/// Parses `250ms`, `20t`, `1.5s`, `2m`, `1h`; a bare number means seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, ScriptQueueError> {
    let text = raw.trim().to_ascii_lowercase();
    let captures = duration_regex().captures(&text).ok_or_else(|| {
        ScriptQueueError::new(
            "DURATION_INVALID",
            format!("\"{}\" is not a valid duration.", raw),
        )
    })?;
    let amount = captures[1].parse::<f64>().map_err(|error| {
        ScriptQueueError::new(
            "DURATION_INVALID",
            format!("\"{}\" is not a valid duration: {}", raw, error),
        )
    })?;
    let seconds = match captures.get(2).map(|unit| unit.as_str()) {
        Some("ms") => amount / 1000.0,
        Some("t") => amount * TICK.as_secs_f64(),
        Some("m") => amount * 60.0,
        Some("h") => amount * 3600.0,
        _ => amount,
    };
    Duration::try_from_secs_f64(seconds).map_err(|error| {
        ScriptQueueError::new(
            "DURATION_INVALID",
            format!("\"{}\" is not a valid duration: {}", raw, error),
        )
    })
}

/// Renders a duration that `parse_duration` reads back unchanged.
pub fn format_duration(duration: Duration) -> String {
    let nanos = duration.subsec_nanos();
    if nanos == 0 {
        return format!("{}s", duration.as_secs());
    }
    if nanos % 1_000_000 == 0 {
        return format!("{}ms", duration.as_millis());
    }
    let fraction = format!("{:09}", nanos);
    format!("{}.{}s", duration.as_secs(), fraction.trim_end_matches('0'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_supports_all_units() {
        assert_eq!(parse_duration("250ms").expect("ms"), Duration::from_millis(250));
        assert_eq!(parse_duration("20t").expect("ticks"), Duration::from_secs(1));
        assert_eq!(parse_duration("1.5s").expect("s"), Duration::from_millis(1500));
        assert_eq!(parse_duration("2").expect("bare"), Duration::from_secs(2));
        assert_eq!(parse_duration("2M").expect("m"), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").expect("h"), Duration::from_secs(3600));
    }

    #[test]
    fn parse_duration_rejects_garbage() {
        let error = parse_duration("soon").expect_err("invalid");
        assert_eq!(error.code, "DURATION_INVALID");
        assert!(parse_duration("-1s").is_err());
    }

    #[test]
    fn parse_duration_rejects_values_beyond_duration_range() {
        let error = parse_duration("99999999999999999999h").expect_err("too large");
        assert_eq!(error.code, "DURATION_INVALID");
        let error = parse_duration(&"9".repeat(400)).expect_err("infinite");
        assert_eq!(error.code, "DURATION_INVALID");
    }

    #[test]
    fn format_duration_prefers_whole_seconds() {
        assert_eq!(format_duration(Duration::from_secs(3)), "3s");
        assert_eq!(format_duration(Duration::from_millis(120)), "120ms");
        assert_eq!(format_duration(Duration::from_micros(400)), "0.0004s");
        assert_eq!(format_duration(Duration::from_micros(1_500_250)), "1.50025s");
        assert!(!parse_duration(&format_duration(Duration::from_micros(400)))
            .expect("round trip")
            .is_zero());
    }
}
