use arqon_config::CasilRedactionConfig;
use regex::Regex;
use serde_json::{Map, Value};

use crate::scope::matches_any;

pub const REDACT_TOKEN: &str = "***REDACTED***";

const MAX_PATH_DEPTH: usize = 10;

fn redact_paths(value: &mut Value, paths: &[String], depth: usize) {
    if depth > MAX_PATH_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, v) in map.iter_mut() {
                if paths.iter().any(|p| p.eq_ignore_ascii_case(key)) {
                    *v = Value::String(REDACT_TOKEN.to_string());
                } else {
                    redact_paths(v, paths, depth + 1);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                redact_paths(item, paths, depth + 1);
            }
        }
        _ => {}
    }
}

fn redact_patterns(text: &str, patterns: &[String], max_patterns: usize) -> String {
    let mut out = text.to_string();
    for pattern in patterns.iter().take(max_patterns) {
        if let Ok(re) = Regex::new(pattern) {
            out = re.replace_all(&out, REDACT_TOKEN).to_string();
        }
    }
    out
}

/// Redacts `payload` ahead of logging/telemetry. A `room_channel` matching
/// `never_log_payload_for` is wiped wholesale rather than field-by-field,
/// matching the source's conservative "when in doubt, redact everything"
/// behavior for those targets.
pub fn redact_payload(
    payload: &Map<String, Value>,
    config: &CasilRedactionConfig,
    room_channel: &str,
    target: &str,
    max_patterns: usize,
) -> Map<String, Value> {
    if matches!(target, "logs" | "telemetry") && matches_any(&config.never_log_for, room_channel) {
        let mut wiped = Map::new();
        wiped.insert("payload".to_string(), Value::String(REDACT_TOKEN.to_string()));
        return wiped;
    }

    let mut value = Value::Object(payload.clone());
    redact_paths(&mut value, &config.paths, 0);

    let serialized = serde_json::to_string(&value).unwrap_or_default();
    let redacted_text = redact_patterns(&serialized, &config.patterns, max_patterns);

    match serde_json::from_str::<Value>(&redacted_text) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut fallback = Map::new();
            fallback.insert("payload".to_string(), Value::String(redacted_text));
            fallback
        }
    }
}
