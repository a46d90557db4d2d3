//! Content sniffing for observations, plus display helpers.
//!
//! The failure check and the file marker are narrow text heuristics. They
//! only apply when the agent did not say explicitly, and they misjudge some
//! inputs (see the tests).

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Emulator shutdown line that reads like an error but is normal output.
static BENIGN_POWER_OFF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)ERROR:\s+QEMU System Power off: with GPIO\.").expect("valid regex")
});

static FILE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"path['":\s]+([^'"\s,}]+)"#).expect("valid regex"));

/// Words that mark an observation as failed, matched case-insensitively.
const FAILURE_WORDS: [&str; 5] = ["失败", "异常", "error", "failed", "exception"];

/// Whether observation text reports a failure.
///
/// The benign power-off line is removed first; whatever remains fails if it
/// contains any of [`FAILURE_WORDS`].
pub fn is_failure_observation(content: &str) -> bool {
    if content.is_empty() {
        return false;
    }
    let sanitized = BENIGN_POWER_OFF.replace_all(content, "");
    let lowered = sanitized.to_lowercase();
    FAILURE_WORDS.iter().any(|word| lowered.contains(word))
}

/// Path of a generated file mentioned in observation text, if any.
pub fn file_marker(content: &str) -> Option<&str> {
    if !content.contains("path") {
        return None;
    }
    let captures = FILE_MARKER.captures(content)?;
    captures.get(1).map(|m| m.as_str())
}

/// Milestone label for an action.
pub fn action_label(tool: &str, input: &Value) -> String {
    let arg = |key: &str| input.get(key).and_then(Value::as_str).unwrap_or("");
    let label = match tool {
        "file_write" => format!("Write file {}", arg("path")),
        "file_read" => format!("Read file {}", arg("path")),
        "ta_generator" => format!("Generate TA {}", arg("name")),
        "ca_generator" => format!("Generate CA {}", arg("name")),
        "crypto_helper" => format!("Generate crypto snippet {}", arg("operation")),
        other => format!("Run tool {}", other),
    };
    label.trim_end().to_string()
}

/// Log line for an action: the tool name and its input as compact JSON.
pub fn action_log_entry(tool: &str, input: &Value) -> String {
    format!("{}: {}", tool, input)
}

/// `42s` under a minute, `3m7s` otherwise.
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (minutes, seconds) = (total / 60, total % 60);
    if minutes == 0 {
        format!("{}s", seconds)
    } else {
        format!("{}m{}s", minutes, seconds)
    }
}
