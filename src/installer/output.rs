//! Extractor output parsing.
//!
//! The in-container extractor emits one JSON object on stdout, but tool
//! startup scripts routinely pollute the stream with log lines. The scan
//! locates the first *balanced* `{...}` block, tracking string literals and
//! escapes so braces inside values do not truncate the object.

use crate::installer::ConfigRecord;

/// Find the first balanced JSON object in a possibly log-polluted string.
pub fn extract_json_object(output: &str) -> Option<&str> {
    let start = output.find('{')?;
    let bytes = output.as_bytes();

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&output[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Parse extractor output into a flat configuration record.
///
/// Non-string JSON values are stringified; the record is string-typed end to
/// end. An extractor-level `{"error": ...}` object parses like any other;
/// error-as-data is the caller's contract, not a parse failure.
///
/// # Errors
///
/// Returns a description of the problem when no balanced object is present,
/// the block is not valid JSON, or the JSON is not an object.
pub fn parse_config_record(output: &str) -> Result<ConfigRecord, String> {
    let block = extract_json_object(output)
        .ok_or_else(|| "no JSON object found in output".to_string())?;

    let value: serde_json::Value =
        serde_json::from_str(block).map_err(|e| format!("invalid JSON block: {}", e))?;

    let serde_json::Value::Object(map) = value else {
        return Err("JSON block is not an object".to_string());
    };

    Ok(map
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}
