use serde_json::{Map, Value};

/// Pull a JSON object out of text that may carry noise around it.
///
/// Tries the whole text, then the outermost `{...}` slice, then the last
/// line that parses as an object. Falls back to an empty object.
pub fn extract_json(text: &str) -> Value {
    if let Ok(v) = serde_json::from_str::<Value>(text) {
        return v;
    }

    if let (Some(first), Some(last)) = (text.find('{'), text.rfind('}')) {
        if last > first {
            if let Ok(v) = serde_json::from_str::<Value>(&text[first..=last]) {
                return v;
            }
        }
    }

    text.lines()
        .map(str::trim)
        .filter(|line| line.starts_with('{'))
        .filter_map(|line| serde_json::from_str::<Value>(line).ok())
        .last()
        .unwrap_or_else(|| Value::Object(Map::new()))
}
