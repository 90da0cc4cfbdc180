//! Keyword overlay: named arguments carried in the last positional slot.
//!
//! The wire only has positional arguments. A caller that wants keywords
//! appends a string of the form `js:<JSON object>`. Extraction is best-effort
//! and never fails the call; anything unsuitable stays positional.

use super::command::CallArgs;
use crate::config::ProxyConfig;
use serde_json::{Map, Value};
use tracing::debug;

/// Try to read a keyword overlay from the last element of `params`.
///
/// Returns the keyword map only when the trailing string carries the prefix,
/// parses as a non-empty JSON object, and every key is one of `schema`.
pub fn extract_overlay(params: &[Value], schema: &[&str]) -> Option<Map<String, Value>> {
    let Some(Value::String(last)) = params.last() else {
        return None;
    };
    let body = last.strip_prefix(ProxyConfig::OVERLAY_PREFIX)?;

    let keywords = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) if !map.is_empty() => map,
        Ok(_) => {
            debug!("Keyword overlay ignored: not a non-empty object");
            return None;
        }
        Err(e) => {
            debug!("Keyword overlay ignored: {}", e);
            return None;
        }
    };

    if let Some(unknown) = keywords
        .keys()
        .find(|key| !schema.iter().any(|param| *param == key.as_str()))
    {
        debug!("Keyword overlay ignored: unknown parameter {}", unknown);
        return None;
    }

    Some(keywords)
}

/// Split raw wire parameters into positional arguments and keywords.
pub fn resolve_call_args(mut params: Vec<Value>, schema: &[&str]) -> CallArgs {
    match extract_overlay(&params, schema) {
        Some(keywords) => {
            params.pop();
            CallArgs::new(params, keywords)
        }
        None => CallArgs::positional(params),
    }
}

/// Encode keywords as the trailing overlay argument a server understands.
pub fn encode_overlay(keywords: &Map<String, Value>) -> Value {
    Value::String(format!(
        "{}{}",
        ProxyConfig::OVERLAY_PREFIX,
        Value::Object(keywords.clone())
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SCHEMA: &[&str] = &["text", "repeat"];

    #[test]
    fn test_overlay_moves_trailing_json_into_keywords() {
        let args = resolve_call_args(vec![json!("42"), json!("js:{\"repeat\":5}")], SCHEMA);

        assert_eq!(args.positional, vec![json!("42")]);
        assert_eq!(args.keywords.get("repeat"), Some(&json!(5)));
    }

    #[test]
    fn test_invalid_json_stays_positional() {
        let params = vec![json!("42"), json!("js:not valid json")];
        let args = resolve_call_args(params.clone(), SCHEMA);

        assert_eq!(args.positional, params);
        assert!(args.keywords.is_empty());
    }

    #[test]
    fn test_unknown_key_stays_positional() {
        let params = vec![json!("42"), json!("js:{\"unknown_param\":1}")];
        let args = resolve_call_args(params.clone(), SCHEMA);

        assert_eq!(args.positional, params);
        assert!(args.keywords.is_empty());
    }

    #[test]
    fn test_one_unknown_key_rejects_whole_overlay() {
        let params = vec![json!("js:{\"repeat\":2,\"colour\":\"red\"}")];
        assert!(extract_overlay(&params, SCHEMA).is_none());
    }

    #[test]
    fn test_empty_object_and_non_object_are_ignored() {
        assert!(extract_overlay(&[json!("js:{}")], SCHEMA).is_none());
        assert!(extract_overlay(&[json!("js:[1,2]")], SCHEMA).is_none());
        assert!(extract_overlay(&[json!("js:7")], SCHEMA).is_none());
    }

    #[test]
    fn test_prefix_and_position_are_required() {
        assert!(extract_overlay(&[], SCHEMA).is_none());
        assert!(extract_overlay(&[json!("{\"repeat\":1}")], SCHEMA).is_none());
        assert!(extract_overlay(&[json!("JS:{\"repeat\":1}")], SCHEMA).is_none());
        assert!(extract_overlay(&[json!({"repeat": 1})], SCHEMA).is_none());
        assert!(extract_overlay(&[json!("js:{\"repeat\":1}"), json!("tail")], SCHEMA).is_none());
    }

    #[test]
    fn test_encode_overlay_is_accepted_by_extract() {
        let mut keywords = Map::new();
        keywords.insert("repeat".into(), json!(3));

        let encoded = encode_overlay(&keywords);
        assert_eq!(encoded, json!("js:{\"repeat\":3}"));
        assert_eq!(extract_overlay(&[encoded], SCHEMA), Some(keywords));
    }
}
