//! Payload boundary: turns raw CRM JSON into typed records.
//!
//! A payload without its expected container is reported as
//! [`PayloadError`], which callers must keep apart from an empty list.

use crate::models::{Deal, Pipeline, Stage};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// The payload could not be interpreted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    /// The top-level container key is missing or is not a list.
    #[error("payload has no `{key}` list")]
    MissingContainer { key: &'static str },

    /// The payload is not a JSON object or list at all.
    #[error("payload is not a JSON object")]
    NotAnObject,
}

/// Extracts the deals from a `{"deals": [...]}` payload.
pub fn parse_deals(payload: &Value) -> Result<Vec<Deal>, PayloadError> {
    let object = payload.as_object().ok_or(PayloadError::NotAnObject)?;
    let items = object
        .get("deals")
        .and_then(Value::as_array)
        .ok_or(PayloadError::MissingContainer { key: "deals" })?;

    Ok(parse_records(items, "deal"))
}

/// Extracts stage definitions from either `{"deal_stages": [...]}` or a
/// bare list.
pub fn parse_stages(payload: &Value) -> Result<Vec<Stage>, PayloadError> {
    let items = container(payload, "deal_stages")?;
    Ok(parse_records(items, "stage"))
}

/// Extracts pipelines from either `{"deal_pipelines": [...]}` or a bare
/// list.
pub fn parse_pipelines(payload: &Value) -> Result<Vec<Pipeline>, PayloadError> {
    let items = container(payload, "deal_pipelines")?;
    Ok(parse_records(items, "pipeline"))
}

fn container<'a>(payload: &'a Value, key: &'static str) -> Result<&'a Vec<Value>, PayloadError> {
    match payload {
        Value::Array(items) => Ok(items),
        Value::Object(object) => object
            .get(key)
            .and_then(Value::as_array)
            .ok_or(PayloadError::MissingContainer { key }),
        _ => Err(PayloadError::NotAnObject),
    }
}

/// Parses every object in `items`, skipping entries that are not objects.
fn parse_records<T: DeserializeOwned>(items: &[Value], kind: &str) -> Vec<T> {
    let mut records = Vec::with_capacity(items.len());

    for (index, item) in items.iter().enumerate() {
        if !item.is_object() {
            warn!("Skipping {} #{}: not a JSON object", kind, index);
            continue;
        }
        match T::deserialize(item) {
            Ok(record) => records.push(record),
            Err(e) => warn!("Skipping {} #{}: {}", kind, index, e),
        }
    }

    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_deals_key_is_not_empty() {
        assert_eq!(
            parse_deals(&json!({})),
            Err(PayloadError::MissingContainer { key: "deals" })
        );
        assert_eq!(parse_deals(&json!({"deals": []})), Ok(vec![]));
    }

    #[test]
    fn test_deals_container_shape() {
        assert_eq!(
            parse_deals(&json!({"deals": null})),
            Err(PayloadError::MissingContainer { key: "deals" })
        );
        assert_eq!(parse_deals(&json!([1, 2])), Err(PayloadError::NotAnObject));
    }

    #[test]
    fn test_non_object_deals_are_skipped() {
        let deals = parse_deals(&json!({
            "deals": [{"id": "a"}, 7, "junk", {"id": "b"}]
        }))
        .unwrap();

        let ids: Vec<&str> = deals.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_stage_payload_shapes() {
        let wrapped = parse_stages(&json!({"deal_stages": [{"id": "s1", "name": "A"}]})).unwrap();
        let bare = parse_stages(&json!([{"id": "s1", "name": "A"}])).unwrap();
        assert_eq!(wrapped, bare);

        assert_eq!(
            parse_stages(&json!({"stages": []})),
            Err(PayloadError::MissingContainer { key: "deal_stages" })
        );
        assert_eq!(parse_stages(&json!("nope")), Err(PayloadError::NotAnObject));
    }

    #[test]
    fn test_pipeline_payload() {
        let pipelines = parse_pipelines(&json!([
            {"id": "p1", "name": "House", "deal_stages": [{"id": "s1"}]},
            {"id": "p2", "name": "Bulls"}
        ]))
        .unwrap();

        assert_eq!(pipelines.len(), 2);
        assert_eq!(pipelines[0].stages.len(), 1);
        assert!(pipelines[1].stages.is_empty());
    }
}
