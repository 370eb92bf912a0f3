use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TransitionError;

pub const OPTION_LATEST_REVISION: &str = "latest_revision";
pub const OPTION_RECREATE_NON_DEFAULT_HEAD: &str = "recreate_non_default_head";

/// Per-transition behaviour flags.
///
/// Stored as a JSON object; keys other than the two recognised flags are
/// rejected when decoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransitionOptions {
    /// Resolve the target to the head revision at run time instead of
    /// the stored revision id.
    #[serde(default, skip_serializing_if = "is_false")]
    pub latest_revision: bool,

    /// After transitioning a non-head revision, copy the former head back
    /// on top when it was an unpublished draft.
    #[serde(default, skip_serializing_if = "is_false")]
    pub recreate_non_default_head: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl TransitionOptions {
    pub fn latest_revision() -> Self {
        Self {
            latest_revision: true,
            ..Default::default()
        }
    }

    pub fn recreate_non_default_head() -> Self {
        Self {
            recreate_non_default_head: true,
            ..Default::default()
        }
    }

    /// Decode options from an open map, e.g. one submitted by a scheduling UI.
    ///
    /// Values must be booleans (or 0/1). Unknown keys are an error.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, TransitionError> {
        let mut options = TransitionOptions::default();
        for (key, value) in map {
            let flag = as_flag(value).ok_or_else(|| {
                TransitionError::InvalidOptions(format!("option `{key}` must be a boolean"))
            })?;
            match key.as_str() {
                OPTION_LATEST_REVISION => options.latest_revision = flag,
                OPTION_RECREATE_NON_DEFAULT_HEAD => options.recreate_non_default_head = flag,
                other => {
                    return Err(TransitionError::InvalidOptions(format!(
                        "unknown option `{other}`"
                    )))
                }
            }
        }
        Ok(options)
    }

    pub fn to_map(&self) -> Map<String, Value> {
        let mut map = Map::new();
        if self.latest_revision {
            map.insert(OPTION_LATEST_REVISION.to_string(), Value::Bool(true));
        }
        if self.recreate_non_default_head {
            map.insert(OPTION_RECREATE_NON_DEFAULT_HEAD.to_string(), Value::Bool(true));
        }
        map
    }
}

fn as_flag(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn recognised_keys_are_decoded() {
        let options = TransitionOptions::from_map(&map(json!({
            "latest_revision": true,
            "recreate_non_default_head": 1
        })))
        .unwrap();
        assert!(options.latest_revision);
        assert!(options.recreate_non_default_head);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = TransitionOptions::from_map(&map(json!({ "publish_everything": true })))
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::InvalidOptions(msg) if msg.contains("publish_everything")
        ));
    }

    #[test]
    fn non_boolean_values_are_rejected() {
        let err = TransitionOptions::from_map(&map(json!({ "latest_revision": "yes" })))
            .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidOptions(_)));
    }

    #[test]
    fn serde_rejects_unknown_fields() {
        let decoded: Result<TransitionOptions, _> =
            serde_json::from_value(json!({ "latest_revision": true, "extra": false }));
        assert!(decoded.is_err());
    }

    #[test]
    fn empty_options_serialize_to_empty_object() {
        let encoded = serde_json::to_value(TransitionOptions::default()).unwrap();
        assert_eq!(encoded, json!({}));
        assert!(TransitionOptions::default().to_map().is_empty());
    }
}
