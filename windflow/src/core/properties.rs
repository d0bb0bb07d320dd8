use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde_yaml::Value;

use crate::core::error::{Error, Result};

/// Flat `key -> value` configuration map. Nested YAML mappings are flattened with `.`, so
/// `window: {size: 10}` and `window.size: 10` are the same property.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Properties {
    properties: HashMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Properties {
            properties: HashMap::new(),
        }
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let value: Value = serde_yaml::from_str(yaml)?;
        Properties::from_value(value)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Properties::from_value(value)
    }

    fn from_value(value: Value) -> Result<Self> {
        let mut properties = Properties::new();
        match value {
            Value::Mapping(_) => flatten("", &value, &mut properties)?,
            Value::Null => {}
            _ => {
                return Err(Error::ConfigValidation(
                    "properties document must be a mapping".to_string(),
                ))
            }
        }
        Ok(properties)
    }

    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.properties
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(|k| k.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.properties.insert(key.to_string(), value.to_string());
    }

    pub fn set_string(&mut self, key: String, value: String) {
        self.properties.insert(key, value);
    }

    pub fn get_string(&self, key: &str) -> Result<String> {
        match self.properties.get(key) {
            Some(v) => Ok(v.clone()),
            None => Err(Error::ConfigValidation(format!("`{}` is required", key))),
        }
    }

    pub fn get_opt_string(&self, key: &str) -> Option<String> {
        self.properties.get(key).cloned()
    }

    pub fn set_u64(&mut self, key: &str, value: u64) {
        self.set_string(key.to_string(), value.to_string());
    }

    pub fn get_u64(&self, key: &str) -> Result<u64> {
        self.get_opt_u64(key)?
            .ok_or_else(|| Error::ConfigValidation(format!("`{}` is required", key)))
    }

    pub fn get_opt_u64(&self, key: &str) -> Result<Option<u64>> {
        match self.properties.get(key) {
            Some(v) => u64::from_str(v.trim()).map(Some).map_err(|e| {
                Error::ConfigValidation(format!("`{}`=`{}` is not an unsigned integer: {}", key, v, e))
            }),
            None => Ok(None),
        }
    }

    pub fn get_u64_or(&self, key: &str, default_value: u64) -> Result<u64> {
        self.get_opt_u64(key).map(|v| v.unwrap_or(default_value))
    }

    /// Durations are plain milliseconds.
    pub fn get_duration_ms(&self, key: &str, default_ms: u64) -> Result<Duration> {
        self.get_u64_or(key, default_ms).map(Duration::from_millis)
    }
}

fn flatten(prefix: &str, value: &Value, properties: &mut Properties) -> Result<()> {
    match value {
        Value::Mapping(mapping) => {
            for (k, v) in mapping {
                let k = scalar_to_string(k).ok_or_else(|| {
                    Error::ConfigValidation(format!("unsupported key under `{}`", prefix))
                })?;
                let key = if prefix.is_empty() {
                    k
                } else {
                    format!("{}.{}", prefix, k)
                };
                flatten(key.as_str(), v, properties)?;
            }
            Ok(())
        }
        _ => match scalar_to_string(value) {
            Some(v) => {
                properties.set_string(prefix.to_string(), v);
                Ok(())
            }
            None => Err(Error::ConfigValidation(format!(
                "unsupported value of `{}`",
                prefix
            ))),
        },
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::core::properties::Properties;

    #[test]
    pub fn from_yaml_flatten_test() {
        let properties = Properties::from_yaml(
            r#"
window:
  type: tumbling
  size: 10000
engine.workers: 4
"#,
        )
        .unwrap();

        assert_eq!(properties.get_string("window.type").unwrap(), "tumbling");
        assert_eq!(properties.get_u64("window.size").unwrap(), 10000);
        assert_eq!(properties.get_u64("engine.workers").unwrap(), 4);
        assert_eq!(properties.get_u64_or("window.gap", 7).unwrap(), 7);
    }

    #[test]
    pub fn typed_getter_error_test() {
        let mut properties = Properties::new();
        properties.set_str("window.size", "ten");
        assert!(properties.get_u64("window.size").is_err());
        assert!(properties.get_u64("window.slide").is_err());
        assert!(Properties::from_yaml("- a\n- b").is_err());
    }

    #[test]
    pub fn from_json_test() {
        let properties = Properties::from_json(
            r#"{"window": {"type": "session", "gap": 5000}, "engine.emit_mode": "update"}"#,
        )
        .unwrap();

        assert_eq!(properties.get_string("window.type").unwrap(), "session");
        assert_eq!(
            properties.get_duration_ms("window.gap", 0).unwrap(),
            Duration::from_millis(5000)
        );
        assert_eq!(properties.get_string("engine.emit_mode").unwrap(), "update");
        assert_eq!(
            properties.get_duration_ms("window.allowed_lateness", 100).unwrap(),
            Duration::from_millis(100)
        );
        assert!(Properties::from_json("[1, 2]").is_err());
    }
}
