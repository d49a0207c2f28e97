use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Kind of DSP stage a module represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleKind {
    Equalizer,
    Compressor,
    Limiter,
    Reverb,
    Delay,
    NoiseGate,
    Gain,
    StereoWidener,
    Saturation,
}

/// A module parameter: either numeric or one of a fixed set of choices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Choice(String),
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Number(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Choice(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Choice(value)
    }
}

fn enabled_by_default() -> bool {
    true
}

/// Descriptor for one stage of the local processing chain.
///
/// Identity is `id`. An empty id asks the chain manager to assign one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingModule {
    #[serde(default)]
    pub id: String,
    pub kind: ModuleKind,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamValue>,
}

impl ProcessingModule {
    pub fn new(kind: ModuleKind) -> Self {
        Self {
            id: String::new(),
            kind,
            enabled: true,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Numeric parameter value, if present and numeric.
    pub fn number(&self, name: &str) -> Option<f64> {
        match self.parameters.get(name) {
            Some(ParamValue::Number(value)) => Some(*value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_with_defaults() {
        let module: ProcessingModule =
            serde_json::from_str(r#"{"kind":"compressor","parameters":{"ratio":4.0,"knee":"soft"}}"#)
                .unwrap();
        assert!(module.id.is_empty());
        assert!(module.enabled);
        assert_eq!(module.number("ratio"), Some(4.0));
        assert_eq!(
            module.parameters.get("knee"),
            Some(&ParamValue::Choice("soft".to_string()))
        );
        assert_eq!(module.number("knee"), None);
    }
}
