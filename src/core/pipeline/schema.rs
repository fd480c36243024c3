//! Typed declarative workflow tree.
//!
//! Parsing happens after substitution; the grammar is closed, so any
//! unknown key at any level is a parse error, not a warning.

use crate::core::error::{CompileError, ErrorKind};
use crate::core::pipeline::when::When;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;

/// A parsed pipeline file, post-substitution.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineDoc {
    pub when: Option<When>,
    /// Consumed before substitution by the matrix expander; accepted
    /// here so the closed grammar admits it.
    pub matrix: Option<Value>,
    /// Free-form YAML anchors; carries no meaning of its own.
    pub variables: Option<Value>,
    pub labels: ScalarMap,
    pub depends_on: Vec<String>,
    pub runs_on: Vec<String>,
    pub platform: String,
    pub clone: StepMap,
    pub steps: StepMap,
    pub services: StepMap,
}

/// One container step as authored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StepDef {
    /// Set from the mapping key, never from the document body.
    #[serde(skip)]
    pub name: String,
    pub image: String,
    pub commands: Commands,
    pub entrypoint: Vec<String>,
    pub environment: ScalarMap,
    pub secrets: Vec<SecretRef>,
    pub volumes: Vec<String>,
    pub when: Option<When>,
    /// Plugin settings, serialized into `PLUGIN_*` variables.
    pub settings: BTreeMap<String, Value>,
    pub pull: bool,
    pub detach: bool,
    pub privileged: bool,
}

impl StepDef {
    /// A step with no user commands runs a published plugin image; the
    /// distinction gates plugin-only secrets.
    pub fn is_plugin(&self) -> bool {
        self.commands.0.is_empty()
    }
}

/// Ordered step collection, keyed by step name in the document.
#[derive(Debug, Clone, Default)]
pub struct StepMap(pub Vec<StepDef>);

impl StepMap {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StepDef> {
        self.0.iter()
    }
}

impl<'de> Deserialize<'de> for StepMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StepMapVisitor;

        impl<'de> Visitor<'de> for StepMapVisitor {
            type Value = StepMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping of step names to step definitions")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut steps = Vec::new();
                while let Some((name, mut step)) =
                    access.next_entry::<String, StepDef>()?
                {
                    step.name = name;
                    steps.push(step);
                }
                Ok(StepMap(steps))
            }
        }

        deserializer.deserialize_map(StepMapVisitor)
    }
}

/// `commands` accepts a single string or a list of strings.
#[derive(Debug, Clone, Default)]
pub struct Commands(pub Vec<String>);

impl<'de> Deserialize<'de> for Commands {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        match Value::deserialize(deserializer)? {
            Value::String(line) => Ok(Commands(vec![line])),
            Value::Sequence(items) => {
                let mut lines = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::String(line) => lines.push(line),
                        _ => return Err(D::Error::custom("commands must be strings")),
                    }
                }
                Ok(Commands(lines))
            }
            _ => Err(D::Error::custom("commands must be a string or a list")),
        }
    }
}

/// A string-to-string map that stringifies scalar YAML values and
/// rejects nested structures.
#[derive(Debug, Clone, Default)]
pub struct ScalarMap(pub BTreeMap<String, String>);

impl<'de> Deserialize<'de> for ScalarMap {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de::Error;
        let Value::Mapping(mapping) = Value::deserialize(deserializer)? else {
            return Err(D::Error::custom("expected a mapping of scalars"));
        };
        let mut map = BTreeMap::new();
        for (key, value) in mapping {
            let key = scalar_string(&key)
                .ok_or_else(|| D::Error::custom("keys must be scalars"))?;
            let value = scalar_string(&value).ok_or_else(|| {
                D::Error::custom(format!("value for '{}' must be a scalar", key))
            })?;
            map.insert(key, value);
        }
        Ok(ScalarMap(map))
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A secret request: either a bare store name, or a store name exposed
/// under a different target variable.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SecretRef {
    Name(String),
    Renamed {
        source: String,
        target: String,
    },
}

impl SecretRef {
    pub fn source(&self) -> &str {
        match self {
            SecretRef::Name(name) => name,
            SecretRef::Renamed { source, .. } => source,
        }
    }

    pub fn target(&self) -> &str {
        match self {
            SecretRef::Name(name) => name,
            SecretRef::Renamed { target, .. } => target,
        }
    }
}

/// Parse substituted pipeline text into the typed tree.
pub fn parse(text: &str) -> Result<PipelineDoc, CompileError> {
    serde_yaml::from_str(text).map_err(|err| {
        CompileError::new(ErrorKind::PipelineParse, err.to_string())
            .with_source(Box::new(err))
    })
}
