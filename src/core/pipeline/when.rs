//! When-filter predicates: decide whether a workflow (or a single step)
//! applies to the event under compilation.

use crate::core::error::{CompileError, ErrorKind};
use crate::core::pipeline::matrix::Axis;
use crate::core::pipeline::schema::ScalarMap;
use crate::core::types::EventKind;
use rhai::{Dynamic, Engine, Scope};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::HashMap;

/// A `when` block. A missing block always matches.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct When {
    pub event: Constraint,
    pub branch: Constraint,
    #[serde(rename = "ref")]
    pub git_ref: Constraint,
    pub path: Constraint,
    pub platform: Constraint,
    pub matrix: ScalarMap,
    /// Custom predicate evaluated on a locked-down expression engine
    /// with the bound environment in scope.
    pub eval: Option<String>,
}

/// Metadata the predicates are evaluated against.
pub struct FilterContext<'a> {
    pub event: EventKind,
    pub branch: &'a str,
    pub git_ref: &'a str,
    pub platform: &'a str,
    pub changed_files: &'a [String],
    pub axis: &'a Axis,
    pub environ: &'a HashMap<String, String>,
}

impl When {
    pub fn is_empty(&self) -> bool {
        self.event.is_empty()
            && self.branch.is_empty()
            && self.git_ref.is_empty()
            && self.path.is_empty()
            && self.platform.is_empty()
            && self.matrix.0.is_empty()
            && self.eval.is_none()
    }

    /// Evaluate the predicate. `Ok(false)` means "skip"; an `Err` aborts
    /// the whole compilation.
    pub fn matches(&self, ctx: &FilterContext<'_>) -> Result<bool, CompileError> {
        if !self.event.matches(ctx.event.as_str()) {
            return Ok(false);
        }
        if !self.branch.matches(ctx.branch) {
            return Ok(false);
        }
        if !self.git_ref.matches(ctx.git_ref) {
            return Ok(false);
        }
        if !self.platform.matches(ctx.platform) {
            return Ok(false);
        }
        if !self.matches_paths(ctx.changed_files) {
            return Ok(false);
        }
        for (key, want) in &self.matrix.0 {
            if ctx.axis.get(key) != Some(want) {
                return Ok(false);
            }
        }
        if let Some(expr) = &self.eval {
            return evaluate(expr, ctx.environ);
        }
        Ok(true)
    }

    fn matches_paths(&self, changed: &[String]) -> bool {
        if self.path.is_empty() {
            return true;
        }
        // Events without a file list (tags, manual runs) always pass.
        if changed.is_empty() {
            return true;
        }
        let remaining: Vec<&str> = changed
            .iter()
            .map(String::as_str)
            .filter(|file| !self.path.excluded(file))
            .collect();
        if self.path.include.is_empty() {
            return !remaining.is_empty();
        }
        remaining.iter().any(|file| self.path.included(file))
    }
}

/// An include/exclude constraint over glob patterns. Accepts a scalar,
/// a list, or an explicit `{include, exclude}` mapping. Excludes win;
/// an empty include admits everything.
#[derive(Debug, Clone, Default)]
pub struct Constraint {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Constraint {
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn matches(&self, value: &str) -> bool {
        if self.excluded(value) {
            return false;
        }
        self.include.is_empty() || self.included(value)
    }

    fn included(&self, value: &str) -> bool {
        self.include.iter().any(|p| glob_match(p, value))
    }

    fn excluded(&self, value: &str) -> bool {
        self.exclude.iter().any(|p| glob_match(p, value))
    }
}

fn glob_match(pattern: &str, value: &str) -> bool {
    match glob::Pattern::new(pattern) {
        Ok(pattern) => pattern.matches(value),
        Err(_) => pattern == value,
    }
}

impl<'de> Deserialize<'de> for Constraint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::Sequence(items) => Ok(Constraint {
                include: scalar_list(items).map_err(D::Error::custom)?,
                exclude: Vec::new(),
            }),
            Value::Mapping(mapping) => {
                let mut constraint = Constraint::default();
                for (key, value) in mapping {
                    let key = scalar(&key)
                        .ok_or_else(|| D::Error::custom("constraint keys must be scalars"))?;
                    let list = match value {
                        Value::Sequence(items) => {
                            scalar_list(items).map_err(D::Error::custom)?
                        }
                        other => vec![scalar(&other).ok_or_else(|| {
                            D::Error::custom("constraint values must be scalars or lists")
                        })?],
                    };
                    match key.as_str() {
                        "include" => constraint.include = list,
                        "exclude" => constraint.exclude = list,
                        other => {
                            return Err(D::Error::custom(format!(
                                "unknown constraint key '{}'",
                                other
                            )))
                        }
                    }
                }
                Ok(constraint)
            }
            other => match scalar(&other) {
                Some(single) => Ok(Constraint {
                    include: vec![single],
                    exclude: Vec::new(),
                }),
                None => Err(D::Error::custom("invalid constraint value")),
            },
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_list(items: Vec<Value>) -> Result<Vec<String>, String> {
    items
        .iter()
        .map(|item| scalar(item).ok_or_else(|| "constraint lists must hold scalars".to_string()))
        .collect()
}

/// Run a custom `eval:` expression on a locked-down engine. Every bound
/// environment variable is available as a string variable.
fn evaluate(expr: &str, environ: &HashMap<String, String>) -> Result<bool, CompileError> {
    let mut engine = Engine::new_raw();
    engine.set_max_operations(50_000);
    engine.set_max_call_levels(16);
    engine.set_max_expr_depths(32, 32);

    let mut scope = Scope::new();
    for (key, value) in environ {
        scope.push_dynamic(key.as_str(), Dynamic::from(value.clone()));
    }

    let result = engine
        .eval_expression_with_scope::<Dynamic>(&mut scope, expr)
        .map_err(|err| {
            CompileError::new(
                ErrorKind::Filter,
                format!("eval predicate failed: {}", err),
            )
        })?;
    result.try_cast::<bool>().ok_or_else(|| {
        CompileError::new(
            ErrorKind::Filter,
            "eval predicate must produce a boolean".to_string(),
        )
    })
}
