//! Parameter-matrix parsing and cartesian expansion.
//!
//! Only the `matrix:` stanza of the raw document is inspected here; the
//! rest of the file is parsed after substitution.

use crate::core::error::{CompileError, ErrorKind};
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;

/// One point in the parameter matrix: named scalar values, folded into
/// the environment of a single workflow compilation.
pub type Axis = BTreeMap<String, String>;

#[derive(Debug, Deserialize)]
struct MatrixFile {
    #[serde(default)]
    matrix: Option<Value>,
}

/// Parse the `matrix:` stanza and expand it into axes.
///
/// Returns an empty list when the document declares no matrix; the
/// builder substitutes a single empty axis in that case. `include:`
/// declares explicit axes and bypasses the cartesian product. The
/// product is refused once it exceeds `max_jobs`.
pub fn parse(data: &str, max_jobs: usize) -> Result<Vec<Axis>, CompileError> {
    let file: MatrixFile = serde_yaml::from_str(data)
        .map_err(|err| CompileError::new(ErrorKind::MatrixParse, err.to_string()))?;

    let Some(matrix) = file.matrix else {
        return Ok(Vec::new());
    };
    let Value::Mapping(mapping) = matrix else {
        return Err(CompileError::new(
            ErrorKind::MatrixParse,
            "matrix must be a mapping of axis names to value lists",
        ));
    };

    let mut include: Option<Vec<Axis>> = None;
    let mut axes: Vec<(String, Vec<String>)> = Vec::new();

    for (key, value) in mapping {
        let key = scalar_string(&key).ok_or_else(|| {
            CompileError::new(ErrorKind::MatrixParse, "matrix axis names must be scalars")
        })?;
        if key == "include" {
            include = Some(parse_include(value)?);
            continue;
        }
        let Value::Sequence(items) = value else {
            return Err(CompileError::new(
                ErrorKind::MatrixParse,
                format!("matrix axis '{}' must be a list", key),
            ));
        };
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            values.push(scalar_string(&item).ok_or_else(|| {
                CompileError::new(
                    ErrorKind::MatrixParse,
                    format!("matrix axis '{}' holds a non-scalar value", key),
                )
            })?);
        }
        axes.push((key, values));
    }

    let expanded = match include {
        Some(axes) => axes,
        None => product(&axes),
    };

    if expanded.len() > max_jobs {
        return Err(CompileError::new(
            ErrorKind::MatrixTooLarge,
            format!(
                "matrix expands to {} jobs, limit is {}",
                expanded.len(),
                max_jobs
            ),
        ));
    }
    Ok(expanded)
}

fn parse_include(value: Value) -> Result<Vec<Axis>, CompileError> {
    let Value::Sequence(entries) = value else {
        return Err(CompileError::new(
            ErrorKind::MatrixParse,
            "matrix include must be a list of mappings",
        ));
    };
    let mut axes = Vec::with_capacity(entries.len());
    for entry in entries {
        let Value::Mapping(mapping) = entry else {
            return Err(CompileError::new(
                ErrorKind::MatrixParse,
                "matrix include entries must be mappings",
            ));
        };
        let mut axis = Axis::new();
        for (key, value) in mapping {
            let key = scalar_string(&key).ok_or_else(|| {
                CompileError::new(ErrorKind::MatrixParse, "matrix keys must be scalars")
            })?;
            let value = scalar_string(&value).ok_or_else(|| {
                CompileError::new(
                    ErrorKind::MatrixParse,
                    format!("matrix include value for '{}' is not a scalar", key),
                )
            })?;
            axis.insert(key, value);
        }
        axes.push(axis);
    }
    Ok(axes)
}

/// Cartesian product of the declared axes, in declaration order.
/// Duplicate values in an axis vector are preserved.
fn product(axes: &[(String, Vec<String>)]) -> Vec<Axis> {
    let mut combos: Vec<Axis> = vec![Axis::new()];
    for (name, values) in axes {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut extended = combo.clone();
                extended.insert(name.clone(), value.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    if axes.is_empty() {
        Vec::new()
    } else {
        combos
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_matrix_yields_no_axes() {
        let axes = parse("steps: {}\n", 100).unwrap();
        assert!(axes.is_empty());
    }

    #[test]
    fn expands_cartesian_product() {
        let axes = parse(
            "matrix:\n  os: [linux, mac]\n  go: [1, 2, 3]\n",
            100,
        )
        .unwrap();
        assert_eq!(axes.len(), 6);
        assert_eq!(axes[0].get("os").unwrap(), "linux");
        assert_eq!(axes[0].get("go").unwrap(), "1");
        assert_eq!(axes[5].get("os").unwrap(), "mac");
        assert_eq!(axes[5].get("go").unwrap(), "3");
    }

    #[test]
    fn include_bypasses_product() {
        let axes = parse(
            "matrix:\n  include:\n    - os: linux\n      go: 1\n    - os: mac\n      go: 3\n",
            100,
        )
        .unwrap();
        assert_eq!(axes.len(), 2);
        assert_eq!(axes[1].get("go").unwrap(), "3");
    }

    #[test]
    fn refuses_oversized_product() {
        let err = parse("matrix:\n  a: [1, 2, 3]\n  b: [1, 2, 3]\n", 8).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MatrixTooLarge);
    }

    #[test]
    fn rejects_non_list_axis() {
        let err = parse("matrix:\n  os: linux\n", 100).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MatrixParse);
    }

    #[test]
    fn preserves_duplicate_axis_values() {
        let axes = parse("matrix:\n  go: [1, 1]\n", 100).unwrap();
        assert_eq!(axes.len(), 2);
        assert_eq!(axes[0], axes[1]);
    }

    #[test]
    fn empty_axis_vector_expands_to_nothing() {
        let axes = parse("matrix:\n  os: []\n", 100).unwrap();
        assert!(axes.is_empty());
    }
}
