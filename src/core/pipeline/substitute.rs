//! `${VAR}` substitution over raw pipeline text.
//!
//! Runs after matrix selection and before structural parsing so matrix
//! values and metadata can shape the file itself. Unknown variables are
//! an error; the core never silently elides.

use crate::core::error::{CompileError, ErrorKind};
use std::collections::HashMap;

/// Substitute every `${NAME}` reference in `input` against `env`.
pub fn substitute(
    input: &str,
    env: &HashMap<String, String>,
) -> Result<String, CompileError> {
    let mut output = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        // `$${...}` escapes substitution so shell parameter expansion
        // can pass through to step commands untouched.
        if start > 0 && rest.as_bytes()[start - 1] == b'$' {
            output.push_str(&rest[..start - 1]);
            output.push_str("${");
            rest = &rest[start + 2..];
            continue;
        }
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after.find('}').ok_or_else(|| {
            CompileError::new(
                ErrorKind::Substitution,
                "unterminated ${ placeholder".to_string(),
            )
        })?;
        let name = &after[..end];
        if name.is_empty() || !is_identifier(name) {
            return Err(CompileError::new(
                ErrorKind::Substitution,
                format!("malformed placeholder ${{{}}}", name),
            ));
        }
        let value = env.get(name).ok_or_else(|| {
            CompileError::new(
                ErrorKind::Substitution,
                format!("unknown variable {}", name),
            )
        })?;
        if !is_balanced(value) {
            return Err(CompileError::new(
                ErrorKind::Substitution,
                format!(
                    "refusing to substitute {}: value introduces unbalanced delimiters",
                    name
                ),
            ));
        }
        output.push_str(value);
        rest = &after[end + 1..];
    }
    output.push_str(rest);
    Ok(output)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A substituted value must not change the document's flow structure:
/// `{}`/`[]` pairs have to close within the value itself.
fn is_balanced(value: &str) -> bool {
    let mut braces = 0i32;
    let mut brackets = 0i32;
    for c in value.chars() {
        match c {
            '{' => braces += 1,
            '}' => braces -= 1,
            '[' => brackets += 1,
            ']' => brackets -= 1,
            _ => {}
        }
        if braces < 0 || brackets < 0 {
            return false;
        }
    }
    braces == 0 && brackets == 0
}
