//! Pipeline source specifications as fetched by the forge collaborator.

use serde::{Deserialize, Serialize};

/// An immutable `(name, bytes)` pair holding one pipeline file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,
    pub data: Vec<u8>,
}

impl SourceSpec {
    pub fn new<N: Into<String>, D: Into<Vec<u8>>>(name: N, data: D) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Sort a source set byte-wise by original name so compilation order is
/// deterministic regardless of fetch order.
pub fn sort_by_name(mut sources: Vec<SourceSpec>) -> Vec<SourceSpec> {
    sources.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
    sources
}

/// Display name for a pipeline file: basename, leading dots and
/// trailing `.yml`/`.yaml` stripped. Idempotent.
pub fn sanitize_name(path: &str) -> String {
    let mut base = path.rsplit('/').next().unwrap_or(path);
    loop {
        let trimmed = base
            .strip_suffix(".yml")
            .or_else(|| base.strip_suffix(".yaml"))
            .unwrap_or(base);
        let trimmed = trimmed.strip_prefix('.').unwrap_or(trimmed);
        if trimmed == base {
            return base.to_string();
        }
        base = trimmed;
    }
}
