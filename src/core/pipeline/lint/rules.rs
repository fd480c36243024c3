use crate::core::pipeline::lint::{LintContext, LintResult, LintRule, LintSeverity};
use crate::core::pipeline::schema::StepDef;
use std::collections::HashSet;

pub fn built_in_rules() -> Vec<Box<dyn LintRule>> {
    vec![
        Box::new(EmptyPipelineRule),
        Box::new(StepImageRule),
        Box::new(DuplicateStepNameRule),
        Box::new(PrivilegedRequestRule),
        Box::new(HostVolumeRule),
        Box::new(HostNetworkRule),
        Box::new(WorkspaceOverrideRule),
        Box::new(SecretScopeRule),
    ]
}

fn all_steps<'a>(
    ctx: &LintContext<'a>,
) -> impl Iterator<Item = (&'static str, &'a StepDef)> + 'a {
    let doc = ctx.doc;
    doc.clone
        .iter()
        .map(|s| ("clone", s))
        .chain(doc.steps.iter().map(|s| ("steps", s)))
        .chain(doc.services.iter().map(|s| ("services", s)))
}

fn location(section: &str, step: &StepDef) -> Option<String> {
    Some(format!("{}.{}", section, step.name))
}

/// Elevated container features are refused outright for untrusted
/// repositories and demoted to warnings for trusted ones.
fn insecure(ctx: &LintContext<'_>) -> LintSeverity {
    if ctx.trusted {
        LintSeverity::Warning
    } else {
        LintSeverity::Error
    }
}

/// A pipeline without a steps section cannot produce work.
pub struct EmptyPipelineRule;

impl LintRule for EmptyPipelineRule {
    fn check(&self, ctx: &LintContext<'_>) -> Vec<LintResult> {
        if ctx.doc.steps.is_empty() {
            return vec![LintResult::new(
                "no-steps",
                LintSeverity::Error,
                "pipeline defines no steps",
                None,
            )];
        }
        Vec::new()
    }
}

/// Every container entry must name an image.
pub struct StepImageRule;

impl LintRule for StepImageRule {
    fn check(&self, ctx: &LintContext<'_>) -> Vec<LintResult> {
        let mut results = Vec::new();
        for (section, step) in all_steps(ctx) {
            if step.image.trim().is_empty() {
                results.push(LintResult::new(
                    "missing-image",
                    LintSeverity::Error,
                    format!("step '{}' has no image", step.name),
                    location(section, step),
                ));
            }
        }
        results
    }
}

/// Step names must be unique across clone, steps, and services: the
/// name namespaces container resources within the workflow.
pub struct DuplicateStepNameRule;

impl LintRule for DuplicateStepNameRule {
    fn check(&self, ctx: &LintContext<'_>) -> Vec<LintResult> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for (section, step) in all_steps(ctx) {
            if !seen.insert(step.name.clone()) {
                results.push(LintResult::new(
                    "duplicate-step-name",
                    LintSeverity::Error,
                    format!("duplicate step name '{}'", step.name),
                    location(section, step),
                ));
            }
        }
        results
    }
}

/// A `privileged: true` request never grants anything by itself (the
/// escalation list decides), so it is surfaced as a warning only.
pub struct PrivilegedRequestRule;

impl LintRule for PrivilegedRequestRule {
    fn check(&self, ctx: &LintContext<'_>) -> Vec<LintResult> {
        let mut results = Vec::new();
        for (section, step) in all_steps(ctx) {
            if step.privileged {
                results.push(LintResult::new(
                    "privileged-request",
                    LintSeverity::Warning,
                    format!(
                        "step '{}' requests privileged mode; privilege is granted only via the escalation list",
                        step.name
                    ),
                    location(section, step),
                ));
            }
        }
        results
    }
}

/// Host-path volume mounts expose the agent filesystem.
pub struct HostVolumeRule;

impl LintRule for HostVolumeRule {
    fn check(&self, ctx: &LintContext<'_>) -> Vec<LintResult> {
        let mut results = Vec::new();
        for (section, step) in all_steps(ctx) {
            for volume in &step.volumes {
                if volume.contains(':') {
                    results.push(LintResult::new(
                        "host-volume",
                        insecure(ctx),
                        format!(
                            "step '{}' mounts host path '{}'",
                            step.name, volume
                        ),
                        location(section, step),
                    ));
                }
            }
        }
        results
    }
}

/// `settings.network_mode` attaches a step to arbitrary host networks.
pub struct HostNetworkRule;

impl LintRule for HostNetworkRule {
    fn check(&self, ctx: &LintContext<'_>) -> Vec<LintResult> {
        let mut results = Vec::new();
        for (section, step) in all_steps(ctx) {
            if step.settings.contains_key("network_mode") {
                results.push(LintResult::new(
                    "host-network",
                    insecure(ctx),
                    format!("step '{}' sets network_mode", step.name),
                    location(section, step),
                ));
            }
        }
        results
    }
}

/// Workspace relocation via settings can shadow the checkout of other
/// steps.
pub struct WorkspaceOverrideRule;

impl LintRule for WorkspaceOverrideRule {
    fn check(&self, ctx: &LintContext<'_>) -> Vec<LintResult> {
        let mut results = Vec::new();
        for (section, step) in all_steps(ctx) {
            if step.settings.contains_key("workspace")
                || step.settings.contains_key("workspace_base")
            {
                results.push(LintResult::new(
                    "workspace-override",
                    insecure(ctx),
                    format!("step '{}' overrides the workspace path", step.name),
                    location(section, step),
                ));
            }
        }
        results
    }
}

/// Untrusted repositories may only request secrets scoped to plain
/// names; path-style names would reach into another repository's scope.
pub struct SecretScopeRule;

impl LintRule for SecretScopeRule {
    fn check(&self, ctx: &LintContext<'_>) -> Vec<LintResult> {
        let mut results = Vec::new();
        for (section, step) in all_steps(ctx) {
            for secret in &step.secrets {
                if secret.source().contains('/') {
                    results.push(LintResult::new(
                        "foreign-secret",
                        insecure(ctx),
                        format!(
                            "step '{}' requests secret '{}' outside the repository scope",
                            step.name,
                            secret.source()
                        ),
                        location(section, step),
                    ));
                }
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pipeline::lint::LintRegistry;
    use crate::core::pipeline::schema;

    fn run(yaml: &str, trusted: bool) -> Vec<LintResult> {
        let doc = schema::parse(yaml).unwrap();
        LintRegistry::new().run(&LintContext {
            doc: &doc,
            file: "test",
            trusted,
        })
    }

    #[test]
    fn clean_pipeline_has_no_findings() {
        let results = run(
            "steps:\n  build:\n    image: alpine\n    commands: [make]\n",
            false,
        );
        assert!(results.is_empty());
    }

    #[test]
    fn pipeline_without_steps_is_an_error() {
        let results = run("services:\n  db:\n    image: postgres\n", true);
        assert!(results
            .iter()
            .any(|r| r.code == "no-steps" && r.severity == LintSeverity::Error));
    }

    #[test]
    fn missing_image_is_an_error() {
        let results = run("steps:\n  build:\n    commands: [make]\n", true);
        assert_eq!(results[0].code, "missing-image");
        assert_eq!(results[0].severity, LintSeverity::Error);
    }

    #[test]
    fn duplicate_names_across_sections_error() {
        let results = run(
            "steps:\n  db:\n    image: alpine\nservices:\n  db:\n    image: postgres\n",
            true,
        );
        assert!(results.iter().any(|r| r.code == "duplicate-step-name"
            && r.severity == LintSeverity::Error));
    }

    #[test]
    fn privileged_request_is_a_warning_only() {
        let results = run(
            "steps:\n  build:\n    image: alpine\n    privileged: true\n",
            false,
        );
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].code, "privileged-request");
        assert_eq!(results[0].severity, LintSeverity::Warning);
    }

    #[test]
    fn host_volume_severity_follows_trust() {
        let yaml = "steps:\n  build:\n    image: alpine\n    volumes:\n      - /var/run/docker.sock:/var/run/docker.sock\n";
        let untrusted = run(yaml, false);
        assert_eq!(untrusted[0].severity, LintSeverity::Error);
        let trusted = run(yaml, true);
        assert_eq!(trusted[0].severity, LintSeverity::Warning);
    }

    #[test]
    fn network_mode_and_workspace_follow_trust() {
        let yaml = "steps:\n  build:\n    image: alpine\n    settings:\n      network_mode: host\n      workspace: /srv\n";
        let untrusted = run(yaml, false);
        assert!(untrusted
            .iter()
            .any(|r| r.code == "host-network" && r.severity == LintSeverity::Error));
        assert!(untrusted
            .iter()
            .any(|r| r.code == "workspace-override" && r.severity == LintSeverity::Error));
    }

    #[test]
    fn foreign_secret_scope_follows_trust() {
        let yaml = "steps:\n  deploy:\n    image: alpine\n    secrets:\n      - other/repo/token\n";
        let untrusted = run(yaml, false);
        assert_eq!(untrusted[0].code, "foreign-secret");
        assert_eq!(untrusted[0].severity, LintSeverity::Error);
    }
}
