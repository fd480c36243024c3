//! Lowering: turns a parsed workflow into the backend representation.
//!
//! The compiler is a plain settings struct; the builder materializes it
//! once per workflow with the configuration snapshot already folded in.

use crate::core::config::ResourceLimits;
use crate::core::error::{CompileError, ErrorKind};
use crate::core::metadata::Metadata;
use crate::core::pipeline::backend::{AuthConfig, Config, Conn, Network, Stage, Step, Volume};
use crate::core::pipeline::matrix::Axis;
use crate::core::pipeline::schema::{PipelineDoc, StepDef};
use crate::core::pipeline::when::FilterContext;
use crate::core::secret::{Netrc, Registry, Secret};
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepRole {
    Clone,
    Service,
    User,
}

/// Per-workflow compiler settings.
pub struct Compiler {
    pub metadata: Metadata,
    pub axis: Axis,
    /// Composed environment: metadata, then axis, then caller globals.
    pub environ: HashMap<String, String>,
    /// Names owned by the metadata binder; nothing may clobber them.
    pub reserved: HashSet<String>,
    pub escalated: Vec<String>,
    pub limits: ResourceLimits,
    pub extra_volumes: Vec<String>,
    pub extra_networks: Vec<String>,
    pub netrc: Option<Netrc>,
    pub netrc_enabled: bool,
    pub netrc_only_trusted: bool,
    pub default_clone_image: String,
    pub registries: Vec<Registry>,
    pub secrets: Vec<Secret>,
    pub prefix: String,
    pub workspace_base: String,
    pub trusted: bool,
}

impl Compiler {
    /// Lower the parsed workflow into an executable plan.
    pub fn compile(&self, doc: &PipelineDoc) -> Result<Config, CompileError> {
        let mut config = Config {
            stages: Vec::new(),
            networks: vec![Network {
                name: format!("{}_default", self.prefix),
                driver: "bridge".to_string(),
            }],
            volumes: vec![Volume {
                name: format!("{}_default", self.prefix),
                driver: "local".to_string(),
            }],
        };

        let mut stage_index = 0usize;

        // Clone stage: authored clone steps, or a generated one when a
        // default clone image is configured.
        let mut clone_steps = Vec::new();
        if !doc.clone.is_empty() {
            for def in doc.clone.iter() {
                if !self.step_applies(def)? {
                    continue;
                }
                clone_steps.push(self.lower_step(def, StepRole::Clone)?);
            }
        } else if !self.default_clone_image.is_empty() {
            let generated = StepDef {
                name: "clone".to_string(),
                image: self.default_clone_image.clone(),
                ..Default::default()
            };
            clone_steps.push(self.lower_step(&generated, StepRole::Clone)?);
        }
        self.push_stage(&mut config, &mut stage_index, "clone", clone_steps);

        // Services run detached for the remainder of the workflow.
        let mut service_steps = Vec::new();
        for def in doc.services.iter() {
            if !self.step_applies(def)? {
                continue;
            }
            service_steps.push(self.lower_step(def, StepRole::Service)?);
        }
        self.push_stage(&mut config, &mut stage_index, "services", service_steps);

        // User steps declare no ordering between one another, so they
        // form a single concurrent stage.
        let mut user_steps = Vec::new();
        for def in doc.steps.iter() {
            if !self.step_applies(def)? {
                continue;
            }
            user_steps.push(self.lower_step(def, StepRole::User)?);
        }
        self.push_stage(&mut config, &mut stage_index, "pipeline", user_steps);

        Ok(config)
    }

    fn push_stage(
        &self,
        config: &mut Config,
        stage_index: &mut usize,
        alias: &str,
        steps: Vec<Step>,
    ) {
        if steps.is_empty() {
            return;
        }
        config.stages.push(Stage {
            name: format!("{}_stage_{}", self.prefix, stage_index),
            alias: alias.to_string(),
            steps,
        });
        *stage_index += 1;
    }

    fn step_applies(&self, def: &StepDef) -> Result<bool, CompileError> {
        let Some(when) = &def.when else {
            return Ok(true);
        };
        when.matches(&FilterContext {
            event: self.metadata.curr.event,
            branch: &self.metadata.curr.branch,
            git_ref: &self.metadata.curr.git_ref,
            platform: &self.metadata.forge.platform,
            changed_files: &self.metadata.curr.changed_files,
            axis: &self.axis,
            environ: &self.environ,
        })
        .map_err(|err| err.with_location(format!("steps.{}", def.name)))
    }

    fn lower_step(&self, def: &StepDef, role: StepRole) -> Result<Step, CompileError> {
        let name = format!("{}_{}", self.prefix, slug(&def.name));
        let uuid = Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string();

        let mut environment: BTreeMap<String, String> = BTreeMap::new();
        for (key, value) in &self.environ {
            environment.insert(key.clone(), value.clone());
        }
        for (key, value) in &def.environment.0 {
            if !self.reserved.contains(key) {
                environment.insert(key.clone(), value.clone());
            }
        }
        for (key, value) in &def.settings {
            environment.insert(
                format!("PLUGIN_{}", key.to_uppercase()),
                settings_value(value).map_err(|err| {
                    err.with_location(format!("steps.{}.settings.{}", def.name, key))
                })?,
            );
        }

        self.inject_netrc(&mut environment, role);
        self.inject_secrets(&mut environment, def)?;

        let mut volumes = vec![format!("{}_default:{}", self.prefix, self.workspace_base)];
        volumes.extend(self.extra_volumes.iter().cloned());
        if self.trusted {
            volumes.extend(def.volumes.iter().cloned());
        }

        let mut networks = vec![Conn {
            name: format!("{}_default", self.prefix),
            aliases: vec![def.name.clone()],
        }];
        for network in &self.extra_networks {
            networks.push(Conn {
                name: network.clone(),
                aliases: Vec::new(),
            });
        }

        Ok(Step {
            name,
            alias: def.name.clone(),
            uuid,
            image: def.image.clone(),
            pull: def.pull,
            detached: role == StepRole::Service || def.detach,
            privileged: self.trusted && self.is_escalated(&def.image),
            working_dir: self.workspace_dir(),
            environment,
            entrypoint: def.entrypoint.clone(),
            commands: def.commands.0.clone(),
            volumes,
            networks,
            mem_limit: self.limits.mem_limit,
            mem_swap_limit: self.limits.mem_swap_limit,
            shm_size: self.limits.shm_size,
            cpu_quota: self.limits.cpu_quota,
            cpu_shares: self.limits.cpu_shares,
            cpu_set: self.limits.cpu_set.clone(),
            auth_config: self.registry_auth(&def.image),
        })
    }

    fn inject_netrc(&self, environment: &mut BTreeMap<String, String>, role: StepRole) {
        if !self.netrc_enabled {
            return;
        }
        let Some(netrc) = &self.netrc else {
            return;
        };
        let allowed = match role {
            StepRole::Clone => true,
            StepRole::User => self.trusted || !self.netrc_only_trusted,
            StepRole::Service => false,
        };
        if !allowed {
            return;
        }
        environment.insert("CI_NETRC_USERNAME".to_string(), netrc.login.clone());
        environment.insert("CI_NETRC_PASSWORD".to_string(), netrc.password.clone());
        environment.insert("CI_NETRC_MACHINE".to_string(), netrc.machine.clone());
    }

    /// A secret reaches the step only when its event allow-list admits
    /// the current event, its image allow-list admits the step image,
    /// and its plugin-only flag fits the step's shape. A name missing
    /// from the store entirely fails the compilation.
    fn inject_secrets(
        &self,
        environment: &mut BTreeMap<String, String>,
        def: &StepDef,
    ) -> Result<(), CompileError> {
        for request in &def.secrets {
            let Some(secret) = self
                .secrets
                .iter()
                .find(|s| s.name.eq_ignore_ascii_case(request.source()))
            else {
                return Err(CompileError::new(
                    ErrorKind::Compile,
                    format!("secret '{}' not found", request.source()),
                )
                .with_location(format!("steps.{}", def.name)));
            };
            if !secret.matches_event(self.metadata.curr.event) {
                continue;
            }
            if !image_allowed(&secret.images, &def.image) {
                continue;
            }
            if secret.plugins_only && !def.is_plugin() {
                continue;
            }
            environment.insert(request.target().to_string(), secret.value.clone());
        }
        Ok(())
    }

    fn is_escalated(&self, image: &str) -> bool {
        let base = base_image(image);
        self.escalated.iter().any(|entry| base_image(entry) == base)
    }

    fn registry_auth(&self, image: &str) -> AuthConfig {
        for registry in &self.registries {
            if image.starts_with(&registry.hostname) {
                return AuthConfig {
                    username: registry.username.clone(),
                    password: registry.password.clone(),
                    email: registry.email.clone(),
                };
            }
        }
        AuthConfig::default()
    }

    fn workspace_dir(&self) -> String {
        let path = path_from_url(&self.metadata.repo.link);
        if path.is_empty() {
            self.workspace_base.clone()
        } else {
            format!("{}/{}", self.workspace_base.trim_end_matches('/'), path)
        }
    }
}

fn image_allowed(patterns: &[String], image: &str) -> bool {
    if patterns.is_empty() {
        return true;
    }
    let base = base_image(image);
    patterns.iter().any(|pattern| match glob::Pattern::new(pattern) {
        Ok(pattern) => pattern.matches(base),
        Err(_) => pattern == base,
    })
}

/// Image reference with the tag stripped; registry ports survive.
fn base_image(image: &str) -> &str {
    let tail_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[tail_start..].find(':') {
        Some(colon) => &image[..tail_start + colon],
        None => image,
    }
}

/// Workspace path derived from the repository URL: everything after the
/// host, e.g. `https://forge.example/octo/ship` becomes `octo/ship`.
fn path_from_url(url: &str) -> String {
    let rest = match url.find("://") {
        Some(idx) => &url[idx + 3..],
        None => url,
    };
    match rest.find('/') {
        Some(idx) => rest[idx + 1..].trim_matches('/').to_string(),
        None => String::new(),
    }
}

fn settings_value(value: &Value) -> Result<String, CompileError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => serde_json::to_value(other)
            .and_then(|v| serde_json::to_string(&v))
            .map_err(|err| {
                CompileError::new(
                    ErrorKind::Compile,
                    format!("setting cannot be serialized: {}", err),
                )
            }),
    }
}

fn slug(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
