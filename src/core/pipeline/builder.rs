//! Plan building: orchestrates matrix expansion, substitution, parsing,
//! linting, filtering, and lowering for a set of pipeline sources, then
//! reconciles cross-workflow dependencies and sequences identifiers.

use crate::core::config::BackendSettings;
use crate::core::error::{CompileError, ErrorKind};
use crate::core::metadata::{ForgeInfo, Metadata, PipelineInfo, Repo, WorkflowInfo};
use crate::core::pipeline::backend;
use crate::core::pipeline::compiler::Compiler;
use crate::core::pipeline::ids::RunIdSource;
use crate::core::pipeline::lint::{LintContext, LintRegistry};
use crate::core::pipeline::matrix::{self, Axis};
use crate::core::pipeline::schema;
use crate::core::pipeline::source::{self, SourceSpec};
use crate::core::pipeline::substitute;
use crate::core::pipeline::when::FilterContext;
use crate::core::secret::{Netrc, Registry, Secret};
use crate::core::types::{CancellationFlag, WorkflowState};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Workflow record created during expansion. Mutated only to set the
/// skipped state and, after lowering, to receive its child steps.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRecord {
    pub pipeline_id: i64,
    pub pid: i64,
    pub name: String,
    pub state: WorkflowState,
    pub axis: Axis,
    pub children: Vec<StepRecord>,
}

/// Persisted view of one compiled step.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub name: String,
    pub uuid: String,
    pub pipeline_id: i64,
    pub pid: i64,
    pub ppid: i64,
    /// First step pid of the stage, for grouping in UIs.
    pub gid: i64,
    pub state: WorkflowState,
}

/// The per-workflow output bundle. Self-contained: an executor needs no
/// further queries to the core.
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub workflow: WorkflowRecord,
    pub config: backend::Config,
    pub labels: BTreeMap<String, String>,
    pub depends_on: Vec<String>,
    pub runs_on: Vec<String>,
    pub platform: String,
}

/// Takes the event data and the pipeline sources and produces the
/// executable plan items.
pub struct PlanBuilder {
    pub forge: ForgeInfo,
    pub repo: Repo,
    pub curr: PipelineInfo,
    pub prev: PipelineInfo,
    pub netrc: Option<Netrc>,
    pub secrets: Vec<Secret>,
    pub registries: Vec<Registry>,
    pub link: String,
    pub sources: Vec<SourceSpec>,
    pub globals: HashMap<String, String>,
    pub settings: BackendSettings,
    pub ids: Box<dyn RunIdSource>,
    pub cancel: CancellationFlag,
}

impl PlanBuilder {
    /// Compile every source into items, in source order then matrix
    /// order. Fails the whole compilation on the first error; skipped
    /// workflows are not errors.
    pub fn build(&self) -> Result<Vec<Item>, CompileError> {
        self.checkpoint()?;
        if self.sources.is_empty() {
            return Err(CompileError::new(
                ErrorKind::EmptySet,
                "no pipeline sources supplied",
            ));
        }

        let sources = source::sort_by_name(self.sources.clone());
        let lint = LintRegistry::new();
        let mut items: Vec<Item> = Vec::new();
        let mut origin: HashMap<String, String> = HashMap::new();
        let mut pid: i64 = 1;

        for spec in &sources {
            self.checkpoint()?;

            let text = String::from_utf8(spec.data.clone()).map_err(|_| {
                CompileError::new(ErrorKind::PipelineParse, "source is not valid UTF-8")
                    .with_file(&spec.name)
            })?;

            let axes = matrix::parse(&text, self.settings.max_matrix_jobs)
                .map_err(|err| err.with_file(&spec.name))?;
            let axes = if axes.is_empty() {
                vec![Axis::new()]
            } else {
                axes
            };

            let display = source::sanitize_name(&spec.name);
            match origin.get(&display) {
                Some(other) => {
                    return Err(CompileError::new(
                        ErrorKind::DuplicateWorkflowName,
                        format!(
                            "workflow '{}' is defined by both '{}' and '{}'",
                            display, other, spec.name
                        ),
                    )
                    .with_file(&spec.name));
                }
                None => {
                    origin.insert(display.clone(), spec.name.clone());
                }
            }

            for axis in axes {
                self.checkpoint()?;

                let mut workflow = WorkflowRecord {
                    pipeline_id: self.curr.id,
                    pid,
                    name: display.clone(),
                    state: WorkflowState::Pending,
                    axis: axis.clone(),
                    children: Vec::new(),
                };

                let metadata = Metadata::new(
                    self.forge.clone(),
                    self.repo.clone(),
                    self.curr.clone(),
                    self.prev.clone(),
                    WorkflowInfo {
                        name: display.clone(),
                        number: pid,
                    },
                    self.link.clone(),
                );

                let mut environ = metadata.environ();
                let reserved: HashSet<String> = environ.keys().cloned().collect();
                for (key, value) in &axis {
                    environ.insert(key.clone(), value.clone());
                }
                for (key, value) in &self.globals {
                    // Caller globals lose to metadata and matrix values.
                    if !environ.contains_key(key) {
                        environ.insert(key.clone(), value.clone());
                    }
                }

                let substituted = substitute::substitute(&text, &environ)
                    .map_err(|err| err.with_file(&spec.name))?;
                let parsed = schema::parse(&substituted)
                    .map_err(|err| err.with_file(&spec.name))?;

                lint.lint(&LintContext {
                    doc: &parsed,
                    file: &spec.name,
                    trusted: self.repo.trusted,
                })?;

                if let Some(when) = &parsed.when {
                    let ctx = FilterContext {
                        event: self.curr.event,
                        branch: &self.curr.branch,
                        git_ref: &self.curr.git_ref,
                        platform: &self.forge.platform,
                        changed_files: &self.curr.changed_files,
                        axis: &axis,
                        environ: &environ,
                    };
                    match when.matches(&ctx) {
                        Ok(true) => {}
                        Ok(false) => {
                            tracing::debug!(
                                workflow = %workflow.name,
                                "marked as skipped, does not match metadata"
                            );
                            workflow.state = WorkflowState::Skipped;
                        }
                        Err(err) => return Err(err.with_file(&spec.name)),
                    }
                }

                let compiler = self.compiler_for(metadata, axis, environ, reserved, pid);
                let config = compiler
                    .compile(&parsed)
                    .map_err(|err| err.with_file(&spec.name))?;

                if config.stages.is_empty() {
                    tracing::debug!(
                        workflow = %workflow.name,
                        "dropping workflow with empty plan"
                    );
                    continue;
                }

                items.push(Item {
                    workflow,
                    config,
                    labels: parsed.labels.0.clone(),
                    depends_on: parsed.depends_on.clone(),
                    runs_on: parsed.runs_on.clone(),
                    platform: parsed.platform.clone(),
                });
                pid += 1;
            }
        }

        self.checkpoint()?;
        let items = prune_missing_dependencies(items);

        if !items.is_empty()
            && !items
                .iter()
                .any(|item| item.workflow.state == WorkflowState::Pending)
        {
            return Err(CompileError::new(
                ErrorKind::NoStartpoint,
                "every surviving workflow is skipped",
            ));
        }

        Ok(items)
    }

    fn compiler_for(
        &self,
        metadata: Metadata,
        axis: Axis,
        environ: HashMap<String, String>,
        reserved: HashSet<String>,
        workflow_id: i64,
    ) -> Compiler {
        let prefix = format!(
            "wp_{}_{}",
            self.ids.next().to_string().to_lowercase(),
            workflow_id
        );
        Compiler {
            metadata,
            axis,
            environ,
            reserved,
            escalated: self.settings.privileged.clone(),
            limits: self.settings.limits.clone(),
            extra_volumes: self.settings.volumes.clone(),
            extra_networks: self.settings.networks.clone(),
            netrc: self.netrc.clone(),
            netrc_enabled: self.repo.private || self.settings.authenticate_public_repos,
            netrc_only_trusted: self.settings.netrc_only_trusted,
            default_clone_image: self.settings.default_clone_image.clone(),
            registries: self.registries.clone(),
            secrets: self.secrets.clone(),
            prefix,
            workspace_base: self.settings.workspace_base.clone(),
            trusted: self.repo.trusted,
        }
    }

    fn checkpoint(&self) -> Result<(), CompileError> {
        if self.cancel.is_cancelled() {
            return Err(CompileError::new(
                ErrorKind::Cancelled,
                "compilation cancelled",
            ));
        }
        Ok(())
    }
}

/// Remove items whose `depends_on` names no surviving workflow, to a
/// fixed point: a removal can invalidate other items in turn.
pub fn prune_missing_dependencies(mut items: Vec<Item>) -> Vec<Item> {
    loop {
        let names: HashSet<String> = items
            .iter()
            .map(|item| item.workflow.name.clone())
            .collect();
        let before = items.len();
        items.retain(|item| {
            let resolved = item
                .depends_on
                .iter()
                .all(|dep| names.contains(dep));
            if !resolved {
                tracing::debug!(
                    workflow = %item.workflow.name,
                    "removed workflow with unresolved dependency"
                );
            }
            resolved
        });
        if items.len() == before {
            return items;
        }
    }
}

/// Continue the pid sequence across every compiled step and attach the
/// step records to their workflows. Numbering walks stages in order and
/// steps within a stage in order; the first pid of each stage becomes
/// the stage's group id. Steps of a skipped workflow are born skipped.
pub fn link_steps(items: &mut [Item]) {
    let mut pid = items
        .iter()
        .map(|item| item.workflow.pid)
        .max()
        .unwrap_or(0);

    for item in items.iter_mut() {
        let ppid = item.workflow.pid;
        let pipeline_id = item.workflow.pipeline_id;
        let state = if item.workflow.state == WorkflowState::Skipped {
            WorkflowState::Skipped
        } else {
            WorkflowState::Pending
        };
        let mut children = Vec::new();
        for stage in &item.config.stages {
            let mut gid = 0;
            for step in &stage.steps {
                pid += 1;
                if gid == 0 {
                    gid = pid;
                }
                children.push(StepRecord {
                    name: step.alias.clone(),
                    uuid: step.uuid.clone(),
                    pipeline_id,
                    pid,
                    ppid,
                    gid,
                    state,
                });
            }
        }
        item.workflow.children = children;
    }
}
