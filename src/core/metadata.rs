//! Metadata binding: folds forge, repository, pipeline, and workflow
//! descriptors into the environment map used for variable substitution
//! and when-filter evaluation.

use crate::core::types::EventKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity of the forge and the server the compilation runs under.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgeInfo {
    pub kind: String,
    pub url: String,
    /// Host platform advertised to `when.platform` constraints, in
    /// `os/arch` form.
    pub platform: String,
}

/// Repository metadata supplied by the forge collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Repo {
    pub owner: String,
    pub name: String,
    pub link: String,
    pub clone_url: String,
    pub default_branch: String,
    pub private: bool,
    pub trusted: bool,
}

impl Repo {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Descriptor of a pipeline run (current or previous).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineInfo {
    pub id: i64,
    pub number: i64,
    pub event: EventKind,
    pub commit: String,
    pub branch: String,
    pub git_ref: String,
    pub message: String,
    pub author: String,
    pub changed_files: Vec<String>,
    pub created: Option<DateTime<Utc>>,
}

/// The workflow record under construction, as seen by the binder.
#[derive(Debug, Clone, Default)]
pub struct WorkflowInfo {
    pub name: String,
    pub number: i64,
}

/// Immutable environment bound for one workflow compilation.
#[derive(Debug, Clone)]
pub struct Metadata {
    pub forge: ForgeInfo,
    pub repo: Repo,
    pub curr: PipelineInfo,
    pub prev: PipelineInfo,
    pub workflow: WorkflowInfo,
    pub link: String,
}

impl Metadata {
    pub fn new(
        forge: ForgeInfo,
        repo: Repo,
        curr: PipelineInfo,
        prev: PipelineInfo,
        workflow: WorkflowInfo,
        link: String,
    ) -> Self {
        Self {
            forge,
            repo,
            curr,
            prev,
            workflow,
            link,
        }
    }

    /// Render the metadata as `CI_*` environment variables.
    ///
    /// These names are reserved: later sources (matrix axes, caller
    /// globals, per-step environment) never overwrite them.
    pub fn environ(&self) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("CI".to_string(), "pipewright".to_string());
        env.insert("CI_FORGE_TYPE".to_string(), self.forge.kind.clone());
        env.insert("CI_FORGE_URL".to_string(), self.forge.url.clone());
        env.insert("CI_SYSTEM_PLATFORM".to_string(), self.forge.platform.clone());

        env.insert("CI_REPO".to_string(), self.repo.full_name());
        env.insert("CI_REPO_OWNER".to_string(), self.repo.owner.clone());
        env.insert("CI_REPO_NAME".to_string(), self.repo.name.clone());
        env.insert("CI_REPO_URL".to_string(), self.repo.link.clone());
        env.insert("CI_REPO_CLONE_URL".to_string(), self.repo.clone_url.clone());
        env.insert(
            "CI_REPO_DEFAULT_BRANCH".to_string(),
            self.repo.default_branch.clone(),
        );
        env.insert("CI_REPO_PRIVATE".to_string(), self.repo.private.to_string());

        env.insert("CI_PIPELINE_NUMBER".to_string(), self.curr.number.to_string());
        env.insert("CI_PIPELINE_EVENT".to_string(), self.curr.event.to_string());
        env.insert("CI_PIPELINE_URL".to_string(), self.link.clone());
        env.insert(
            "CI_PIPELINE_CREATED".to_string(),
            self.curr
                .created
                .map(|t| t.timestamp().to_string())
                .unwrap_or_default(),
        );

        env.insert("CI_COMMIT_SHA".to_string(), self.curr.commit.clone());
        env.insert("CI_COMMIT_BRANCH".to_string(), self.curr.branch.clone());
        env.insert("CI_COMMIT_REF".to_string(), self.curr.git_ref.clone());
        env.insert("CI_COMMIT_MESSAGE".to_string(), self.curr.message.clone());
        env.insert("CI_COMMIT_AUTHOR".to_string(), self.curr.author.clone());

        env.insert("CI_WORKFLOW_NAME".to_string(), self.workflow.name.clone());
        env.insert(
            "CI_WORKFLOW_NUMBER".to_string(),
            self.workflow.number.to_string(),
        );

        env.insert(
            "CI_PREV_PIPELINE_NUMBER".to_string(),
            self.prev.number.to_string(),
        );
        env.insert(
            "CI_PREV_PIPELINE_EVENT".to_string(),
            self.prev.event.to_string(),
        );
        env.insert("CI_PREV_COMMIT_SHA".to_string(), self.prev.commit.clone());
        env.insert("CI_PREV_COMMIT_BRANCH".to_string(), self.prev.branch.clone());

        env
    }
}
