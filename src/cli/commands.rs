use crate::cli::CompileArgs;
use crate::core::config::BackendSettings;
use crate::core::metadata::{ForgeInfo, PipelineInfo, Repo};
use crate::core::pipeline::{link_steps, PlanBuilder, SourceSpec, SystemRunIds};
use crate::core::types::{CancellationFlag, EventKind};
use anyhow::{anyhow, Context};
use std::collections::HashMap;
use std::fs;

/// Compile the given pipeline files and print the plan as JSON.
pub fn compile(args: CompileArgs) -> crate::Result<()> {
    let rendered = render(&args)?;
    println!("{}", rendered);
    Ok(())
}

pub(crate) fn render(args: &CompileArgs) -> crate::Result<String> {
    let settings = match &args.settings {
        Some(path) => BackendSettings::load(path)?,
        None => BackendSettings::default(),
    };

    let event: EventKind = args
        .event
        .parse()
        .map_err(|err: String| anyhow!(err))?;

    let (owner, name) = args
        .repo
        .split_once('/')
        .ok_or_else(|| anyhow!("--repo must be in owner/name form"))?;

    let mut globals = HashMap::new();
    for entry in &args.env {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| anyhow!("--env entries must be KEY=VALUE, got '{}'", entry))?;
        globals.insert(key.to_string(), value.to_string());
    }

    let mut sources = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let data = fs::read(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        sources.push(SourceSpec::new(name, data));
    }

    let builder = PlanBuilder {
        forge: ForgeInfo {
            kind: "local".to_string(),
            url: String::new(),
            platform: format!("{}/{}", std::env::consts::OS, std::env::consts::ARCH),
        },
        repo: Repo {
            owner: owner.to_string(),
            name: name.to_string(),
            link: args.repo_url.clone(),
            clone_url: args.repo_url.clone(),
            default_branch: "main".to_string(),
            private: args.private,
            trusted: args.trusted,
        },
        curr: PipelineInfo {
            number: 1,
            event,
            commit: args.commit.clone(),
            branch: args.branch.clone(),
            git_ref: format!("refs/heads/{}", args.branch),
            changed_files: args.changed.clone(),
            ..Default::default()
        },
        prev: PipelineInfo::default(),
        netrc: None,
        secrets: Vec::new(),
        registries: Vec::new(),
        link: String::new(),
        sources,
        globals,
        settings,
        ids: Box::new(SystemRunIds),
        cancel: CancellationFlag::new(),
    };

    let mut items = builder.build()?;
    link_steps(&mut items);

    tracing::debug!(items = items.len(), "compilation finished");
    serde_json::to_string_pretty(&items).context("failed to serialize plan")
}
