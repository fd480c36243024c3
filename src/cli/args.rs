use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct CompileArgs {
    /// Pipeline definition files, compiled in name order
    #[arg(value_name = "FILE", required = true)]
    pub files: Vec<PathBuf>,

    /// Backend settings file (YAML)
    #[arg(long, value_name = "FILE", help_heading = "Configuration")]
    pub settings: Option<PathBuf>,

    /// Event kind the compilation runs for
    #[arg(long, default_value = "push", help_heading = "Event")]
    pub event: String,

    /// Branch the event refers to
    #[arg(long, default_value = "main", help_heading = "Event")]
    pub branch: String,

    /// Commit SHA the event refers to
    #[arg(long, default_value = "", help_heading = "Event")]
    pub commit: String,

    /// Changed file path for path filters (repeatable)
    #[arg(long = "changed", value_name = "PATH", help_heading = "Event")]
    pub changed: Vec<String>,

    /// Repository in owner/name form
    #[arg(
        long,
        value_name = "OWNER/NAME",
        default_value = "local/repo",
        help_heading = "Repository"
    )]
    pub repo: String,

    /// Repository URL used for workspace derivation
    #[arg(long, default_value = "", help_heading = "Repository")]
    pub repo_url: String,

    /// Treat the repository as trusted
    #[arg(long, help_heading = "Repository")]
    pub trusted: bool,

    /// Treat the repository as private
    #[arg(long, help_heading = "Repository")]
    pub private: bool,

    /// Global environment entry KEY=VALUE (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", help_heading = "Environment")]
    pub env: Vec<String>,
}
