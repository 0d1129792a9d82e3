use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

use crate::domain::collections::CollectionId;

/// Command-line arguments for the vellum binary.
#[derive(Debug, Parser)]
#[command(
    name = "vellum",
    version,
    about = "Provision and look up system media collections"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "VELLUM_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Invalidate the cache and provision every configured collection.
    #[command(name = "warmup")]
    WarmUp,
    /// Print the identifier of one system collection.
    Get(GetArgs),
    /// Report whether an identifier belongs to a system collection.
    Check(CheckArgs),
    /// Print every system collection key with its identifier.
    List,
    /// Apply pending database migrations.
    Migrate,
}

#[derive(Debug, Args, Clone)]
pub struct GetArgs {
    /// Dotted collection key, e.g. `news.articles`, or `root`.
    #[arg(value_name = "KEY")]
    pub key: String,
}

#[derive(Debug, Args, Clone)]
pub struct CheckArgs {
    /// Collection identifier (UUID).
    #[arg(value_name = "ID")]
    pub id: CollectionId,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL", global = true)]
    pub database_url: Option<String>,

    /// Use a process-local store and cache instead of Postgres and the cache file.
    #[arg(long = "in-memory", action = clap::ArgAction::SetTrue, global = true)]
    pub in_memory: bool,

    /// Override the cache document path.
    #[arg(
        long = "cache-path",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub cache_path: Option<PathBuf>,

    /// Override the locale used for the root collection.
    #[arg(long = "locale", value_name = "LOCALE", global = true)]
    pub locale: Option<String>,

    /// Attribute created and updated collections to this user id.
    #[arg(long = "actor", value_name = "USER_ID", global = true)]
    pub actor: Option<i64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}
