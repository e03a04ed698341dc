//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// shellcache - offline-first resource cache coordinator
#[derive(Parser, Debug)]
#[command(name = "shellcache")]
#[command(about = "Provision, prune and serve an application's offline resource stores")]
#[command(version)]
pub struct Cli {
    /// Configuration file (JSON)
    #[arg(long, global = true, env = "SHELLCACHE_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the stores
    #[arg(long, global = true, env = "SHELLCACHE_STORE_DIR", value_name = "DIR")]
    pub store_dir: Option<PathBuf>,

    /// Override the version tag from the configuration
    #[arg(long = "version-tag", global = true, env = "SHELLCACHE_VERSION", value_name = "TAG")]
    pub version_tag: Option<String>,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, global = true, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Provision the shell for the configured version, then prune other versions
    Install,

    /// Route one request through the coordinator
    Get {
        /// Absolute URL of the resource
        url: String,

        /// Treat the request as a page navigation
        #[arg(long)]
        navigate: bool,

        /// Request method
        #[arg(long, default_value = "GET")]
        method: String,

        /// Exit without waiting for background revalidation
        #[arg(long)]
        no_wait: bool,

        /// Write the response body to this file
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// List stores and their entry counts
    Stores,

    /// Print the effective configuration as JSON
    ShowConfig,

    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}
