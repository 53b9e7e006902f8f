//! Command line interface for modindex.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::types::config::CONFIG_FILE_NAME;
use crate::types::models::{InstalledMod, ModVersionSelector, ModsSort};

/// modindex - browse a mod index server and check installed mods for updates.
#[derive(Parser, Debug)]
#[command(name = "modindex")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file.
    #[arg(short, long, default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Verbose mode.
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet mode.
    #[arg(short, long)]
    pub quiet: bool,

    /// Command to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Writes a default configuration file.
    Init {
        /// Target directory (default: current directory).
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Lists mods on the server.
    Mods {
        /// Free text search.
        #[arg(long)]
        query: Option<String>,

        /// Only mods with this tag (repeatable).
        #[arg(long = "tag")]
        tags: Vec<String>,

        /// Only featured mods.
        #[arg(long)]
        featured: bool,

        /// Sort order: downloads, recently_updated, recently_published.
        #[arg(long, default_value = "downloads")]
        sort: ModsSort,

        /// Page number, starting at 1.
        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Mods per page.
        #[arg(long, default_value_t = 10)]
        per_page: usize,
    },

    /// Shows metadata for one mod.
    Info {
        /// Mod ID.
        id: String,
    },

    /// Shows one release of a mod.
    Release {
        /// Mod ID.
        id: String,

        /// latest, major:N or an exact version.
        #[arg(long, default_value = "latest")]
        select: ModVersionSelector,
    },

    /// Lists the tags known to the server.
    Tags,

    /// Downloads the logo of a mod.
    Logo {
        /// Mod ID.
        id: String,

        /// Output file.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Checks installed mods for updates.
    Updates {
        /// Installed mods as id@version.
        #[arg(long = "installed", num_args = 1.., required = true)]
        installed: Vec<InstalledMod>,
    },

    /// Shows version.
    Version,
}
