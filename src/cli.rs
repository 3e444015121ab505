/// CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

// Build timestamp injected at compile time
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

#[derive(Parser)]
#[command(name = "volback")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Back up a container's configuration and volume contents
    Backup {
        /// Container name or id to back up
        #[arg(required_unless_present = "all")]
        container: Option<String>,

        /// Back up every container known to the Docker daemon
        #[arg(short, long, conflicts_with = "container")]
        all: bool,

        /// Backup directory (default: VOLBACK_DIR, then the configured root)
        #[arg(short, long)]
        directory: Option<PathBuf>,

        /// Capture only the container configuration, skip volume archives
        #[arg(long, conflicts_with = "only_volumes")]
        only_containers: bool,

        /// Archive only the volumes, skip the configuration file
        #[arg(long)]
        only_volumes: bool,
    },

    /// Recreate a container from a stored backup and start it
    Restore {
        /// Container name the backup was stored under
        container: String,

        /// Backup directory (default: VOLBACK_DIR, then the configured root)
        #[arg(short, long)]
        directory: Option<PathBuf>,

        /// Recreate only the container, skip volume archives
        #[arg(long, conflicts_with = "only_volumes")]
        only_containers: bool,

        /// Unpack only the volumes into an existing container
        #[arg(long)]
        only_volumes: bool,
    },

    /// List stored backups
    List {
        /// Backup directory (default: VOLBACK_DIR, then the configured root)
        #[arg(short, long)]
        directory: Option<PathBuf>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// View configuration
    View,

    /// Set the default backup root directory
    SetRoot { directory: PathBuf },
}
