mod cli;
mod core;
mod utils;

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::{Cli, Commands, ConfigCommands};
use crate::core::{BackupManager, BackupStore, DockerEngine, ScopePolicy};
use crate::utils::{format_bytes, format_timestamp, resolve_backup_root};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Backup {
            container,
            all,
            directory,
            only_containers,
            only_volumes,
        } => {
            let scope = ScopePolicy {
                only_containers,
                only_volumes,
            };
            handle_backup(container, all, directory, scope).await?;
        }
        Commands::Restore {
            container,
            directory,
            only_containers,
            only_volumes,
        } => {
            let scope = ScopePolicy {
                only_containers,
                only_volumes,
            };
            handle_restore(container, directory, scope).await?;
        }
        Commands::List { directory } => {
            handle_list(directory)?;
        }
        Commands::Config { command } => {
            handle_config(command)?;
        }
    }

    Ok(())
}

async fn handle_backup(
    container: Option<String>,
    all: bool,
    directory: Option<PathBuf>,
    scope: ScopePolicy,
) -> Result<()> {
    let root = resolve_backup_root(directory)?;
    let store = BackupStore::new(&root);
    let engine = Arc::new(DockerEngine::new()?);
    let manager = BackupManager::new(engine, store);

    if all {
        println!("Backing up all containers to {}\n", root.display());

        let outcomes = manager.backup_all(scope).await?;
        let mut failed = 0;

        for (id, result) in &outcomes {
            match result {
                Ok(name) => println!("  ✓ {}", name),
                Err(e) => {
                    failed += 1;
                    println!("  ✗ {}: {}", id, e);
                }
            }
        }

        println!();
        if failed > 0 {
            anyhow::bail!("{} of {} backups failed", failed, outcomes.len());
        }
        println!("Backed up {} containers", outcomes.len());
    } else if let Some(container) = container {
        println!("Backing up container: {}", container);

        let name = manager.backup_container(&container, scope).await?;
        println!("✓ Backup of {} stored in {}", name, root.display());
    } else {
        println!("Error: Specify either --all or a container name");
    }

    Ok(())
}

async fn handle_restore(
    container: String,
    directory: Option<PathBuf>,
    scope: ScopePolicy,
) -> Result<()> {
    let root = resolve_backup_root(directory)?;
    let store = BackupStore::new(&root);
    let engine = Arc::new(DockerEngine::new()?);
    let manager = BackupManager::new(engine, store);

    println!("Restoring container: {}", container);

    manager.restore_container(&container, scope).await?;
    println!("✓ Container {} restored and started", container);

    Ok(())
}

fn handle_list(directory: Option<PathBuf>) -> Result<()> {
    let root = resolve_backup_root(directory)?;
    let store = BackupStore::new(&root);

    let names = store.list_metadata()?;
    if names.is_empty() {
        println!("No backups found in {}", root.display());
        return Ok(());
    }

    println!("Backups in {}\n", root.display());
    println!("{:<25} {:<20} {:<10}", "Container", "Captured", "Volumes");
    println!("{}", "-".repeat(60));

    for name in &names {
        let captured = std::fs::metadata(store.metadata_path(name))
            .and_then(|m| m.modified())
            .map(format_timestamp)
            .unwrap_or_else(|_| "unknown".to_string());

        let volumes = store
            .read_metadata(name)
            .map(|record| record.mounts.len())
            .unwrap_or(0);

        println!("{:<25} {:<20} {:<10}", name, captured, volumes);
    }

    // archives are shared across containers, report the area as a whole
    let archive_bytes: u64 = store
        .list_archives()?
        .iter()
        .filter_map(|file| std::fs::metadata(store.volumes_dir().join(file)).ok())
        .map(|m| m.len())
        .sum();

    println!();
    println!("Volume archives: {}", format_bytes(archive_bytes));

    Ok(())
}

fn handle_config(command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::View => {
            let config = utils::AppConfig::load()?;
            println!("Config file: {}", utils::AppConfig::config_path()?.display());
            match config.backup_root {
                Some(root) => println!("backup_root: {}", root),
                None => println!("backup_root: <not set> (using ~/.volback)"),
            }
        }
        ConfigCommands::SetRoot { directory } => {
            let mut config = utils::AppConfig::load()?;
            config.set_backup_root(directory.clone())?;
            println!("✓ Default backup root set to {}", directory.display());
        }
    }

    Ok(())
}
