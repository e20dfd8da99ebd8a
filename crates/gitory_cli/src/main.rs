//! Operator CLI over the repository manager.
//!
//! # Responsibility
//! - Expose lifecycle operations for maintenance and scripting.
//! - Report `reconcile` findings with a non-zero exit code for monitoring.

use clap::{Parser, Subcommand};
use gitory_core::{
    init_logging, open_manager, CoreConfig, LocalRepositoryManager, Repository,
};
use log::error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "gitory", version, about = "Manage hosted git repositories")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long, env = "GITORY_CONFIG", default_value = "gitory.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List repository records.
    List,
    /// Show one repository record.
    Show { identifier: String },
    /// Register and provision a new repository.
    Create {
        identifier: String,
        name: String,
        #[arg(short, long)]
        description: Option<String>,
    },
    /// Change the display name of a repository.
    Rename { identifier: String, name: String },
    /// Remove a repository and its record.
    Delete { identifier: String },
    /// Show branches, tags and HEAD of a repository.
    Inspect { identifier: String },
    /// Report metadata/physical mismatches.
    Reconcile,
    /// Print the core version.
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Command::Version = cli.command {
        println!("gitory_core version={}", gitory_core::core_version());
        return ExitCode::SUCCESS;
    }

    let config = match CoreConfig::load(&cli.config) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    };
    if let Some(log_dir) = config.log_dir.as_deref() {
        if let Err(err) = init_logging(config.log_level(), log_dir) {
            eprintln!("warning: {err}");
        }
    }

    let manager = match open_manager(&config) {
        Ok(manager) => manager,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    };

    match run(&manager, cli.command) {
        Ok(code) => code,
        Err(err) => {
            error!("event=cli_command module=cli status=error error={err}");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(
    manager: &LocalRepositoryManager,
    command: Command,
) -> Result<ExitCode, gitory_core::ManagerError> {
    match command {
        Command::List => {
            for repo in manager.find_all()? {
                println!("{}\t{}", repo.identifier, repo.name);
            }
        }
        Command::Show { identifier } => print_record(&manager.find_by_identifier(&identifier)?),
        Command::Create {
            identifier,
            name,
            description,
        } => {
            let mut repo = Repository::new(&identifier, name)?;
            repo.description = description;
            print_record(&manager.save(&repo)?);
        }
        Command::Rename { identifier, name } => {
            let mut repo = manager.find_by_identifier(&identifier)?;
            repo.name = name;
            print_record(&manager.save(&repo)?);
        }
        Command::Delete { identifier } => {
            manager.delete(&identifier)?;
            println!("deleted {identifier}");
        }
        Command::Inspect { identifier } => {
            let info = manager.inspect(&identifier)?;
            println!("branches\t{}", info.branches.join(","));
            println!("tags\t{}", info.tags.join(","));
            println!(
                "head\t{}",
                info.head_commit.as_deref().unwrap_or("(unborn)")
            );
            println!("size_bytes\t{}", info.size_bytes);
        }
        Command::Reconcile => {
            let reports = manager.reconcile()?;
            for report in &reports {
                println!("{:?}\t{}", report.kind, report.identifier);
            }
            if !reports.is_empty() {
                return Ok(ExitCode::from(3));
            }
        }
        Command::Version => println!("gitory_core version={}", gitory_core::core_version()),
    }
    Ok(ExitCode::SUCCESS)
}

fn print_record(repo: &Repository) {
    println!("identifier\t{}", repo.identifier);
    println!("name\t{}", repo.name);
    println!(
        "description\t{}",
        repo.description.as_deref().unwrap_or_default()
    );
    if let Some(path) = &repo.path {
        println!("path\t{}", path.display());
    }
    if let (Some(created_at), Some(updated_at)) = (repo.created_at, repo.updated_at) {
        println!("created_at\t{created_at}");
        println!("updated_at\t{updated_at}");
    }
}
