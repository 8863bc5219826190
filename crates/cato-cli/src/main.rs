use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

/// Cato serverless function host.
///
/// Publishes project scripts (`server.py`) that run per request inside a
/// sandboxed interpreter with a per-project key-value store.
///
/// EXAMPLES:
///     cato serve                          Serve invocations over HTTP
///     cato run server.py --payload '{}'   Run a script locally
///     cato check server.py                Compile without running
///     cato project create demo --script server.py
///     cato invoke <public-id> --payload '{"action": "hello"}'
///     cato kv list <public-id>
///
/// ENVIRONMENT VARIABLES:
///     CATO_CONFIG       Path to cato.toml
///     CATO_DATABASE     SQLite database file
///     CATO_BIND         Listen address for `cato serve`
///     RUST_LOG          Log filter (default: info)
#[derive(Parser)]
#[command(name = "cato")]
#[command(version)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file (default: cato.toml found from the working directory)
    #[arg(long, global = true, env = "CATO_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file, overriding the configuration
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve function invocations over HTTP
    ///
    /// EXAMPLES:
    ///     cato serve
    ///     cato serve --bind 0.0.0.0:8080
    Serve {
        /// Listen address, overriding the configuration
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run a script once against an in-memory store
    ///
    /// Prints `{"result": ..., "logs": ...}` on success.
    ///
    /// EXAMPLES:
    ///     cato run server.py
    ///     cato run server.py --payload '{"action": "hello"}'
    #[command(visible_alias = "r")]
    Run {
        /// Path to the script
        file: PathBuf,
        /// JSON object passed as `request`
        #[arg(long, short = 'p')]
        payload: Option<String>,
    },

    /// Compile a script without running it
    #[command(visible_alias = "c")]
    Check {
        /// Path to the script
        file: PathBuf,
    },

    /// Invoke a deployed project's function
    Invoke {
        /// Public id of the project
        public_id: String,
        /// JSON object passed as `request`
        #[arg(long, short = 'p')]
        payload: Option<String>,
    },

    /// Manage projects
    #[command(subcommand)]
    Project(ProjectCommand),

    /// Inspect and edit a project's key-value store
    #[command(subcommand)]
    Kv(KvCommand),
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// Create a project and print its public id
    Create {
        name: String,
        /// Deploy this file as the project's script
        #[arg(long)]
        script: Option<PathBuf>,
    },
    /// Upload a script to an existing project
    Deploy { public_id: String, file: PathBuf },
    /// Delete a project with its files and key-value entries
    Delete { public_id: String },
    /// List projects
    #[command(visible_alias = "ls")]
    List,
}

#[derive(Subcommand)]
enum KvCommand {
    /// Print every entry
    #[command(visible_alias = "ls")]
    List { public_id: String },
    /// Print one value
    Get { public_id: String, key: String },
    /// Insert or overwrite an entry
    Set {
        public_id: String,
        key: String,
        value: String,
    },
    /// Remove an entry
    #[command(visible_alias = "rm")]
    Delete { public_id: String, key: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let overrides = config::Overrides {
        database: cli.database,
        bind: match &cli.command {
            Commands::Serve { bind } => bind.clone(),
            _ => None,
        },
    };
    let settings = config::load(cli.config.as_deref(), overrides)?;

    match cli.command {
        Commands::Serve { .. } => commands::serve::run(&settings)?,
        Commands::Run { file, payload } => {
            commands::run::run(&file, payload.as_deref(), &settings)?;
        }
        Commands::Check { file } => commands::check::run(&file)?,
        Commands::Invoke { public_id, payload } => {
            commands::invoke::run(&public_id, payload.as_deref(), &settings)?;
        }
        Commands::Project(command) => match command {
            ProjectCommand::Create { name, script } => {
                commands::project::create(&name, script.as_deref(), &settings)?;
            }
            ProjectCommand::Deploy { public_id, file } => {
                commands::project::deploy(&public_id, &file, &settings)?;
            }
            ProjectCommand::Delete { public_id } => {
                commands::project::delete(&public_id, &settings)?;
            }
            ProjectCommand::List => commands::project::list(&settings)?,
        },
        Commands::Kv(command) => match command {
            KvCommand::List { public_id } => commands::kv::list(&public_id, &settings)?,
            KvCommand::Get { public_id, key } => commands::kv::get(&public_id, &key, &settings)?,
            KvCommand::Set {
                public_id,
                key,
                value,
            } => commands::kv::set(&public_id, &key, &value, &settings)?,
            KvCommand::Delete { public_id, key } => {
                commands::kv::delete(&public_id, &key, &settings)?;
            }
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_database_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["cato", "kv", "list", "abc", "--database", "x.db"]).unwrap();
        assert_eq!(cli.database, Some(PathBuf::from("x.db")));
        assert!(matches!(cli.command, Commands::Kv(KvCommand::List { .. })));
    }
}
