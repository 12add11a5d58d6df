mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use campus_config::{AppConfig, ConfigLoader, LogFormat};
use campus_db::Dialect;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;

#[derive(Parser, Debug)]
#[command(name = "campus-migrate", version, about = "Apply and revert the campus schema")]
struct Cli {
    /// Config file (YAML or TOML). Defaults to <config dir>/campus/config.yml.
    #[arg(long, global = true, env = "CAMPUS_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite database file; overrides the config file and CAMPUS_DATABASE.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormatArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply all pending migrations as a new batch.
    Up,
    /// Revert the most recent batch.
    Down,
    /// List migrations and whether they are applied.
    Status {
        #[arg(long)]
        json: bool,
    },
    /// Print the DDL a migration would run, without touching a database.
    Ddl {
        #[arg(long, default_value = "sqlite")]
        dialect: Dialect,
        /// Print the revert statements instead.
        #[arg(long)]
        down: bool,
    },
    /// Release a migration lock left behind by a crashed run.
    Unlock,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogFormatArg {
    Text,
    Json,
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&config.logging);

    match run(cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            if let Some(hint) = commands::failure_hint(&e) {
                eprintln!("hint: {hint}");
            }
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let mut config = ConfigLoader::load_file(path)
                .with_context(|| format!("loading {}", path.display()))?;
            campus_config::loader::apply_env_overrides(&mut config, |k| std::env::var(k).ok())?;
            config
        }
        None => ConfigLoader::new(ConfigLoader::default_config_dir()).load()?,
    };

    if let Some(db) = &cli.database {
        config.database.path = db.clone();
    }
    if let Some(format) = cli.log_format {
        config.logging.format = match format {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        };
    }
    Ok(config)
}

fn run(command: Command, config: &AppConfig) -> Result<()> {
    match command {
        Command::Up => commands::up(config),
        Command::Down => commands::down(config),
        Command::Status { json } => commands::status(config, json),
        Command::Ddl { dialect, down } => commands::ddl(dialect, down),
        Command::Unlock => commands::unlock(config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_ddl_with_dialect() {
        let cli = Cli::try_parse_from(["campus-migrate", "ddl", "--dialect", "postgres", "--down"])
            .unwrap();
        match cli.command {
            Command::Ddl { dialect, down } => {
                assert_eq!(dialect, Dialect::Postgres);
                assert!(down);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "campus-migrate",
            "status",
            "--json",
            "--database",
            "/tmp/x.db",
        ])
        .unwrap();
        assert_eq!(cli.database, Some(PathBuf::from("/tmp/x.db")));
        assert!(matches!(cli.command, Command::Status { json: true }));
    }

    #[test]
    fn rejects_unknown_dialect() {
        assert!(Cli::try_parse_from(["campus-migrate", "ddl", "--dialect", "oracle"]).is_err());
    }
}
