use crate::{
    demo::DemoOptions,
    error::CliError,
    shutdown::{ExitCode, ShutdownCoordinator},
};
use clap::Parser;
use commands::Commands;
use engine_config::settings::{
    BatchSettings,
    validated::{DEFAULT_STALE_AFTER, ValidatedSettings},
};
use engine_core::{
    progress::ProgressService,
    state::{JobRepository, sled_store::SledJobRepository},
};
use engine_runtime::{launcher::JobLauncher, partition::partitioner::compute_partitions};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod demo;
mod error;
mod output;
mod shutdown;

#[derive(Parser)]
#[command(name = "tranche", version = "0.1.0", about = "Chunked, partitioned batch jobs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            users,
            fail_partition,
            state,
            json,
        } => {
            let settings = load_settings(config.as_deref())?;
            let repository = open_repository(state)?;
            let job = demo::build_job(
                &settings,
                &DemoOptions {
                    users,
                    fail_partition,
                },
            )?;

            let launcher = JobLauncher::new(repository);
            let shutdown = ShutdownCoordinator::new(launcher.clone());
            shutdown.register_handlers();

            let execution = launcher.run(&job).await;
            output::print_execution(&execution, json)?;

            let code = shutdown.exit_code(&execution);
            if code != ExitCode::Success {
                std::process::exit(code.as_i32());
            }
        }
        Commands::Progress { run, state, json } => {
            let repository = open_repository(state)?;
            let status = ProgressService::new(repository).job_status(&run).await?;
            output::print_progress(&status, json)?;
        }
        Commands::Partitions { min, max, count } => {
            let partitions = compute_partitions(min, max, count)?;
            output::print_partitions(&partitions);
        }
    }

    Ok(())
}

/// Settings from `path`, or the defaults with stale filtering enabled.
fn load_settings(path: Option<&Path>) -> Result<ValidatedSettings, CliError> {
    let settings = match path {
        Some(path) => {
            info!(path = %path.display(), "Loading settings");
            BatchSettings::from_file(path)?.validate()?
        }
        None => ValidatedSettings::builder()
            .stale_after(DEFAULT_STALE_AFTER)
            .build()?,
    };
    Ok(settings)
}

fn open_repository(path: Option<PathBuf>) -> Result<Arc<dyn JobRepository>, CliError> {
    let path = match path {
        Some(path) => path,
        None => dirs::data_dir()
            .or_else(dirs::home_dir)
            .ok_or_else(|| CliError::Unexpected("Could not determine a data directory".into()))?
            .join("tranche/state"),
    };
    let repository = SledJobRepository::open(&path).map_err(|source| CliError::Repository {
        path: path.display().to_string(),
        source,
    })?;
    Ok(Arc::new(repository))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_enable_stale_filtering() {
        let settings = load_settings(None).unwrap();
        assert_eq!(settings.stale_after(), Some(DEFAULT_STALE_AFTER));
        assert_eq!(settings.chunk_size(), 10);
    }

    #[test]
    fn settings_file_is_validated() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "chunk_size": 0 }}"#).unwrap();
        assert!(matches!(
            load_settings(Some(file.path())),
            Err(CliError::Settings(_))
        ));
    }

    #[test]
    fn repository_opens_in_a_given_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(open_repository(Some(dir.path().join("state"))).is_ok());
    }
}
