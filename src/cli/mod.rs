pub mod show;

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use show::{process_show_command, ShowCommand};
use tracing::level_filters::LevelFilter;

use crate::{
    config::{ConfigOverrides, TrackerConfig},
    daemon::{start_daemon, storage::log_store::CsvLogStore, DaemonOptions},
    utils::{
        dir::{
            activity_dir, create_application_default_path, default_config_path, ensure_dir,
            tracing_dir,
        },
        logging::{enable_logging, CLI_PREFIX, SERVE_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Ticklet", version, long_about = None)]
#[command(about = "Keeps a per-day log of the applications and windows you focus on", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(clap::Args, Debug, Clone)]
pub struct DirArgs {
    #[arg(
        long,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

impl DirArgs {
    pub fn resolve(&self) -> Result<PathBuf> {
        match &self.dir {
            Some(dir) => ensure_dir(dir.clone()),
            None => create_application_default_path(),
        }
    }
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Track focus in the current console until Ctrl-C")]
    Serve {
        #[command(flatten)]
        dir: DirArgs,
        #[arg(long, help = "Configuration file. Defaults to config.toml in the application directory")]
        config: Option<PathBuf>,
        #[arg(long = "poll-interval", help = "Seconds between focus samples")]
        poll_interval: Option<u64>,
        #[arg(long = "finalize-on-stop", help = "Save the entry in progress when stopping")]
        finalize_on_stop: bool,
        #[arg(long = "log-console", help = "Also print logs to stdout")]
        log_console: bool,
        #[arg(long = "log-filter")]
        log_filter: Option<LevelFilter>,
    },
    #[command(about = "Print logged activity day by day")]
    Show {
        #[command(flatten)]
        command: ShowCommand,
    },
    #[command(about = "Print the directory holding activity logs")]
    Dir {
        #[command(flatten)]
        dir: DirArgs,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    match args.commands {
        Commands::Serve {
            dir,
            config,
            poll_interval,
            finalize_on_stop,
            log_console,
            log_filter,
        } => {
            let app_dir = dir.resolve()?;
            enable_logging(
                SERVE_PREFIX,
                &ensure_dir(tracing_dir(&app_dir))?,
                log_filter,
                log_console,
            )?;

            let config_path = config.unwrap_or_else(|| default_config_path(&app_dir));
            let overrides = ConfigOverrides {
                poll_interval_secs: poll_interval,
                finalize_on_stop: finalize_on_stop.then_some(true),
            };
            let config = TrackerConfig::load(Some(&config_path), &overrides)?;

            start_daemon(DaemonOptions {
                app_dir,
                config_path,
                overrides,
                config,
            })
            .await
        }
        Commands::Show { command } => {
            let app_dir = command.dir.resolve()?;
            enable_logging(CLI_PREFIX, &ensure_dir(tracing_dir(&app_dir))?, None, false)?;
            process_show_command(command, &app_dir).await
        }
        Commands::Dir { dir } => {
            println!("{}", activity_log_dir(&dir.resolve()?)?.display());
            Ok(())
        }
    }
}

/// Directory the daily logs live in, created if it doesn't exist yet.
fn activity_log_dir(app_dir: &Path) -> Result<PathBuf> {
    let store = CsvLogStore::new(activity_dir(app_dir))?;
    Ok(store.log_dir().to_path_buf())
}
