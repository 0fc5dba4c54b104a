pub mod activity;
pub mod process;
pub mod session;

use std::{env, path::PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use process::{kill_running_daemons, restart_daemon};
use tracing::level_filters::LevelFilter;

use crate::{
    cli::{
        activity::{process_activity_command, process_clear_command, ActivityCommand, ClearCommand},
        session::{process_session_command, SessionCommand},
    },
    daemon::start_daemon,
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Tracksy", version, long_about = None)]
#[command(about = "Focus-aware desktop activity tracker", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts a tracking daemon for the application")]
    Init {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(
        about = "Run the tracker directly in current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[arg(
            long,
            help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Stop a currently running daemon.")]
    Stop {},
    #[command(about = "Start, stop and inspect tracked sessions")]
    Session {
        #[command(subcommand)]
        command: SessionCommand,
    },
    #[command(about = "Display stored activity records")]
    Activity {
        #[command(flatten)]
        command: ActivityCommand,
    },
    #[command(about = "Clear stored activity records")]
    Clear {
        #[command(flatten)]
        command: ClearCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(
        CLI_PREFIX,
        &create_application_default_path()?,
        logging_level,
        args.log,
    )?;

    match args.commands {
        Commands::Init { .. } => {
            restart_daemon()?;
            Ok(())
        }
        Commands::Stop {} => {
            let process_name = env::current_exe().expect("Can't operate without an executable");
            kill_running_daemons(&process_name);
            Ok(())
        }
        Commands::Serve { dir } => {
            start_daemon(dir.map_or_else(create_application_default_path, Ok)?).await?;
            Ok(())
        }
        Commands::Session { command } => process_session_command(command).await,
        Commands::Activity { command } => process_activity_command(command).await,
        Commands::Clear { command } => process_clear_command(command).await,
    }
}
