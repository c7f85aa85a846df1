//! Command-line front end: one session per invocation, results as JSON on
//! stdout and diagnostic events as JSON lines on stderr

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::HostSettings;
use crate::events::{EventEmitter, TestEvent};
use crate::host::launcher::ProjectInfo;
use crate::log;
use crate::testing::{TestFramework, TestManager};

#[derive(Debug, Parser)]
#[command(name = "testhost-bridge")]
#[command(about = "Discover, run and debug .NET tests through a vstest design-mode host")]
#[command(version)]
pub struct Cli {
    /// dotnet executable, overrides TESTHOST_DOTNET_PATH
    #[arg(long, global = true)]
    pub dotnet: Option<PathBuf>,

    /// How long to wait for the host to connect, overrides TESTHOST_CONNECT_TIMEOUT_MS
    #[arg(long, global = true)]
    pub connect_timeout_ms: Option<u64>,

    /// Skip `dotnet build` before launching the host
    #[arg(long, global = true)]
    pub no_build: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    #[command(flatten)]
    Session(SessionCommand),
    /// List supported test frameworks
    Frameworks,
}

/// Commands that launch a test host for one project
#[derive(Debug, Subcommand)]
pub enum SessionCommand {
    /// List tests whose display name starts with a prefix
    Discover {
        #[command(flatten)]
        project: ProjectArgs,

        #[arg(long, default_value = "")]
        filter: String,
    },
    /// Run matching tests and print the verdict
    Run {
        #[command(flatten)]
        project: ProjectArgs,

        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Print the command that would run the matching tests
    StartInfo {
        #[command(flatten)]
        project: ProjectArgs,

        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Print debug start info, then follow the debugged run
    Debug {
        #[command(flatten)]
        project: ProjectArgs,

        #[command(flatten)]
        selection: SelectionArgs,
    },
}

impl SessionCommand {
    fn project(&self) -> &ProjectArgs {
        match self {
            Self::Discover { project, .. }
            | Self::Run { project, .. }
            | Self::StartInfo { project, .. }
            | Self::Debug { project, .. } => project,
        }
    }
}

#[derive(Debug, Args)]
pub struct ProjectArgs {
    /// Directory the build and the host run in
    #[arg(long, default_value = ".")]
    pub project_dir: PathBuf,

    /// Test assembly, relative to the project directory
    #[arg(long)]
    pub output: PathBuf,
}

impl ProjectArgs {
    pub fn project_info(&self) -> ProjectInfo {
        ProjectInfo::new(&self.project_dir, self.project_dir.join(&self.output))
    }
}

#[derive(Debug, Args)]
pub struct SelectionArgs {
    #[arg(long)]
    pub framework: String,

    /// Display-name prefix; empty selects every test
    #[arg(long, default_value = "")]
    pub method: String,
}

impl Cli {
    /// Environment settings with command-line overrides applied
    pub fn settings(&self) -> HostSettings {
        let mut settings = HostSettings::from_env();
        if let Some(dotnet) = &self.dotnet {
            settings = settings.with_dotnet_path(dotnet.clone());
        }
        if let Some(ms) = self.connect_timeout_ms {
            settings = settings.with_connect_timeout(Duration::from_millis(ms));
        }
        settings
    }
}

/// Writes each event as one JSON line to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLinesEmitter;

impl EventEmitter for JsonLinesEmitter {
    fn emit(&self, event: TestEvent) {
        match serde_json::to_string(&event) {
            Ok(line) => eprintln!("{}", line),
            Err(e) => warn!("Failed to serialize event: {}", e),
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let _guard = log::init()?;

    let command = match &cli.command {
        Command::Session(command) => command,
        Command::Frameworks => {
            print_json(&TestFramework::all())?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    let settings = cli.settings();
    let emitter: Arc<dyn EventEmitter> = Arc::new(JsonLinesEmitter);
    let project = command.project().project_info();
    let mut manager = TestManager::start(project, &settings, !cli.no_build, emitter)
        .await
        .context("Failed to start test session")?;

    let result = execute(&mut manager, command).await;
    manager.shutdown().await;
    result
}

async fn execute(manager: &mut TestManager, command: &SessionCommand) -> anyhow::Result<ExitCode> {
    match command {
        SessionCommand::Discover { filter, .. } => {
            let test_cases = manager
                .discover_tests(filter, &CancellationToken::new())
                .await?;
            print_json(&test_cases)?;
        }
        SessionCommand::Run { selection, .. } => {
            let verdict = manager
                .run_test(&selection.method, &selection.framework)
                .await?;
            print_json(&verdict)?;
            if !verdict.pass {
                return Ok(ExitCode::FAILURE);
            }
        }
        SessionCommand::StartInfo { selection, .. } => {
            let start_info = manager
                .get_test_start_info(&selection.method, &selection.framework)
                .await?;
            print_json(&start_info)?;
        }
        SessionCommand::Debug { selection, .. } => {
            let cancel = CancellationToken::new();
            let watcher = tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("Interrupted, cancelling debug session");
                        cancel.cancel();
                    }
                }
            });

            let result = debug(manager, selection, &cancel).await;
            watcher.abort();
            result?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

async fn debug(
    manager: &mut TestManager,
    selection: &SelectionArgs,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let start_info = manager
        .debug_get_start_info(&selection.method, &selection.framework, cancel)
        .await?;
    print_json(&start_info)?;

    manager.debug_launch(cancel).await?;
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
