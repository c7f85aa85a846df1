//! Builds the project and starts the vstest design-mode host

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::HostSettings;
use crate::events::EventEmitter;
use crate::host::error::LaunchError;
use crate::host::process::HostProcess;

/// Project a session is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectInfo {
    /// Directory the build and the host run in
    pub working_directory: PathBuf,
    /// Test assembly produced by the build
    pub output_path: PathBuf,
}

impl ProjectInfo {
    pub fn new(working_directory: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            working_directory: working_directory.into(),
            output_path: output_path.into(),
        }
    }
}

/// Startup arguments for the design-mode host
pub fn host_arguments(port: u16, parent_process_id: u32) -> Vec<String> {
    vec![
        "vstest".to_string(),
        format!("--Port:{}", port),
        format!("--ParentProcessId:{}", parent_process_id),
    ]
}

pub struct HostLauncher {
    settings: HostSettings,
    emitter: Arc<dyn EventEmitter>,
}

impl HostLauncher {
    pub fn new(settings: HostSettings, emitter: Arc<dyn EventEmitter>) -> Self {
        Self { settings, emitter }
    }

    /// Optionally builds the project, then starts the host on a free port.
    ///
    /// The host dials back to the returned listener; see [`LaunchedHost::accept`].
    pub async fn launch(
        &self,
        project: &ProjectInfo,
        build_first: bool,
    ) -> Result<LaunchedHost, LaunchError> {
        if build_first {
            self.build(project).await?;
        }

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
            .await
            .map_err(LaunchError::Bind)?;
        let port = listener.local_addr().map_err(LaunchError::Bind)?.port();

        let mut command = Command::new(&self.settings.dotnet_path);
        command
            .args(host_arguments(port, std::process::id()))
            .current_dir(&project.working_directory);

        info!(
            port,
            working_directory = ?project.working_directory,
            "Launching test host"
        );
        let process = HostProcess::spawn(&mut command, self.emitter.clone())?;

        Ok(LaunchedHost {
            process,
            listener,
            port,
            connect_timeout: self.settings.connect_timeout,
        })
    }

    /// Runs the build and checks that the test assembly exists afterwards.
    /// The exit status is only logged; the artifact decides.
    async fn build(&self, project: &ProjectInfo) -> Result<(), LaunchError> {
        info!(working_directory = ?project.working_directory, "Building project");

        let output = Command::new(&self.settings.dotnet_path)
            .arg("build")
            .current_dir(&project.working_directory)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| LaunchError::Spawn {
                program: self.settings.dotnet_path.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            warn!(status = %output.status, "Build exited unsuccessfully");
        }
        debug!("Build output: {}", String::from_utf8_lossy(&output.stdout));

        let built = tokio::fs::try_exists(&project.output_path)
            .await
            .unwrap_or(false);
        if !built {
            return Err(LaunchError::BuildFailed(project.output_path.clone()));
        }

        Ok(())
    }
}

/// A started host that has not connected yet
pub struct LaunchedHost {
    process: HostProcess,
    listener: TcpListener,
    port: u16,
    connect_timeout: Duration,
}

impl LaunchedHost {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Waits for the host's single control connection.
    ///
    /// Fails if the host exits first or does not connect in time; the host is
    /// killed on either failure.
    pub async fn accept(self) -> Result<(HostProcess, TcpStream), LaunchError> {
        let LaunchedHost {
            mut process,
            listener,
            port,
            connect_timeout,
        } = self;

        let accepted = tokio::select! {
            accepted = tokio::time::timeout(connect_timeout, listener.accept()) => accepted,
            status = process.wait() => {
                let reason = match status {
                    Ok(status) => status.to_string(),
                    Err(e) => e.to_string(),
                };
                return Err(LaunchError::HostExited(reason));
            }
        };

        let (stream, peer) = accepted
            .map_err(|_| LaunchError::ConnectTimeout(connect_timeout))?
            .map_err(LaunchError::Accept)?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Failed to set TCP_NODELAY: {}", e);
        }
        info!(port, %peer, "Test host connected");

        Ok((process, stream))
    }
}
