//! Scoped ownership of the spawned test host process.
//!
//! The host is killed when its [`HostProcess`] is dropped, so every exit path
//! of the owning session (including errors and panics) tears it down.
//! [`HostProcess::shutdown`] is the orderly variant that also reaps the child
//! and drains its output relays.

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::{EventEmitter, TestEvent};
use crate::host::error::LaunchError;
use crate::protocol::payloads::TestMessageLevel;

/// Child processes of the host may inherit its pipes and keep them open
const RELAY_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

pub struct HostProcess {
    child: Child,
    relays: Vec<JoinHandle<()>>,
}

impl HostProcess {
    /// Spawns `command`, relaying stdout as informational and stderr as error
    /// diagnostics to `emitter`
    pub fn spawn(command: &mut Command, emitter: Arc<dyn EventEmitter>) -> Result<Self, LaunchError> {
        let program = command.as_std().get_program().to_string_lossy().into_owned();

        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|source| LaunchError::Spawn { program, source })?;

        let mut relays = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            relays.push(spawn_relay(
                stdout,
                TestMessageLevel::Informational,
                emitter.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            relays.push(spawn_relay(stderr, TestMessageLevel::Error, emitter));
        }

        info!(pid = ?child.id(), "Test host started");

        Ok(Self { child, relays })
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Waits for the host to exit on its own
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Kills the host if still running, reaps it and drains the output relays
    pub async fn shutdown(mut self) {
        if self.is_running() {
            debug!(pid = ?self.child.id(), "Killing test host");
            if let Err(e) = self.child.kill().await {
                warn!("Failed to kill test host: {}", e);
            }
        } else if let Ok(status) = self.child.wait().await {
            debug!(%status, "Test host already exited");
        }

        let relays = std::mem::take(&mut self.relays);
        let aborts: Vec<_> = relays.iter().map(JoinHandle::abort_handle).collect();
        if tokio::time::timeout(RELAY_DRAIN_TIMEOUT, join_all(relays))
            .await
            .is_err()
        {
            warn!("Test host output still open after shutdown, abandoning relays");
            aborts.iter().for_each(|handle| handle.abort());
        }

        info!("Test host stopped");
    }
}

impl Drop for HostProcess {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            warn!(pid = ?self.child.id(), "Test host dropped while running, killing it");
            let _ = self.child.start_kill();
        }
    }
}

fn spawn_relay<R>(reader: R, level: TestMessageLevel, emitter: Arc<dyn EventEmitter>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => emitter.emit(TestEvent::test_message(level, line)),
                Ok(None) => break,
                Err(e) => {
                    debug!("Test host output relay stopped: {}", e);
                    break;
                }
            }
        }
    })
}
