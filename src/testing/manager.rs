//! One test session: a connected host bound to a single project.
//!
//! Every operation takes `&mut self`, so commands and receives on the channel
//! never overlap. Dropping a manager closes the socket and kills the host;
//! [`TestManager::shutdown`] is the orderly path.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::HostSettings;
use crate::events::EventEmitter;
use crate::host::launcher::{HostLauncher, ProjectInfo};
use crate::host::process::HostProcess;
use crate::protocol::channel::MessageChannel;
use crate::protocol::message::MessageType;
use crate::protocol::payloads::{TestCase, TestProcessStartInfo};
use crate::testing::error::TestError;
use crate::testing::framework::TestFramework;
use crate::testing::types::{RunVerdict, TestStartInfo};
use crate::testing::debug as debug_session;
use crate::testing::{discovery, handshake, run};

pub struct TestManager<S = TcpStream> {
    project: ProjectInfo,
    channel: MessageChannel<S>,
    host: Option<HostProcess>,
    emitter: Arc<dyn EventEmitter>,
}

impl TestManager<TcpStream> {
    /// Builds the project if asked, launches the host and negotiates the
    /// protocol over its connection
    pub async fn start(
        project: ProjectInfo,
        settings: &HostSettings,
        build_first: bool,
        emitter: Arc<dyn EventEmitter>,
    ) -> Result<Self, TestError> {
        let launcher = HostLauncher::new(settings.clone(), emitter.clone());
        let launched = launcher.launch(&project, build_first).await?;
        let (host, stream) = launched.accept().await?;

        Self::connect(project, MessageChannel::new(stream), Some(host), emitter).await
    }
}

impl<S> TestManager<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an established channel; the handshake runs before anything else.
    ///
    /// `host` is owned by the session from here on and is torn down if the
    /// handshake fails.
    pub async fn connect(
        project: ProjectInfo,
        mut channel: MessageChannel<S>,
        host: Option<HostProcess>,
        emitter: Arc<dyn EventEmitter>,
    ) -> Result<Self, TestError> {
        if let Err(e) = handshake::negotiate_version(&mut channel).await {
            if let Some(host) = host {
                host.shutdown().await;
            }
            return Err(e);
        }

        info!(output_path = ?project.output_path, "Test session ready");
        Ok(Self {
            project,
            channel,
            host,
            emitter,
        })
    }

    pub fn project(&self) -> &ProjectInfo {
        &self.project
    }

    /// Discovers tests in the project's output whose display name starts
    /// with `method_name`
    pub async fn discover_tests(
        &mut self,
        method_name: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<TestCase>, TestError> {
        let sources = vec![self.project.output_path.display().to_string()];
        let test_cases =
            discovery::discover_tests(&mut self.channel, &sources, method_name, cancel).await?;
        Ok(test_cases)
    }

    /// Runs every test matching `method_name`
    pub async fn run_test(
        &mut self,
        method_name: &str,
        framework: &str,
    ) -> Result<RunVerdict, TestError> {
        let framework = TestFramework::resolve(framework)?;
        debug!(framework = framework.display_name, method_name, "Running tests");

        let test_cases = self
            .discover_tests(method_name, &CancellationToken::new())
            .await?;
        if test_cases.is_empty() {
            info!(method_name, "No tests matched, nothing to run");
            return Ok(RunVerdict::empty());
        }

        let verdict =
            run::run_selected(&mut self.channel, &test_cases, self.emitter.as_ref()).await?;
        Ok(verdict)
    }

    /// Start info for the matching tests, without the environment block
    pub async fn get_test_start_info(
        &mut self,
        method_name: &str,
        framework: &str,
    ) -> Result<TestStartInfo, TestError> {
        let start_info = self
            .start_info(method_name, framework, &CancellationToken::new())
            .await?;
        Ok(TestStartInfo::without_environment(start_info))
    }

    /// Start info for launching the matching tests under a debugger
    pub async fn debug_get_start_info(
        &mut self,
        method_name: &str,
        framework: &str,
        cancel: &CancellationToken,
    ) -> Result<TestStartInfo, TestError> {
        let start_info = self.start_info(method_name, framework, cancel).await?;
        Ok(TestStartInfo::from(start_info))
    }

    /// Reports the debugger-launched host to the test host and relays its
    /// diagnostics until the run completes or `cancel` fires
    pub async fn debug_launch(&mut self, cancel: &CancellationToken) -> Result<(), TestError> {
        debug_session::debug_launch(
            &mut self.channel,
            std::process::id(),
            self.emitter.as_ref(),
            cancel,
        )
        .await?;
        Ok(())
    }

    /// Ends the session: best-effort `SessionEnd`, then closes the channel
    /// and stops the host
    pub async fn shutdown(mut self) {
        if let Err(e) = self
            .channel
            .send(MessageType::SessionEnd, serde_json::Value::Null)
            .await
        {
            debug!("Could not send session end: {}", e);
        }
        if let Err(e) = self.channel.close().await {
            debug!("Could not close channel: {}", e);
        }

        if let Some(host) = self.host.take() {
            host.shutdown().await;
        }
        info!("Test session closed");
    }

    async fn start_info(
        &mut self,
        method_name: &str,
        framework: &str,
        cancel: &CancellationToken,
    ) -> Result<TestProcessStartInfo, TestError> {
        TestFramework::resolve(framework)?;

        let test_cases = self.discover_tests(method_name, cancel).await?;
        if cancel.is_cancelled() {
            return Err(TestError::Cancelled);
        }
        if test_cases.is_empty() {
            warn!(method_name, "No tests matched, requesting start info anyway");
        }

        debug_session::request_start_info(&mut self.channel, &test_cases, self.emitter.as_ref(), cancel)
            .await
    }
}
