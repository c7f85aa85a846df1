use std::path::PathBuf;
use std::time::Duration;

/// Protocol version spoken with the vstest design-mode host
pub const PROTOCOL_VERSION: i32 = 1;

/// Default time to wait for the host to dial back, in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;

/// Default command used to build the project and launch the host
pub const DEFAULT_DOTNET_PATH: &str = "dotnet";

const DOTNET_PATH_ENV: &str = "TESTHOST_DOTNET_PATH";
const CONNECT_TIMEOUT_ENV: &str = "TESTHOST_CONNECT_TIMEOUT_MS";

/// Returns the path to the data directory for testhost-bridge.
/// Uses $XDG_DATA_HOME/testhost-bridge if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/testhost-bridge,
/// or ./testhost-bridge if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("testhost-bridge.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("testhost-bridge")
}

/// Settings for building the project and launching the test host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSettings {
    /// Executable used for `build` and `vstest`
    pub dotnet_path: PathBuf,
    /// How long to wait for the host's control connection
    pub connect_timeout: Duration,
}

impl HostSettings {
    /// Reads settings from TESTHOST_DOTNET_PATH and TESTHOST_CONNECT_TIMEOUT_MS.
    pub fn from_env() -> Self {
        settings_with_env(
            std::env::var(DOTNET_PATH_ENV).ok(),
            std::env::var(CONNECT_TIMEOUT_ENV).ok(),
        )
    }

    pub fn with_dotnet_path(mut self, dotnet_path: impl Into<PathBuf>) -> Self {
        self.dotnet_path = dotnet_path.into();
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            dotnet_path: PathBuf::from(DEFAULT_DOTNET_PATH),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }
}

fn settings_with_env(dotnet_path: Option<String>, connect_timeout_ms: Option<String>) -> HostSettings {
    let defaults = HostSettings::default();

    let dotnet_path = dotnet_path
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or(defaults.dotnet_path);

    let connect_timeout = connect_timeout_ms
        .and_then(|ms| ms.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(defaults.connect_timeout);

    HostSettings {
        dotnet_path,
        connect_timeout,
    }
}
