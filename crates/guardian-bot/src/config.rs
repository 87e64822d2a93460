//! Application configuration.
//!
//! Loaded from a TOML file with `GUARDIAN__SECTION__KEY` environment
//! overrides. Every field has a default.

use std::path::{Path, PathBuf};

use guardian_core::parse_time_of_day;
use guardian_monitor::MonitorSettings;
use guardian_notify::{FeishuSettings, GateSettings};
use guardian_probe::ProbeSettings;
use guardian_process::{ProcessIdentity, SupervisorSettings};
use guardian_registry::CatalogPolicy;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "GUARDIAN";
/// Default configuration path.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// The supervised trading terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Terminal install directory. Also scopes process identity.
    #[serde(default)]
    pub install_dir: PathBuf,
    /// Executable file name, matched exactly.
    #[serde(default = "default_terminal_process_name")]
    pub process_name: String,
    /// Executable path relative to `install_dir`.
    #[serde(default = "default_terminal_executable")]
    pub executable: PathBuf,
    /// Server document path relative to `install_dir`.
    #[serde(default = "default_server_document")]
    pub server_document: PathBuf,
}

fn default_terminal_process_name() -> String {
    "XtMiniQmt.exe".to_string()
}

fn default_terminal_executable() -> PathBuf {
    PathBuf::from("bin.x64/XtMiniQmt.exe")
}

fn default_server_document() -> PathBuf {
    PathBuf::from("userdata_mini/users/xtquoterconfig.xml")
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            install_dir: PathBuf::new(),
            process_name: default_terminal_process_name(),
            executable: default_terminal_executable(),
            server_document: default_server_document(),
        }
    }
}

/// The companion client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Full path of the client executable. Empty disables client actions.
    #[serde(default)]
    pub executable: PathBuf,
    /// Base directory of the data folders removed on a client restart.
    #[serde(default)]
    pub data_base_path: PathBuf,
    /// Folder names under `data_base_path`.
    #[serde(default = "default_data_folders")]
    pub data_folders: Vec<String>,
}

fn default_data_folders() -> Vec<String> {
    vec!["早盘数据".to_string(), "早盘择时".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Keep only premium market-data servers.
    #[serde(default = "default_premium_only")]
    pub premium_only: bool,
    #[serde(default)]
    pub probe: ProbeSettings,
}

fn default_premium_only() -> bool {
    true
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            premium_only: default_premium_only(),
            probe: ProbeSettings::default(),
        }
    }
}

impl SelectionConfig {
    pub fn catalog_policy(&self) -> CatalogPolicy {
        CatalogPolicy {
            premium_only: self.premium_only,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub gate: GateSettings,
    #[serde(default)]
    pub feishu: FeishuSettings,
}

/// Daily jobs at fixed `HH:MM:SS` local times. Empty disables a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_terminal_restart_time")]
    pub terminal_restart_time: String,
    #[serde(default)]
    pub terminal_shutdown_time: String,
    #[serde(default = "default_client_restart_time")]
    pub client_restart_time: String,
    #[serde(default)]
    pub client_shutdown_time: String,
}

fn default_terminal_restart_time() -> String {
    "09:28:00".to_string()
}

fn default_client_restart_time() -> String {
    "09:35:00".to_string()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            terminal_restart_time: default_terminal_restart_time(),
            terminal_shutdown_time: String::new(),
            client_restart_time: default_client_restart_time(),
            client_shutdown_time: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartupConfig {
    /// Restart the terminal and then the client when the daemon starts.
    #[serde(default)]
    pub restart_on_startup: bool,
    /// Pause between the terminal and the client restart.
    #[serde(default = "default_client_delay_secs")]
    pub client_delay_secs: u64,
}

fn default_client_delay_secs() -> u64 {
    2
}

impl Default for StartupConfig {
    fn default() -> Self {
        Self {
            restart_on_startup: false,
            client_delay_secs: default_client_delay_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default)]
    pub log_filter: Option<String>,
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub supervisor: SupervisorSettings,
    #[serde(default)]
    pub monitor: MonitorSettings,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub startup: StartupConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl AppConfig {
    /// Load `path` (optional when `None` and the default file is missing)
    /// and apply environment overrides.
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_string(), true),
            None => (DEFAULT_CONFIG_PATH.to_string(), false),
        };
        if !required && !Path::new(&path).exists() {
            tracing::warn!(path = %path, "Config file not found, using defaults");
        }

        let settings = config::Config::builder()
            .add_source(config::File::from(Path::new(&path)).required(required))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a specific TOML file, without environment overrides.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the configuration as TOML.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| AppError::Config(format!("Failed to serialize config: {e}")))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        for (name, value) in [
            ("schedule.terminal_restart_time", &self.schedule.terminal_restart_time),
            ("schedule.terminal_shutdown_time", &self.schedule.terminal_shutdown_time),
            ("schedule.client_restart_time", &self.schedule.client_restart_time),
            ("schedule.client_shutdown_time", &self.schedule.client_shutdown_time),
        ] {
            parse_time_of_day(value).map_err(|e| AppError::Config(format!("{name}: {e}")))?;
        }
        self.selection.probe.validate()?;
        self.monitor.validate()?;
        if self.terminal.process_name.trim().is_empty() {
            return Err(AppError::Config(
                "terminal.process_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn document_path(&self) -> PathBuf {
        self.terminal.install_dir.join(&self.terminal.server_document)
    }

    pub fn terminal_executable(&self) -> PathBuf {
        self.terminal.install_dir.join(&self.terminal.executable)
    }

    pub fn terminal_identity(&self) -> ProcessIdentity {
        let install_dir = if self.terminal.install_dir.as_os_str().is_empty() {
            None
        } else {
            Some(self.terminal.install_dir.clone())
        };
        ProcessIdentity::new(self.terminal.process_name.clone(), install_dir)
    }

    /// `None` when no client executable is configured.
    pub fn client_identity(&self) -> Option<ProcessIdentity> {
        if self.client.executable.as_os_str().is_empty() {
            return None;
        }
        ProcessIdentity::for_executable(&self.client.executable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.terminal.process_name, "XtMiniQmt.exe");
        assert_eq!(config.schedule.terminal_restart_time, "09:28:00");
        assert_eq!(config.notification.gate.interval_secs, 300);
        assert_eq!(config.monitor.high_latency_ms, 200);
        assert_eq!(config.supervisor.graceful_timeout_secs, 10);
        assert!(config.selection.premium_only);
        assert!(config.client_identity().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_paths_from_install_dir() {
        let config = AppConfig {
            terminal: TerminalConfig {
                install_dir: PathBuf::from("/opt/qmt"),
                ..TerminalConfig::default()
            },
            ..AppConfig::default()
        };
        assert_eq!(
            config.document_path(),
            PathBuf::from("/opt/qmt/userdata_mini/users/xtquoterconfig.xml")
        );
        assert_eq!(
            config.terminal_executable(),
            PathBuf::from("/opt/qmt/bin.x64/XtMiniQmt.exe")
        );
        assert_eq!(
            config.terminal_identity().install_dir,
            Some(PathBuf::from("/opt/qmt"))
        );
    }

    #[test]
    fn test_invalid_time_rejected() {
        let mut config = AppConfig::default();
        config.schedule.client_shutdown_time = "15:61:00".to_string();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guardian.toml");
        let mut config = AppConfig::default();
        config.terminal.install_dir = PathBuf::from("/opt/qmt");
        config.notification.feishu.webhook_url = "https://example.invalid/hook".to_string();
        config.schedule.enabled = true;

        config.save(&path).unwrap();
        let loaded = AppConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.terminal.install_dir, PathBuf::from("/opt/qmt"));
        assert!(loaded.schedule.enabled);
        assert_eq!(
            loaded.notification.feishu.webhook_url,
            "https://example.invalid/hook"
        );
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guardian.toml");
        std::fs::write(
            &path,
            "[terminal]\ninstall_dir = \"/opt/qmt\"\n\n[monitor]\ninterval_secs = 30\n",
        )
        .unwrap();

        let config = AppConfig::load(path.to_str()).unwrap();
        assert_eq!(config.monitor.interval_secs, 30);
        assert_eq!(config.monitor.high_latency_ms, 200);
        assert_eq!(config.terminal.process_name, "XtMiniQmt.exe");
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        assert!(AppConfig::load(Some("/nonexistent/guardian.toml")).is_err());
    }
}
