//! Shared fixtures: a terminal install directory on disk plus fake seams.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use guardian_bot::config::{AppConfig, ClientConfig, TerminalConfig};
use guardian_bot::Application;
use guardian_core::ProbeOutcome;
use guardian_monitor::RecordingStatusSink;
use guardian_notify::{GateSettings, RecordingSink};
use guardian_probe::{BoxFuture, MockProber, Prober};
use guardian_process::FakeProcessTable;
use tempfile::TempDir;

pub const DOCUMENT: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\r\n\
<Config>\r\n\
  <QuoterServers current_stock=\"行情_VIP_10.0.0.1_55300\" current_trade_stock=\"交易_10.0.0.9_55310\">\r\n\
    <QuoterServer quotertype=\"0\" address=\"10.0.0.1\" port=\"55300\" servername=\"VIP-A\"/>\r\n\
    <QuoterServer quotertype=\"0\" address=\"10.0.0.2\" port=\"55301\" servername=\"VIP-B\"/>\r\n\
    <QuoterServer quotertype=\"0\" address=\"10.0.0.3\" port=\"55302\" servername=\"plain-C\"/>\r\n\
    <QuoterServer quotertype=\"1\" address=\"10.0.0.9\" port=\"55310\" servername=\"trade-1\"/>\r\n\
    <QuoterServer quotertype=\"1\" address=\"10.0.0.8\" port=\"55311\" servername=\"trade-2\"/>\r\n\
  </QuoterServers>\r\n\
</Config>\r\n";

pub const CLIENT_FOLDERS: [&str; 2] = ["早盘数据", "早盘择时"];

/// A terminal install tree in a temp directory.
pub struct Fixture {
    pub dir: TempDir,
    pub config: AppConfig,
    pub table: Arc<FakeProcessTable>,
    pub prober: Arc<MockProber>,
    pub sink: Arc<RecordingSink>,
    pub status: Arc<RecordingStatusSink>,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();

        let mut config = AppConfig {
            terminal: TerminalConfig {
                install_dir: root.join("qmt"),
                ..TerminalConfig::default()
            },
            client: ClientConfig {
                executable: root.join("client").join("strategy.exe"),
                data_base_path: root.join("data"),
                data_folders: CLIENT_FOLDERS.iter().map(|s| s.to_string()).collect(),
            },
            ..AppConfig::default()
        };
        config.notification.gate = GateSettings {
            enabled: true,
            interval_secs: 300,
            window_start: "00:00:00".to_string(),
            window_end: "23:59:59".to_string(),
        };
        config.startup.client_delay_secs = 1;

        touch(&config.terminal_executable());
        touch(&config.client.executable);
        write(&config.document_path(), DOCUMENT);

        let prober = MockProber::new()
            .with_latency_ms("10.0.0.1", 30)
            .with_latency_ms("10.0.0.2", 15)
            .with_latency_ms("10.0.0.3", 5)
            .with_latency_ms("10.0.0.9", 40)
            .with_latency_ms("10.0.0.8", 20);

        Self {
            dir,
            config,
            table: Arc::new(FakeProcessTable::new()),
            prober: Arc::new(prober),
            sink: Arc::new(RecordingSink::new()),
            status: Arc::new(RecordingStatusSink::new()),
        }
    }

    pub fn app(&self) -> Application {
        self.app_with_prober(self.prober.clone())
    }

    pub fn app_with_prober(&self, prober: Arc<dyn Prober>) -> Application {
        Application::with_seams(
            self.config.clone(),
            self.table.clone(),
            prober,
            self.sink.clone(),
            self.status.clone(),
        )
        .unwrap()
    }

    pub fn document(&self) -> String {
        std::fs::read_to_string(self.config.document_path()).unwrap()
    }

    pub fn terminal_exe(&self) -> PathBuf {
        self.config.terminal_executable()
    }

    pub fn client_exe(&self) -> PathBuf {
        self.config.client.executable.clone()
    }

    pub fn data_folder(&self, name: &str) -> PathBuf {
        self.config.client.data_base_path.join(name)
    }
}

/// Every sample is reachable, but only after `delay`.
pub struct SlowProber {
    delay: Duration,
    calls: AtomicUsize,
}

impl SlowProber {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Prober for SlowProber {
    fn sample<'a>(
        &'a self,
        _address: &'a str,
        _port: u16,
        _timeout: Duration,
    ) -> BoxFuture<'a, ProbeOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay;
        Box::pin(async move {
            tokio::time::sleep(delay).await;
            ProbeOutcome::Reachable(Duration::from_millis(10))
        })
    }
}

pub fn touch(path: &Path) {
    write(path, "");
}

pub fn write(path: &Path, content: &str) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, content).unwrap();
}
