//! OS process table access.

use std::collections::{BTreeMap, HashSet};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use guardian_core::{ProcessRecord, ProcessState};
use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System, UpdateKind};
use tracing::{debug, warn};

/// Result of delivering a signal to one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalResult {
    Sent,
    /// The process no longer exists.
    NotFound,
    AccessDenied,
    Failed(String),
}

/// Process table seam.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessTable: Send + Sync {
    /// Fresh snapshot of every process whose executable name equals `name`.
    fn list(&self, name: &str) -> Vec<ProcessRecord>;

    /// Current state of `pid`.
    fn state(&self, pid: u32) -> ProcessState;

    /// Ask `pid` to exit.
    fn terminate(&self, pid: u32) -> SignalResult;

    /// Kill `pid` unconditionally.
    fn kill(&self, pid: u32) -> SignalResult;

    /// Launch `exe` detached, returning the launcher pid.
    fn spawn(&self, exe: &Path) -> std::io::Result<u32>;
}

/// Process table backed by `sysinfo`.
pub struct SystemProcessTable {
    system: Mutex<System>,
}

impl Default for SystemProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemProcessTable {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn refresh(system: &mut System) {
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            ProcessRefreshKind::new()
                .with_memory()
                .with_exe(UpdateKind::OnlyIfNotSet),
        );
    }

    fn to_record(pid: Pid, process: &sysinfo::Process) -> ProcessRecord {
        let name: &OsStr = process.name().as_ref();
        let status = if process.status() == ProcessStatus::Zombie {
            ProcessState::Zombie
        } else {
            ProcessState::Running
        };
        ProcessRecord {
            pid: pid.as_u32(),
            name: name.to_string_lossy().into_owned(),
            exe_path: process.exe().map(Path::to_path_buf),
            status,
            start_time: DateTime::<Utc>::from_timestamp(process.start_time() as i64, 0),
            resident_memory: process.memory(),
        }
    }

    fn signal(&self, pid: u32, graceful: bool) -> SignalResult {
        let mut system = self.system.lock();
        let pid = Pid::from_u32(pid);
        system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), ProcessRefreshKind::new());
        let Some(process) = system.process(pid) else {
            return SignalResult::NotFound;
        };
        let delivered = if graceful {
            // Platforms without SIGTERM fall back to a plain kill.
            process.kill_with(Signal::Term).unwrap_or_else(|| process.kill())
        } else {
            process.kill()
        };
        if delivered {
            SignalResult::Sent
        } else {
            SignalResult::Failed("signal rejected by the OS".to_string())
        }
    }
}

impl ProcessTable for SystemProcessTable {
    fn list(&self, name: &str) -> Vec<ProcessRecord> {
        let mut system = self.system.lock();
        Self::refresh(&mut system);
        let mut records: Vec<ProcessRecord> = system
            .processes()
            .iter()
            .filter(|(_, p)| {
                let process_name: &OsStr = p.name().as_ref();
                process_name == OsStr::new(name)
            })
            .map(|(pid, p)| Self::to_record(*pid, p))
            .collect();
        records.sort_by_key(|r| r.pid);
        records
    }

    fn state(&self, pid: u32) -> ProcessState {
        let mut system = self.system.lock();
        let pid = Pid::from_u32(pid);
        system.refresh_processes_specifics(ProcessesToUpdate::Some(&[pid]), ProcessRefreshKind::new());
        match system.process(pid) {
            Some(p) if p.status() == ProcessStatus::Zombie => ProcessState::Zombie,
            Some(_) => ProcessState::Running,
            None => ProcessState::NotFound,
        }
    }

    fn terminate(&self, pid: u32) -> SignalResult {
        self.signal(pid, true)
    }

    fn kill(&self, pid: u32) -> SignalResult {
        self.signal(pid, false)
    }

    fn spawn(&self, exe: &Path) -> std::io::Result<u32> {
        let mut command = Command::new(exe);
        if let Some(dir) = exe.parent().filter(|d| !d.as_os_str().is_empty()) {
            command.current_dir(dir);
        }
        let mut child = command.spawn()?;
        let pid = child.id();
        debug!(exe = %exe.display(), pid, "Spawned process");

        // Reap the child once it exits so it never lingers as a zombie.
        let reaper = std::thread::Builder::new()
            .name(format!("reap-{pid}"))
            .spawn(move || match child.wait() {
                Ok(status) => debug!(pid, %status, "Spawned process exited"),
                Err(e) => warn!(pid, error = %e, "Failed to wait on spawned process"),
            });
        if let Err(e) = reaper {
            warn!(pid, error = %e, "Failed to start reaper thread");
        }
        Ok(pid)
    }
}

/// How a fake process reacts to signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillBehavior {
    /// Exits on the first signal.
    Exit,
    /// Ignores graceful requests, exits on kill.
    IgnoreGraceful,
    /// Survives everything.
    Unkillable,
    /// Every signal is refused.
    AccessDenied,
    /// The graceful signal cannot be delivered, kill works.
    RejectGraceful,
}

#[derive(Debug, Clone)]
struct FakeProcess {
    record: ProcessRecord,
    behavior: KillBehavior,
}

/// In-memory process table for tests.
#[derive(Debug)]
pub struct FakeProcessTable {
    processes: Mutex<BTreeMap<u32, FakeProcess>>,
    next_pid: Mutex<u32>,
    /// Executables whose spawn never shows up in the table.
    silent_spawns: Mutex<HashSet<PathBuf>>,
    signals: Mutex<Vec<(u32, &'static str)>>,
    spawned: Mutex<Vec<PathBuf>>,
}

impl Default for FakeProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProcessTable {
    pub fn new() -> Self {
        Self {
            processes: Mutex::new(BTreeMap::new()),
            next_pid: Mutex::new(1000),
            silent_spawns: Mutex::new(HashSet::new()),
            signals: Mutex::new(Vec::new()),
            spawned: Mutex::new(Vec::new()),
        }
    }

    /// Add a running process and return its pid.
    pub fn add(&self, exe: &Path, behavior: KillBehavior) -> u32 {
        self.add_with(exe, behavior, ProcessState::Running, 64 * 1024 * 1024)
    }

    pub fn add_with(
        &self,
        exe: &Path,
        behavior: KillBehavior,
        status: ProcessState,
        resident_memory: u64,
    ) -> u32 {
        let pid = {
            let mut next = self.next_pid.lock();
            *next += 1;
            *next
        };
        let name = exe
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let record = ProcessRecord {
            pid,
            name,
            exe_path: Some(exe.to_path_buf()),
            status,
            start_time: Some(Utc::now()),
            resident_memory,
        };
        self.processes
            .lock()
            .insert(pid, FakeProcess { record, behavior });
        pid
    }

    /// Spawns of `exe` succeed but never appear in the table.
    pub fn spawn_silently(&self, exe: &Path) {
        self.silent_spawns.lock().insert(exe.to_path_buf());
    }

    /// Remove a process as if it exited on its own.
    pub fn exit(&self, pid: u32) {
        self.processes.lock().remove(&pid);
    }

    pub fn signals(&self) -> Vec<(u32, &'static str)> {
        self.signals.lock().clone()
    }

    pub fn spawned(&self) -> Vec<PathBuf> {
        self.spawned.lock().clone()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.processes.lock().keys().copied().collect()
    }

    fn deliver(&self, pid: u32, kind: &'static str) -> SignalResult {
        self.signals.lock().push((pid, kind));
        let mut processes = self.processes.lock();
        let Some(process) = processes.get(&pid) else {
            return SignalResult::NotFound;
        };
        let exits = match (process.behavior, kind) {
            (KillBehavior::AccessDenied, _) => return SignalResult::AccessDenied,
            (KillBehavior::RejectGraceful, "terminate") => {
                return SignalResult::Failed("graceful signal unsupported".to_string())
            }
            (KillBehavior::RejectGraceful, "kill") => true,
            (KillBehavior::Exit, _) => true,
            (KillBehavior::IgnoreGraceful, "kill") => true,
            _ => false,
        };
        if exits {
            processes.remove(&pid);
        }
        SignalResult::Sent
    }
}

impl ProcessTable for FakeProcessTable {
    fn list(&self, name: &str) -> Vec<ProcessRecord> {
        self.processes
            .lock()
            .values()
            .filter(|p| p.record.name == name)
            .map(|p| p.record.clone())
            .collect()
    }

    fn state(&self, pid: u32) -> ProcessState {
        self.processes
            .lock()
            .get(&pid)
            .map(|p| p.record.status)
            .unwrap_or(ProcessState::NotFound)
    }

    fn terminate(&self, pid: u32) -> SignalResult {
        self.deliver(pid, "terminate")
    }

    fn kill(&self, pid: u32) -> SignalResult {
        self.deliver(pid, "kill")
    }

    fn spawn(&self, exe: &Path) -> std::io::Result<u32> {
        self.spawned.lock().push(exe.to_path_buf());
        if self.silent_spawns.lock().contains(exe) {
            let mut next = self.next_pid.lock();
            *next += 1;
            return Ok(*next);
        }
        Ok(self.add(exe, KillBehavior::Exit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fake_table_signals() {
        let table = FakeProcessTable::new();
        let exe = Path::new("/opt/qmt/bin.x64/XtMiniQmt.exe");
        let stubborn = table.add(exe, KillBehavior::IgnoreGraceful);

        assert_eq!(table.list("XtMiniQmt.exe").len(), 1);
        assert_eq!(table.terminate(stubborn), SignalResult::Sent);
        assert_eq!(table.state(stubborn), ProcessState::Running);
        assert_eq!(table.kill(stubborn), SignalResult::Sent);
        assert_eq!(table.state(stubborn), ProcessState::NotFound);
        assert_eq!(table.kill(stubborn), SignalResult::NotFound);
    }

    #[test]
    fn test_system_table_lists_nothing_for_unknown_name() {
        let table = SystemProcessTable::new();
        assert!(table.list("definitely-not-a-real-process.exe").is_empty());
        assert_eq!(table.state(u32::MAX - 1), ProcessState::NotFound);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_spawned_child_is_reaped_after_exit() {
        let Some(exe) = ["/bin/true", "/usr/bin/true"]
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
        else {
            return;
        };
        let table = SystemProcessTable::new();
        let pid = table.spawn(exe).unwrap();

        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        let mut state = table.state(pid);
        while state != ProcessState::NotFound && std::time::Instant::now() < deadline {
            std::thread::sleep(std::time::Duration::from_millis(50));
            state = table.state(pid);
        }
        assert_eq!(state, ProcessState::NotFound);
    }
}
