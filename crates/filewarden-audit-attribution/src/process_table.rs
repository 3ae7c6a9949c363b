//! Process-table queries used as the fallback attribution strategy.

use filewarden_common_core::AuditError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::trace;

/// A running process whose command line matched a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    /// Process identifier.
    pub pid: u32,
    /// Arguments joined with single spaces.
    pub command_line: String,
}

/// Result of asking the OS who owns a process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnerLookup {
    /// The lookup call reported success. Either component may still be absent.
    Success {
        /// Domain or host name.
        domain: Option<String>,
        /// Account name.
        account: Option<String>,
    },
    /// The lookup call reported a non-zero status.
    Failed {
        /// OS status or errno.
        code: i32,
    },
}

impl OwnerLookup {
    /// `<domain>\<account>` when the lookup succeeded with both parts present.
    pub fn owner(&self) -> Option<String> {
        match self {
            Self::Success {
                domain: Some(domain),
                account: Some(account),
            } if !domain.is_empty() && !account.is_empty() => Some(format!("{domain}\\{account}")),
            _ => None,
        }
    }
}

/// Read access to the OS process table.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessTable: Send + Sync {
    /// Processes whose command line contains `needle`, in table order.
    fn find_by_command_line(&self, needle: &str) -> Result<Vec<ProcessEntry>, AuditError>;

    /// Owner of `pid`.
    fn owner_of(&self, pid: u32) -> OwnerLookup;

    /// Human-readable form of the query for diagnostics.
    fn describe_query(&self, needle: &str) -> String {
        format!("processes whose command line contains '{needle}'")
    }
}

/// Process table backed by a procfs mount.
#[derive(Debug, Clone)]
pub struct ProcFsTable {
    root: PathBuf,
    host: Option<String>,
}

impl Default for ProcFsTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcFsTable {
    /// Table over `/proc` on the local host.
    pub fn new() -> Self {
        Self::with_root("/proc")
    }

    /// Table over a procfs mounted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            host: local_host_name(),
        }
    }

    /// Override the host component of composed owners.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    fn command_line(dir: &Path) -> Option<String> {
        let raw = fs::read(dir.join("cmdline")).ok()?;
        let joined = raw
            .split(|b| *b == 0)
            .filter(|part| !part.is_empty())
            .map(String::from_utf8_lossy)
            .collect::<Vec<_>>()
            .join(" ");
        Some(joined)
    }
}

impl ProcessTable for ProcFsTable {
    fn find_by_command_line(&self, needle: &str) -> Result<Vec<ProcessEntry>, AuditError> {
        let entries = fs::read_dir(&self.root).map_err(|e| {
            AuditError::attribution_with(
                format!("cannot read process table at {}", self.root.display()),
                e,
            )
        })?;

        let mut matches = Vec::new();
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|n| n.parse::<u32>().ok()) else {
                continue;
            };
            // Processes can exit or deny access between listing and reading.
            let Some(command_line) = Self::command_line(&entry.path()) else {
                trace!(pid, "Skipping unreadable process");
                continue;
            };
            if command_line.contains(needle) {
                matches.push(ProcessEntry { pid, command_line });
            }
        }
        matches.sort_by_key(|p| p.pid);
        Ok(matches)
    }

    fn owner_of(&self, pid: u32) -> OwnerLookup {
        let uid = match process_uid(&self.root.join(pid.to_string())) {
            Ok(uid) => uid,
            Err(e) => {
                return OwnerLookup::Failed {
                    code: e.raw_os_error().unwrap_or(-1),
                }
            }
        };
        match account_name(uid) {
            Ok(account) => OwnerLookup::Success {
                domain: self.host.clone(),
                account,
            },
            Err(code) => OwnerLookup::Failed { code },
        }
    }

    fn describe_query(&self, needle: &str) -> String {
        format!("{}/*/cmdline contains '{needle}'", self.root.display())
    }
}

#[cfg(unix)]
fn process_uid(dir: &Path) -> std::io::Result<u32> {
    use std::os::unix::fs::MetadataExt;
    fs::metadata(dir).map(|m| m.uid())
}

#[cfg(not(unix))]
fn process_uid(_dir: &Path) -> std::io::Result<u32> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "process owners are only available on unix",
    ))
}

#[cfg(unix)]
fn account_name(uid: u32) -> Result<Option<String>, i32> {
    use nix::unistd::{Uid, User};
    match User::from_uid(Uid::from_raw(uid)) {
        Ok(user) => Ok(user.map(|u| u.name)),
        Err(errno) => Err(errno as i32),
    }
}

#[cfg(not(unix))]
fn account_name(_uid: u32) -> Result<Option<String>, i32> {
    Err(-1)
}

#[cfg(unix)]
fn local_host_name() -> Option<String> {
    nix::unistd::gethostname()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
}

#[cfg(not(unix))]
fn local_host_name() -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use filewarden_test_utils::{temp_dir, write_file};

    fn fake_proc(processes: &[(&str, &str)]) -> tempfile::TempDir {
        let root = temp_dir();
        for (pid, cmdline) in processes {
            let dir = root.path().join(pid);
            fs::create_dir(&dir).unwrap();
            fs::write(dir.join("cmdline"), cmdline).unwrap();
        }
        write_file(root.path(), "uptime", "1.0 1.0");
        root
    }

    #[test]
    fn test_owner_requires_both_parts() {
        let full = OwnerLookup::Success {
            domain: Some("fileserver".into()),
            account: Some("bob".into()),
        };
        let no_domain = OwnerLookup::Success {
            domain: None,
            account: Some("bob".into()),
        };
        let empty_account = OwnerLookup::Success {
            domain: Some("fileserver".into()),
            account: Some(String::new()),
        };

        assert_eq!(full.owner().as_deref(), Some(r"fileserver\bob"));
        assert_eq!(no_domain.owner(), None);
        assert_eq!(empty_account.owner(), None);
        assert_eq!(OwnerLookup::Failed { code: 2 }.owner(), None);
    }

    #[test]
    fn test_substring_match_over_joined_arguments() {
        let root = fake_proc(&[
            ("300", "libreoffice\0--calc\0/srv/share/budget.xlsx\0"),
            ("42", "vim\0/srv/share/budget.xlsx.swp\0"),
            ("7", "sshd\0-D\0"),
            ("8", ""),
        ]);
        let table = ProcFsTable::with_root(root.path());

        let found = table.find_by_command_line("budget.xlsx").unwrap();
        let pids: Vec<u32> = found.iter().map(|p| p.pid).collect();
        assert_eq!(pids, vec![42, 300]);
        assert_eq!(found[1].command_line, "libreoffice --calc /srv/share/budget.xlsx");
    }

    #[test]
    fn test_missing_table_is_attribution_error() {
        let table = ProcFsTable::with_root("/definitely/not/proc");
        let err = table.find_by_command_line("x").unwrap_err();
        assert_eq!(err.kind(), "attribution");
    }

    #[test]
    fn test_owner_of_missing_process_fails() {
        let root = fake_proc(&[]);
        let table = ProcFsTable::with_root(root.path()).with_host("fileserver");
        assert!(matches!(table.owner_of(99), OwnerLookup::Failed { .. }));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_finds_own_process() {
        let exe = std::env::current_exe().unwrap();
        let name = exe.file_name().unwrap().to_string_lossy().into_owned();
        let table = ProcFsTable::new();

        let found = table.find_by_command_line(&name).unwrap();
        assert!(found.iter().any(|p| p.pid == std::process::id()));
    }

    #[test]
    fn test_describe_query_names_root() {
        let table = ProcFsTable::with_root("/proc");
        assert_eq!(table.describe_query("a.txt"), "/proc/*/cmdline contains 'a.txt'");
    }
}
