//! External handle-enumeration tool.

use async_trait::async_trait;
use filewarden_audit_types::{Attribution, ProcessId};
use filewarden_common_core::AuditError;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStdout, Command};
use tracing::debug;

/// Cap on captured tool output.
const MAX_OUTPUT_SIZE: u64 = 4 * 1024 * 1024;

/// pid, type, user, optional handle, path.
const HANDLE_LINE_PATTERN: &str =
    r"\s*pid: ([0-9]*)\s*type: ([^ ]*)\s*([^ ]*)\s*(?:([0-9A-Fa-f]+): )?(.*)";

fn handle_line_regex() -> Option<&'static Regex> {
    static REGEX: OnceLock<Option<Regex>> = OnceLock::new();
    REGEX
        .get_or_init(|| Regex::new(HANDLE_LINE_PATTERN).ok())
        .as_ref()
}

/// Something that lists open handles for a path and returns its raw output.
#[async_trait]
pub trait HandleTool: Send + Sync {
    /// Run the tool against `path` and return its standard output.
    async fn query(&self, path: &Path) -> Result<String, AuditError>;
}

/// Runs a handle-enumeration executable as `<exe> /accepteula -u <path>`.
#[derive(Debug, Clone)]
pub struct ExternalHandleTool {
    executable: PathBuf,
    timeout: Option<Duration>,
}

impl ExternalHandleTool {
    /// Create a tool wrapper. No timeout by default.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            timeout: None,
        }
    }

    /// Kill the tool if it runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl HandleTool for ExternalHandleTool {
    async fn query(&self, path: &Path) -> Result<String, AuditError> {
        let mut child = Command::new(&self.executable)
            .arg("/accepteula")
            .arg("-u")
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AuditError::attribution_with(
                    format!("failed to launch {}", self.executable.display()),
                    e,
                )
            })?;

        let read = read_stdout(child.stdout.take());
        let output = match self.timeout {
            Some(limit) => tokio::select! {
                output = read => output,
                _ = tokio::time::sleep(limit) => {
                    let _ = child.kill().await;
                    return Err(AuditError::attribution(format!(
                        "{} timed out after {:?}",
                        self.executable.display(),
                        limit
                    )));
                }
            },
            None => read.await,
        }
        .map_err(|e| AuditError::attribution_with("failed to read tool output", e))?;

        let status = child
            .wait()
            .await
            .map_err(|e| AuditError::attribution_with("failed to wait for tool", e))?;
        debug!(
            executable = %self.executable.display(),
            status = ?status.code(),
            bytes = output.len(),
            "Handle tool finished"
        );

        Ok(output)
    }
}

async fn read_stdout(stdout: Option<ChildStdout>) -> std::io::Result<String> {
    let mut content = Vec::new();
    if let Some(stdout) = stdout {
        stdout.take(MAX_OUTPUT_SIZE).read_to_end(&mut content).await?;
    }
    Ok(String::from_utf8_lossy(&content).into_owned())
}

/// Find the first output line describing `full_path` and extract its process
/// and user.
///
/// The reported path must equal `full_path` exactly once line terminators
/// are removed. Lines with an empty or zero pid are skipped.
pub fn parse_handle_output(output: &str, full_path: &str) -> Attribution {
    let Some(regex) = handle_line_regex() else {
        return Attribution::Unresolved;
    };
    for line in output.lines() {
        let Some(caps) = regex.captures(line) else {
            continue;
        };

        let reported: String = caps
            .get(5)
            .map_or("", |m| m.as_str())
            .chars()
            .filter(|c| *c != '\r' && *c != '\n')
            .collect();
        if reported != full_path {
            continue;
        }

        let Some(pid) = caps.get(1).and_then(|m| m.as_str().parse::<i64>().ok()) else {
            continue;
        };
        let process_id = ProcessId::new(pid);
        if !process_id.is_resolved() {
            continue;
        }

        let user = account_from_token(caps.get(3).map_or("", |m| m.as_str()));
        return Attribution::resolved(process_id, user);
    }

    Attribution::Unresolved
}

/// A token shaped like a profile path (`C:\Users\bob`) is reduced to its
/// last segment; anything else (`DOMAIN\bob`, `bob`) is kept.
fn account_from_token(token: &str) -> String {
    let bytes = token.as_bytes();
    let has_drive = bytes.len() > 2 && bytes[0].is_ascii_alphabetic() && &bytes[1..3] == b":\\";
    if has_drive {
        token.rsplit('\\').next().unwrap_or(token).to_string()
    } else {
        token.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DEVICE_PATH: &str = r"\Device\HarddiskVolume2\data\report.docx";

    #[test]
    fn test_profile_path_user() {
        let output = r"pid: 4821 type: File C:\Users\bob \Device\HarddiskVolume2\data\report.docx";
        assert_eq!(
            parse_handle_output(output, DEVICE_PATH),
            Attribution::resolved(4821u32, "bob")
        );
    }

    #[test]
    fn test_domain_user_with_handle() {
        let output = "\r\nNthandle v5.0\r\n\r\nWINWORD.EXE        pid: 912    type: File  CORP\\alice   1A4: C:\\data\\q3.xlsx\r\n";
        assert_eq!(
            parse_handle_output(output, r"C:\data\q3.xlsx"),
            Attribution::resolved(912u32, r"CORP\alice")
        );
    }

    #[test]
    fn test_first_matching_line_wins() {
        let output = concat!(
            "pid: 10 type: File CORP\\a 10: C:\\other.txt\n",
            "pid: 20 type: File CORP\\b 14: C:\\target.txt\n",
            "pid: 30 type: File CORP\\c 18: C:\\target.txt\n",
        );
        assert_eq!(
            parse_handle_output(output, r"C:\target.txt"),
            Attribution::resolved(20u32, r"CORP\b")
        );
    }

    #[test]
    fn test_trailing_whitespace_is_not_a_match() {
        let output = r"pid: 4821 type: File C:\Users\bob \Device\HarddiskVolume2\data\report.docx ";
        assert_eq!(parse_handle_output(output, DEVICE_PATH), Attribution::Unresolved);
    }

    #[test]
    fn test_leading_whitespace_is_not_a_match() {
        let output = "pid: 912 type: File CORP\\alice 1A4:  C:\\t.txt\r\n";
        assert_eq!(parse_handle_output(output, r"C:\t.txt"), Attribution::Unresolved);
    }

    #[test]
    fn test_comparison_is_case_sensitive() {
        let output = r"pid: 4821 type: File C:\Users\bob \device\harddiskvolume2\data\report.docx";
        assert_eq!(parse_handle_output(output, DEVICE_PATH), Attribution::Unresolved);
    }

    #[test]
    fn test_empty_and_zero_pid_skipped() {
        let output = concat!(
            "pid:  type: File CORP\\a 10: C:\\t.txt\n",
            "pid: 0 type: File CORP\\a 10: C:\\t.txt\n",
        );
        assert_eq!(parse_handle_output(output, r"C:\t.txt"), Attribution::Unresolved);
    }

    #[test]
    fn test_no_matches_found() {
        let output = "Nthandle v5.0\r\n\r\nNo matching handles found.\r\n";
        assert_eq!(parse_handle_output(output, r"C:\t.txt"), Attribution::Unresolved);
    }

    #[test]
    fn test_account_from_token() {
        assert_eq!(account_from_token(r"C:\Users\bob"), "bob");
        assert_eq!(account_from_token(r"CORP\bob"), r"CORP\bob");
        assert_eq!(account_from_token("bob"), "bob");
        assert_eq!(account_from_token(""), "");
    }

    #[tokio::test]
    async fn test_missing_executable_is_attribution_error() {
        let tool = ExternalHandleTool::new("/definitely/not/a/tool");
        let err = tool.query(Path::new("/tmp/x")).await.unwrap_err();
        assert_eq!(err.kind(), "attribution");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_passes_arguments_and_captures_stdout() {
        let tool = ExternalHandleTool::new("echo").with_timeout(Some(Duration::from_secs(5)));
        let output = tool.query(Path::new("/srv/a b.txt")).await.unwrap();
        assert_eq!(output.trim_end(), "/accepteula -u /srv/a b.txt");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_tool_is_killed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = filewarden_test_utils::temp_dir();
        let script = filewarden_test_utils::write_file(dir.path(), "slow.sh", "#!/bin/sh\nsleep 5\n");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tool = ExternalHandleTool::new(&script).with_timeout(Some(Duration::from_millis(100)));
        let started = std::time::Instant::now();
        let err = tool.query(Path::new("/srv/a.txt")).await.unwrap_err();

        assert_eq!(err.kind(), "attribution");
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    proptest! {
        #[test]
        fn test_parsed_pid_matches_line(pid in 1u32..1_000_000, name in "[a-z]{1,10}") {
            let path = format!(r"C:\share\{name}.txt");
            let output = format!("proc.exe pid: {pid} type: File CORP\\{name} 2C: {path}\r\n");
            prop_assert_eq!(
                parse_handle_output(&output, &path),
                Attribution::resolved(pid, format!("CORP\\{name}"))
            );
        }
    }
}
