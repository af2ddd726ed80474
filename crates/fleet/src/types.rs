//! Shared value types for the fleet domain.
//!
//! These carry the data that flows between a [`crate::Node`] and its
//! collaborators: the connection descriptor, the OS snapshot taken during
//! initialization, command options and results, and target-side paths.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Connection descriptor
// ---------------------------------------------------------------------------

/// Endpoint and credentials of a remote node.
///
/// `address`/`port` is the node's internal endpoint (as seen from inside its
/// network); `public_address`/`public_port` is what this process dials.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub address: String,
    pub port: u16,
    pub public_address: String,
    pub public_port: u16,
    pub username: String,
    pub password: String,
    pub private_key_file: String,
}

impl ConnectionInfo {
    /// Returns `public_address:public_port`.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.public_address, self.public_port)
    }
}

impl Default for ConnectionInfo {
    fn default() -> Self {
        Self {
            address: String::new(),
            port: 22,
            public_address: String::new(),
            public_port: 22,
            username: "root".to_string(),
            password: String::new(),
            private_key_file: String::new(),
        }
    }
}

// Credentials never reach log output.
impl std::fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("address", &self.address)
            .field("port", &self.port)
            .field("public_address", &self.public_address)
            .field("public_port", &self.public_port)
            .field("username", &self.username)
            .field("password", &if self.password.is_empty() { "" } else { "***" })
            .field("private_key_file", &self.private_key_file)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// OS snapshot
// ---------------------------------------------------------------------------

/// Operating-system facts reported by the OS-identification tool.
///
/// Every field is empty when identification failed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsInfo {
    pub kernel_release: String,
    pub kernel_version: String,
    pub hardware_platform: String,
    pub operating_system: String,
}

impl OsInfo {
    /// Linux iff a kernel release was reported and the OS name mentions Linux.
    pub fn is_linux(&self) -> bool {
        !self.kernel_release.is_empty() && self.operating_system.contains("Linux")
    }
}

// ---------------------------------------------------------------------------
// Target paths
// ---------------------------------------------------------------------------

/// Separator convention of a path that lives on a node rather than on this
/// machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathStyle {
    Posix,
    Windows,
}

impl PathStyle {
    /// Style of paths on the machine running this process.
    pub fn host() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Posix
        }
    }

    pub fn separator(self) -> char {
        match self {
            Self::Posix => '/',
            Self::Windows => '\\',
        }
    }
}

/// A path on a node, interpreted with that node's separator convention.
///
/// `std::path::Path` always follows the host's rules, which is wrong for a
/// Windows node driven from Linux and vice versa.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetPath {
    style: PathStyle,
    path: String,
}

impl TargetPath {
    /// Parses `raw` (typically shell output) with the given convention.
    ///
    /// Surrounding whitespace is dropped, separators are normalised, repeated
    /// separators collapse, and a trailing separator is removed unless the
    /// path is a root.
    pub fn parse(raw: &str, style: PathStyle) -> Self {
        let sep = style.separator();
        let mut path = String::with_capacity(raw.len());
        let mut previous_was_sep = false;
        for (i, c) in raw.trim().chars().enumerate() {
            let c = if style == PathStyle::Windows && c == '/' { '\\' } else { c };
            let is_sep = c == sep;
            // A leading `\\` is a UNC prefix and must survive.
            if is_sep && previous_was_sep && !(style == PathStyle::Windows && i == 1) {
                continue;
            }
            previous_was_sep = is_sep;
            path.push(c);
        }
        while path.len() > 1 && path.ends_with(sep) && !Self::is_root(&path, style) {
            path.pop();
        }
        Self { style, path }
    }

    pub fn posix(raw: &str) -> Self {
        Self::parse(raw, PathStyle::Posix)
    }

    pub fn windows(raw: &str) -> Self {
        Self::parse(raw, PathStyle::Windows)
    }

    /// Converts a host path, keeping the host's convention.
    pub fn from_local(path: &std::path::Path) -> Self {
        Self::parse(&path.to_string_lossy(), PathStyle::host())
    }

    /// Appends one segment using this path's separator.
    pub fn join(&self, segment: &str) -> Self {
        let sep = self.style.separator();
        let mut raw = self.path.clone();
        if !raw.is_empty() && !raw.ends_with(sep) {
            raw.push(sep);
        }
        raw.push_str(segment);
        Self::parse(&raw, self.style)
    }

    pub fn style(&self) -> PathStyle {
        self.style
    }

    pub fn as_str(&self) -> &str {
        &self.path
    }

    fn is_root(path: &str, style: PathStyle) -> bool {
        match style {
            PathStyle::Posix => path == "/",
            // `C:\`
            PathStyle::Windows => path.len() == 3 && path.as_bytes()[1] == b':',
        }
    }
}

impl std::fmt::Display for TargetPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path)
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Per-call switches for [`crate::Node::execute`] and
/// [`crate::Node::execute_async`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOptions {
    /// Run through the target's shell so expansions and pipes apply.
    pub shell: bool,
    /// Do not log a non-zero exit at error level.
    pub no_error_log: bool,
    /// Do not log the command line at info level.
    pub no_info_log: bool,
    /// Working directory override on the target.
    pub cwd: Option<TargetPath>,
}

impl CommandOptions {
    pub fn shell() -> Self {
        Self {
            shell: true,
            ..Self::default()
        }
    }

    pub fn quiet(mut self) -> Self {
        self.no_error_log = true;
        self.no_info_log = true;
        self
    }

    pub fn in_dir(mut self, cwd: TargetPath) -> Self {
        self.cwd = Some(cwd);
        self
    }
}

/// Final outcome of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutableResult {
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process ended without an exit status (killed by a signal).
    pub exit_code: Option<i32>,
    pub elapsed: Duration,
}

impl ExecutableResult {
    pub fn is_success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}
