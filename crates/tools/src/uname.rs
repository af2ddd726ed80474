use std::sync::OnceLock;

use async_trait::async_trait;
use fleet::{CommandOptions, CommandRunner, OsIdentification, OsInfo};
use regex::Regex;

const COMMAND: &str = "uname -vrio";

/// Identifies a node from `uname -vrio`.
///
/// Output is `<release> <version...> <platform> <os>`; the kernel version is
/// free text with spaces, so it is whatever sits between the first and the
/// last two fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct Uname;

fn pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^(?P<release>\S+) (?P<version>.+) (?P<platform>\S+) (?P<os>\S+)$").ok()
        })
        .as_ref()
}

/// Parses one line of `uname -vrio` output.
pub fn parse_uname(output: &str) -> Option<OsInfo> {
    let captures = pattern()?.captures(output.trim())?;
    Some(OsInfo {
        kernel_release: captures["release"].to_string(),
        kernel_version: captures["version"].to_string(),
        hardware_platform: captures["platform"].to_string(),
        operating_system: captures["os"].to_string(),
    })
}

#[async_trait]
impl OsIdentification for Uname {
    async fn identify(&self, runner: &dyn CommandRunner) -> OsInfo {
        match runner.execute(COMMAND, CommandOptions::default().quiet()).await {
            Ok(result) if result.is_success() => parse_uname(&result.stdout).unwrap_or_else(|| {
                tracing::debug!(stdout = %result.stdout.trim(), "unrecognized uname output");
                OsInfo::default()
            }),
            Ok(result) => {
                tracing::debug!(exit_code = ?result.exit_code, "uname unavailable");
                OsInfo::default()
            }
            Err(e) => {
                tracing::debug!(error = %e, "uname could not run");
                OsInfo::default()
            }
        }
    }
}
