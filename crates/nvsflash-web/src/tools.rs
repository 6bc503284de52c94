//! External tool checks.

use std::collections::BTreeMap;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::settings::Settings;

/// Run `command` and report whether it exits successfully within `timeout`.
///
/// A command that cannot be spawned or times out counts as unavailable.
pub async fn probe_tool(command: &[String], timeout: Duration) -> bool {
    let Some((program, args)) = command.split_first() else {
        return false;
    };

    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            debug!(program = %program, "Tool not available: {}", e);
            return false;
        }
    };

    match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => status.success(),
        Ok(Err(e)) => {
            debug!(program = %program, "Tool wait failed: {}", e);
            false
        }
        Err(_) => {
            debug!(program = %program, "Tool timed out after {:?}", timeout);
            false
        }
    }
}

/// Availability of everything the flashing page depends on.
pub async fn check_tools(settings: &Settings) -> BTreeMap<String, bool> {
    let mut status = BTreeMap::new();

    // The generator is part of this binary.
    status.insert("nvs_partition_gen".to_string(), true);

    let timeout = Duration::from_secs(settings.tools.timeout_secs);
    for probe in &settings.tools.probes {
        let available = probe_tool(&probe.command, timeout).await;
        status.insert(probe.name.clone(), available);
    }

    status.insert(
        "firmware_bin".to_string(),
        settings.static_file("firmware.bin").is_file(),
    );
    status.insert(
        "manifest_json".to_string(),
        settings.static_file("manifest.json").is_file(),
    );

    status
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_missing_program() {
        let found = probe_tool(
            &command(&["nvsflash-no-such-program", "--help"]),
            Duration::from_secs(1),
        )
        .await;
        assert!(!found);
    }

    #[tokio::test]
    async fn test_empty_command() {
        assert!(!probe_tool(&[], Duration::from_secs(1)).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status() {
        assert!(probe_tool(&command(&["true"]), Duration::from_secs(5)).await);
        assert!(!probe_tool(&command(&["false"]), Duration::from_secs(5)).await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout() {
        let found = probe_tool(&command(&["sleep", "5"]), Duration::from_millis(50)).await;
        assert!(!found);
    }

    #[tokio::test]
    async fn test_check_tools_reports_static_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("manifest.json"), "{}").unwrap();

        let mut settings = Settings::default();
        settings.assets.static_dir = dir.path().to_path_buf();
        settings.tools.probes.clear();

        let status = check_tools(&settings).await;
        assert_eq!(status["nvs_partition_gen"], true);
        assert_eq!(status["manifest_json"], true);
        assert_eq!(status["firmware_bin"], false);
        assert_eq!(status.len(), 3);
    }
}
