// Core data structures shared across the panel modules.

/// The four managed add-on services.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceId {
    PairDrop,
    Plex,
    Tailscale,
    ZeroTier,
}

/// Captured result of one external command invocation.
#[derive(Debug, Clone, Default)]
pub struct CmdOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Preferred message body for a failed command: stderr, then stdout,
    /// then a generic fallback.
    pub fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        "Unknown error".to_string()
    }
}

/// Point-in-time snapshot of a service's observable state. Recomputed on
/// every probe pass, never cached; it may disagree with the persisted
/// configuration and the panel shows that disagreement as-is.
#[derive(Debug, Clone, Default)]
pub struct ServiceStatus {
    pub installed: bool,
    pub running: bool,
    /// Plex: whether the configured browser root directory exists.
    pub browser_root_exists: bool,
    /// Plex: observed "uid:gid" owner of the browser root.
    pub observed_owner: Option<String>,
    pub version: Option<String>,
    /// Plex: derived web interface URL.
    pub web_url: Option<String>,
    /// Tailscale: raw `tailscale status` output or a placeholder.
    pub status_text: Option<String>,
    /// Tailscale: assigned IPv4 address.
    pub address: Option<String>,
    /// Tailscale: login URL extracted from the status output, if any.
    pub auth_url: Option<String>,
    /// Tailscale: detected WAN device for offload toggles.
    pub wan_device: Option<String>,
}

impl ServiceStatus {
    /// True when the on-disk owner differs from the configured one. Only
    /// meaningful while the directory actually exists.
    pub fn owner_mismatch(&self, configured_owner: &str) -> bool {
        self.browser_root_exists
            && self
                .observed_owner
                .as_deref()
                .is_some_and(|o| o != configured_owner)
    }
}

/// Outcome of a config write that chains an external side effect. The
/// two phases are not transactional, so both halves are reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWriteResult {
    pub persisted: bool,
    pub side_effect_applied: bool,
    pub error: Option<String>,
}

impl ConfigWriteResult {
    pub fn ok() -> Self {
        Self {
            persisted: true,
            side_effect_applied: true,
            error: None,
        }
    }

    pub fn partial(error: String) -> Self {
        Self {
            persisted: true,
            side_effect_applied: false,
            error: Some(error),
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            persisted: false,
            side_effect_applied: false,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A transient user-visible message, shown until the next key press.
#[derive(Debug, Clone)]
pub struct Notification {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notification {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            text: text.into(),
        }
    }
}
