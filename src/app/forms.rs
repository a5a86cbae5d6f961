// Field declarations and the save pipeline. A field maps one config
// option to a widget plus validation; a handful of fields chain an
// external command after the persistence write. The two steps are not
// transactional and the combined outcome is reported as a
// ConfigWriteResult so partial failure stays visible.

use super::config::{ConfigFile, ConfigStore};
use super::model::ConfigWriteResult;
use super::shell::CommandRunner;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Widget {
    /// 0/1 toggle.
    Flag,
    Text,
    Password,
    Select(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validate {
    None,
    Port,
    UInteger,
    /// 16-character hex network ID.
    Hex16,
}

/// Command chained after the config write succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// `<init-script> enable` or `disable`, following the flag value.
    EnableDisable,
    /// ethtool UDP GRO forwarding toggles on the WAN device.
    UdpGro,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub key: &'static str,
    pub label: &'static str,
    pub help: &'static str,
    pub widget: Widget,
    pub validate: Validate,
    pub placeholder: &'static str,
    pub default: &'static str,
    pub required: bool,
    pub side_effect: Option<SideEffect>,
}

impl FieldSpec {
    pub const fn text(key: &'static str, label: &'static str) -> Self {
        Self {
            key,
            label,
            help: "",
            widget: Widget::Text,
            validate: Validate::None,
            placeholder: "",
            default: "",
            required: false,
            side_effect: None,
        }
    }

    pub const fn flag(key: &'static str, label: &'static str) -> Self {
        let mut spec = Self::text(key, label);
        spec.widget = Widget::Flag;
        spec.default = "0";
        spec
    }
}

fn hex16_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-fA-F]{16}$").unwrap())
}

/// Validate a single field value. Empty optional values pass; empty
/// required values do not.
pub fn check(spec: &FieldSpec, value: &str) -> Result<(), String> {
    if value.is_empty() {
        if spec.required {
            return Err("Field is required".to_string());
        }
        return Ok(());
    }
    match spec.validate {
        Validate::None => Ok(()),
        Validate::Port => value
            .parse::<u16>()
            .map(|_| ())
            .map_err(|_| "Must be a valid port number".to_string()),
        Validate::UInteger => value
            .parse::<u32>()
            .map(|_| ())
            .map_err(|_| "Must be a non-negative integer".to_string()),
        Validate::Hex16 => {
            if hex16_re().is_match(value) {
                Ok(())
            } else {
                Err("Must be a valid 16-character Network ID".to_string())
            }
        }
    }
}

fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
) -> Result<(), String> {
    match runner.run(program, args) {
        Ok(out) if out.success() => Ok(()),
        Ok(out) => Err(out.failure_message()),
        Err(e) => Err(e.to_string()),
    }
}

fn apply_side_effect(
    runner: &dyn CommandRunner,
    effect: SideEffect,
    value: &str,
    init_script: &str,
    wan_device: &str,
) -> Result<(), String> {
    match effect {
        SideEffect::EnableDisable => {
            let action = if value == "1" { "enable" } else { "disable" };
            run_checked(runner, init_script, &[action])
        }
        SideEffect::UdpGro => {
            let (gro_list, gro_fwd) = if value == "1" { ("off", "on") } else { ("on", "off") };
            run_checked(
                runner,
                "/usr/sbin/ethtool",
                &["-K", wan_device, "rx-gro-list", gro_list],
            )?;
            run_checked(
                runner,
                "/usr/sbin/ethtool",
                &["-K", wan_device, "rx-udp-gro-forwarding", gro_fwd],
            )
        }
    }
}

/// Persist the config file, then run the chained commands for the
/// fields that changed. A save failure writes nothing and skips the
/// chain; a chain failure leaves the already-persisted value in place
/// and reports the divergence.
pub fn save_and_chain(
    runner: &dyn CommandRunner,
    store: &ConfigStore,
    cfg: &ConfigFile,
    effects: &[(SideEffect, String)],
    init_script: &str,
    wan_device: &str,
) -> ConfigWriteResult {
    if let Err(e) = store.save(cfg) {
        return ConfigWriteResult::failed(format!("{:#}", e));
    }
    for (effect, value) in effects {
        if let Err(msg) = apply_side_effect(runner, *effect, value, init_script, wan_device) {
            log::warn!("side effect after save failed: {}", msg);
            return ConfigWriteResult::partial(msg);
        }
    }
    ConfigWriteResult::ok()
}

/// Plex path auto-fill: derive the library paths from the browser root
/// for any of them left empty.
pub const PLEX_PATH_DEFAULTS: &[(&str, &str)] = &[
    ("library_dir", "/.plex/Library"),
    ("application_support_dir", "/.plex/Library/Application Support"),
    (
        "compressed_archive_path",
        "/.plex/Library/Application/plexmediaserver.sqfs",
    ),
];

pub fn plex_path_defaults(browser_root: &str) -> Vec<(&'static str, String)> {
    let root = browser_root.trim_end_matches('/');
    PLEX_PATH_DEFAULTS
        .iter()
        .map(|(key, suffix)| (*key, format!("{}{}", root, suffix)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::shell::FakeRunner;

    const ID_FIELD: FieldSpec = FieldSpec {
        validate: Validate::Hex16,
        required: true,
        ..FieldSpec::text("id", "Network ID")
    };

    const PORT_FIELD: FieldSpec = FieldSpec {
        validate: Validate::Port,
        placeholder: "9993",
        ..FieldSpec::text("port", "Port")
    };

    #[test]
    fn network_id_must_be_sixteen_hex_chars() {
        assert!(check(&ID_FIELD, "12345").is_err());
        assert!(check(&ID_FIELD, "0123456789abcdef").is_ok());
        assert!(check(&ID_FIELD, "0123456789ABCDEF").is_ok());
        assert!(check(&ID_FIELD, "0123456789abcdeg").is_err());
        assert!(check(&ID_FIELD, "").is_err());
    }

    #[test]
    fn port_validation_accepts_u16_range_only() {
        assert!(check(&PORT_FIELD, "9993").is_ok());
        assert!(check(&PORT_FIELD, "0").is_ok());
        assert!(check(&PORT_FIELD, "65535").is_ok());
        assert!(check(&PORT_FIELD, "65536").is_err());
        assert!(check(&PORT_FIELD, "abc").is_err());
        // optional field, empty passes
        assert!(check(&PORT_FIELD, "").is_ok());
    }

    #[test]
    fn save_persists_even_when_chained_command_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        let runner = FakeRunner::new()
            .on("/etc/init.d/plexmediaserver enable", 1, "", "no such service\n");

        let mut cfg = ConfigFile::empty("plexmediaserver");
        cfg.set("main", "plexmediaserver", "enabled", "1");

        let result = save_and_chain(
            &runner,
            &store,
            &cfg,
            &[(SideEffect::EnableDisable, "1".to_string())],
            "/etc/init.d/plexmediaserver",
            "eth0",
        );

        assert!(result.persisted);
        assert!(!result.side_effect_applied);
        assert!(result.error.unwrap().contains("no such service"));

        // The divergence stays on disk for the next probe to surface.
        let back = store.load("plexmediaserver").unwrap();
        assert_eq!(back.get("main", "enabled"), Some("1"));
    }

    #[test]
    fn udp_gro_toggle_issues_both_ethtool_calls() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        let runner = FakeRunner::new()
            .on("/usr/sbin/ethtool -K wan0 rx-gro-list off", 0, "", "")
            .on("/usr/sbin/ethtool -K wan0 rx-udp-gro-forwarding on", 0, "", "");

        let mut cfg = ConfigFile::empty("tailscale");
        cfg.set("settings", "tailscale", "udp_gro_enable", "1");

        let result = save_and_chain(
            &runner,
            &store,
            &cfg,
            &[(SideEffect::UdpGro, "1".to_string())],
            "/etc/init.d/tailscale",
            "wan0",
        );
        assert_eq!(result, ConfigWriteResult::ok());
        assert_eq!(runner.calls().len(), 2);
    }

    #[test]
    fn plex_paths_derive_from_trimmed_root() {
        let filled = plex_path_defaults("/mnt/sda1/");
        assert_eq!(filled[0], ("library_dir", "/mnt/sda1/.plex/Library".to_string()));
        assert_eq!(
            filled[2].1,
            "/mnt/sda1/.plex/Library/Application/plexmediaserver.sqfs"
        );
    }
}
