// The four service panels: config file, init script, field layout and
// which actions the current status makes available. This is the
// declarative content of the original per-service views.

use super::config::ConfigFile;
use super::forms::{FieldSpec, SideEffect, Validate, Widget};
use super::model::{ServiceId, ServiceStatus};
use super::probe::{PairDropProbe, PlexProbe, StatusProvider, TailscaleProbe, ZeroTierProbe};

pub struct ServiceSpec {
    pub id: ServiceId,
    pub title: &'static str,
    pub config_name: &'static str,
    /// Named section holding the scalar options.
    pub section: &'static str,
    pub section_type: &'static str,
    pub init_script: &'static str,
    /// Tag passed to `logread -e` for the log popup.
    pub log_tag: &'static str,
    pub fields: &'static [FieldSpec],
    /// Repeated anonymous sections (ZeroTier networks), empty elsewhere.
    pub network_type: &'static str,
    pub network_fields: &'static [FieldSpec],
    pub provider: &'static dyn StatusProvider,
    /// Action dispatched once after a successful save.
    pub save_chain: Option<&'static str>,
}

static PAIRDROP_FIELDS: [FieldSpec; 4] = [
    FieldSpec {
        required: true,
        ..FieldSpec::flag("enabled", "Enable Service")
    },
    FieldSpec {
        validate: Validate::Port,
        default: "3000",
        ..FieldSpec::text("port", "Port")
    },
    FieldSpec {
        help: "Specify Node.js version (e.g., v20.10.0). Leave empty for default.",
        placeholder: "v20.10.0",
        ..FieldSpec::text("node_version", "Node.js Version")
    },
    FieldSpec {
        help: "Specify PairDrop version tag (e.g., v1.10.7). Leave empty for latest.",
        ..FieldSpec::text("pairdrop_version", "PairDrop Version")
    },
];

static PLEX_FIELDS: [FieldSpec; 10] = [
    FieldSpec {
        required: true,
        side_effect: Some(SideEffect::EnableDisable),
        help: "Enables the service to start automatically on boot.",
        ..FieldSpec::flag("enabled", "Enable Autostart")
    },
    FieldSpec {
        validate: Validate::UInteger,
        placeholder: "0",
        help: "The user ID to run Plex as. Set to 0 for root.",
        ..FieldSpec::text("run_user", "Run as User (ID)")
    },
    FieldSpec {
        validate: Validate::UInteger,
        placeholder: "0",
        help: "The group ID to run Plex as. Set to 0 for root.",
        ..FieldSpec::text("run_group", "Run as Group (ID)")
    },
    FieldSpec {
        widget: Widget::Password,
        placeholder: "claim-xxxxxxxxxxxxxxxxxxxx",
        help: "Optional claim code from plex.tv/claim. Required for first run only.",
        ..FieldSpec::text("claim_code", "Plex Claim Code")
    },
    FieldSpec {
        help: "Version folder name to use. Leave empty to auto-detect the highest version.",
        ..FieldSpec::text("force_version", "Force Specific Version")
    },
    FieldSpec {
        placeholder: "/mnt/sda1",
        help: "Mountpoint of the USB HDD containing the Plex library. Leave empty to auto-detect.",
        ..FieldSpec::text("browser_root", "Browser Root")
    },
    FieldSpec {
        help: "Path to the main Plex library data.",
        ..FieldSpec::text("library_dir", "Library Directory")
    },
    FieldSpec {
        help: "Where metadata is stored.",
        ..FieldSpec::text("application_support_dir", "Application Support Dir")
    },
    FieldSpec {
        help: "Location of plexmediaserver.sqfs or .txz.",
        ..FieldSpec::text("compressed_archive_path", "Compressed Archive Path")
    },
    FieldSpec {
        help: "Override the automatic download URL for Plex updates.",
        ..FieldSpec::text("force_update_download_url", "Custom Update URL")
    },
];

static TAILSCALE_FIELDS: [FieldSpec; 6] = [
    FieldSpec {
        required: true,
        help: "Enable the Tailscale daemon.",
        ..FieldSpec::flag("enable", "Enable")
    },
    FieldSpec {
        validate: Validate::Port,
        placeholder: "41641",
        help: "UDP port to listen on. Default: 41641",
        ..FieldSpec::text("port", "Port")
    },
    FieldSpec {
        widget: Widget::Select(&["nftables", "iptables"]),
        default: "nftables",
        help: "Firewall configuration mode. OpenWrt 22.03+ usually requires nftables.",
        ..FieldSpec::text("fw_mode", "Firewall Mode")
    },
    FieldSpec {
        default: "/etc/tailscale/tailscaled.state",
        help: "Location of the Tailscale state file.",
        ..FieldSpec::text("state_file", "State File")
    },
    FieldSpec {
        default: "1",
        ..FieldSpec::flag("log_stderr", "Log to Stderr")
    },
    FieldSpec {
        side_effect: Some(SideEffect::UdpGro),
        help: "Sets rx-udp-gro-forwarding on and rx-gro-list off on the WAN device.",
        ..FieldSpec::flag("udp_gro_enable", "Enable UDP GRO Forwarding")
    },
];

static ZEROTIER_FIELDS: [FieldSpec; 6] = [
    FieldSpec {
        required: true,
        ..FieldSpec::flag("enabled", "Enabled")
    },
    FieldSpec {
        validate: Validate::Port,
        placeholder: "9993",
        help: "ZeroTier listening port (default 9993). Set to 0 for random.",
        ..FieldSpec::text("port", "Port")
    },
    FieldSpec {
        widget: Widget::Password,
        help: "Leave blank to generate a secret on first run.",
        ..FieldSpec::text("secret", "Client Secret")
    },
    FieldSpec {
        placeholder: "/etc/zerotier",
        help: "Directory for persistent configuration (e.g. /etc/zerotier).",
        ..FieldSpec::text("config_path", "Persistent Config Path")
    },
    FieldSpec {
        help: "Copy configuration to memory to avoid flash writes.",
        ..FieldSpec::flag("copy_config_path", "Copy Config")
    },
    FieldSpec {
        placeholder: "/etc/zerotier.conf",
        help: "Path to local.conf file for advanced options.",
        ..FieldSpec::text("local_conf_path", "Local Config File")
    },
];

static ZEROTIER_NETWORK_FIELDS: [FieldSpec; 5] = [
    FieldSpec {
        validate: Validate::Hex16,
        required: true,
        help: "16-character Network ID from ZeroTier Central.",
        ..FieldSpec::text("id", "Network ID")
    },
    FieldSpec {
        default: "1",
        help: "Allow ZeroTier to assign managed IP addresses.",
        ..FieldSpec::flag("allow_managed", "Auto-Assign IP")
    },
    FieldSpec {
        help: "Allow setting global/public IP addresses.",
        ..FieldSpec::flag("allow_global", "Allow Global IPs")
    },
    FieldSpec {
        help: "Allow overriding the default route (Full Tunnel).",
        ..FieldSpec::flag("allow_default", "Allow Default Route")
    },
    FieldSpec {
        help: "Allow accepting DNS configuration from the controller.",
        ..FieldSpec::flag("allow_dns", "Allow DNS")
    },
];

static PAIRDROP_PROBE: PairDropProbe = PairDropProbe;
static PLEX_PROBE: PlexProbe = PlexProbe;
static TAILSCALE_PROBE: TailscaleProbe = TailscaleProbe;
static ZEROTIER_PROBE: ZeroTierProbe = ZeroTierProbe;

pub static SERVICES: [ServiceSpec; 4] = [
    ServiceSpec {
        id: ServiceId::PairDrop,
        title: "PairDrop",
        config_name: "pairdrop",
        section: "main",
        section_type: "pairdrop",
        init_script: "/etc/init.d/pairdrop",
        log_tag: "pairdrop",
        fields: &PAIRDROP_FIELDS,
        network_type: "",
        network_fields: &[],
        provider: &PAIRDROP_PROBE,
        save_chain: None,
    },
    ServiceSpec {
        id: ServiceId::Plex,
        title: "Plex Media Server",
        config_name: "plexmediaserver",
        section: "main",
        section_type: "plexmediaserver",
        init_script: "/etc/init.d/plexmediaserver",
        log_tag: "plexmediaserver",
        fields: &PLEX_FIELDS,
        network_type: "",
        network_fields: &[],
        provider: &PLEX_PROBE,
        save_chain: None,
    },
    ServiceSpec {
        id: ServiceId::Tailscale,
        title: "Tailscale",
        config_name: "tailscale",
        section: "settings",
        section_type: "settings",
        init_script: "/etc/init.d/tailscale",
        log_tag: "tailscale",
        fields: &TAILSCALE_FIELDS,
        network_type: "",
        network_fields: &[],
        provider: &TAILSCALE_PROBE,
        save_chain: Some("restart"),
    },
    ServiceSpec {
        id: ServiceId::ZeroTier,
        title: "ZeroTier",
        config_name: "zerotier",
        section: "global",
        section_type: "zerotier",
        init_script: "/etc/init.d/zerotier",
        log_tag: "zerotier",
        fields: &ZEROTIER_FIELDS,
        network_type: "network",
        network_fields: &ZEROTIER_NETWORK_FIELDS,
        provider: &ZEROTIER_PROBE,
        save_chain: None,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    /// Run the init script and wait.
    Script,
    /// Run and show the captured output in a popup.
    Capture,
    /// Run detached in the background.
    Detached,
}

#[derive(Debug, Clone, Copy)]
pub struct Action {
    pub verb: &'static str,
    pub label: &'static str,
    pub confirm: Option<&'static str>,
    pub kind: ActionKind,
}

const fn act(verb: &'static str, label: &'static str) -> Action {
    Action {
        verb,
        label,
        confirm: None,
        kind: ActionKind::Script,
    }
}

const fn confirm(verb: &'static str, label: &'static str, prompt: &'static str) -> Action {
    Action {
        verb,
        label,
        confirm: Some(prompt),
        kind: ActionKind::Script,
    }
}

/// Which actions the current snapshot allows. Independent button logic
/// per status combination; nothing prevents the underlying state from
/// changing between the probe and the dispatch.
pub fn available_actions(
    spec: &ServiceSpec,
    status: &ServiceStatus,
    cfg: &ConfigFile,
) -> Vec<Action> {
    let mut actions = Vec::new();
    match spec.id {
        ServiceId::PairDrop => {
            if !status.installed {
                actions.push(act("install", "Install"));
            }
            if status.installed && !status.running {
                actions.push(act("start", "Start"));
            }
            if status.running {
                actions.push(act("stop", "Stop"));
                actions.push(act("restart", "Restart"));
            }
            if status.installed {
                actions.push(confirm(
                    "reinstall",
                    "Force Reinstall",
                    "Reinstall PairDrop from scratch?",
                ));
                actions.push(confirm("uninstall", "Uninstall", "Remove PairDrop?"));
            }
        }
        ServiceId::Plex => {
            let locked = !status.installed || !status.browser_root_exists;
            if !locked {
                if status.running {
                    actions.push(act("stop", "Stop"));
                } else {
                    actions.push(act("start", "Start"));
                }
                actions.push(act("restart", "Save & Restart"));

                let run_user = cfg.get("main", "run_user").unwrap_or("0");
                let is_root = run_user == "0" || run_user == "root";
                if !is_root {
                    actions.push(confirm(
                        "reclaim",
                        "Reclaim Ownership",
                        "This will run chown -R on your entire Browser Root. This may take a while depending on file count. Continue?",
                    ));
                }
            }
            actions.push(Action {
                verb: "check_update",
                label: "Check for Updates",
                confirm: None,
                kind: ActionKind::Capture,
            });
            actions.push(Action {
                verb: "update",
                label: if status.installed {
                    "Perform Update"
                } else {
                    "Download & Install"
                },
                confirm: Some(
                    "Are you sure you want to perform an update? This might take a while.",
                ),
                kind: ActionKind::Detached,
            });
            actions.push(confirm(
                "reset",
                "Wipe Config",
                "WARNING: This will wipe your Plex configuration! Are you sure?",
            ));
        }
        ServiceId::Tailscale | ServiceId::ZeroTier => {
            if status.installed && !status.running {
                actions.push(act("start", "Start"));
            }
            if status.running {
                actions.push(act("stop", "Stop"));
            }
            if status.installed {
                actions.push(act("restart", "Restart"));
            }
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verbs(actions: &[Action]) -> Vec<&'static str> {
        actions.iter().map(|a| a.verb).collect()
    }

    #[test]
    fn pairdrop_offers_only_install_when_not_installed() {
        let spec = &SERVICES[0];
        let cfg = ConfigFile::empty("pairdrop");
        let status = ServiceStatus::default();
        assert_eq!(verbs(&available_actions(spec, &status, &cfg)), ["install"]);
    }

    #[test]
    fn pairdrop_running_offers_stop_restart_but_not_start() {
        let spec = &SERVICES[0];
        let cfg = ConfigFile::empty("pairdrop");
        let status = ServiceStatus {
            installed: true,
            running: true,
            ..Default::default()
        };
        let v = verbs(&available_actions(spec, &status, &cfg));
        assert!(v.contains(&"stop"));
        assert!(v.contains(&"restart"));
        assert!(!v.contains(&"start"));
        assert!(!v.contains(&"install"));
    }

    #[test]
    fn plex_locks_service_control_without_browser_root() {
        let spec = &SERVICES[1];
        let cfg = ConfigFile::empty("plexmediaserver");
        let status = ServiceStatus {
            installed: true,
            browser_root_exists: false,
            ..Default::default()
        };
        let v = verbs(&available_actions(spec, &status, &cfg));
        assert!(!v.contains(&"start"));
        assert!(!v.contains(&"restart"));
        // maintenance stays reachable, it is how you repair the install
        assert!(v.contains(&"update"));
        assert!(v.contains(&"check_update"));
        assert!(v.contains(&"reset"));
    }

    #[test]
    fn plex_reclaim_hidden_for_root_user() {
        let spec = &SERVICES[1];
        let status = ServiceStatus {
            installed: true,
            running: true,
            browser_root_exists: true,
            ..Default::default()
        };

        let cfg = ConfigFile::empty("plexmediaserver");
        let v = verbs(&available_actions(spec, &status, &cfg));
        assert!(!v.contains(&"reclaim"));

        let mut cfg = ConfigFile::empty("plexmediaserver");
        cfg.set("main", "plexmediaserver", "run_user", "1000");
        let v = verbs(&available_actions(spec, &status, &cfg));
        assert!(v.contains(&"reclaim"));
    }
}
