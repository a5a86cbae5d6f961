// Status probes: read-only OS queries answering "is it installed" and
// "is it running" for each service. Every probe fails closed: a spawn
// error, permission problem or missing binary reads as the negative
// answer, never as an error. Each service keeps the heuristic its init
// script contract exposes (marker file, mount table, pgrep, explicit
// subcommand); the inconsistency is inherited from the control plane.

use super::config::ConfigFile;
use super::model::ServiceStatus;
use super::shell::CommandRunner;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use std::thread;

pub trait StatusProvider: Sync {
    fn probe(&self, runner: &dyn CommandRunner, cfg: &ConfigFile) -> ServiceStatus;
}

fn inet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"inet\s+(\d+\.\d+\.\d+\.\d+)").unwrap())
}

fn auth_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(https://login\.tailscale\.com/a/[a-zA-Z0-9]+)").unwrap())
}

fn default_dev_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"dev\s+(\S+)").unwrap())
}

/// Exit code 0 means affirmative, anything else (including failure to
/// run at all) means no.
fn check_ok(runner: &dyn CommandRunner, program: &str, args: &[&str]) -> bool {
    matches!(runner.run(program, args), Ok(out) if out.success())
}

fn capture(runner: &dyn CommandRunner, program: &str, args: &[&str]) -> Option<String> {
    match runner.run(program, args) {
        Ok(out) if out.success() => Some(out.stdout),
        _ => None,
    }
}

// --- PairDrop: squashfs marker file + mount table ---

pub struct PairDropProbe;

pub const PAIRDROP_MARKER: &str = "/mnt/sda1/.webapps/pairdrop.sqfs";
const PAIRDROP_MOUNT: &str = "/www/pairdrop";

impl StatusProvider for PairDropProbe {
    fn probe(&self, runner: &dyn CommandRunner, _cfg: &ConfigFile) -> ServiceStatus {
        let (installed, running) = thread::scope(|s| {
            let installed = s.spawn(|| runner.file_exists(Path::new(PAIRDROP_MARKER)));
            let running = s.spawn(|| {
                capture(runner, "/bin/mount", &[])
                    .is_some_and(|out| out.contains(PAIRDROP_MOUNT))
            });
            (
                installed.join().unwrap_or(false),
                running.join().unwrap_or(false),
            )
        });
        ServiceStatus {
            installed,
            running,
            ..Default::default()
        }
    }
}

// --- Plex: pgrep + init-script subcommands + ownership stat ---

pub struct PlexProbe;

const PLEX_INIT: &str = "/etc/init.d/plexmediaserver";

impl StatusProvider for PlexProbe {
    fn probe(&self, runner: &dyn CommandRunner, cfg: &ConfigFile) -> ServiceStatus {
        let browser_root = cfg.get("main", "browser_root").unwrap_or("").to_string();

        let (running, installed, root_exists, owner, lan_ip) = thread::scope(|s| {
            let running =
                s.spawn(|| check_ok(runner, "/usr/bin/pgrep", &["-f", "Plex Media Server"]));
            let installed = s.spawn(|| check_ok(runner, PLEX_INIT, &["is_installed"]));
            let root_exists = s.spawn(|| check_ok(runner, PLEX_INIT, &["check_browser_root"]));
            let owner = s.spawn(|| {
                if browser_root.is_empty() {
                    return None;
                }
                capture(
                    runner,
                    "/usr/bin/stat",
                    &["-c", "%u:%g", browser_root.as_str()],
                )
                .map(|out| out.trim().to_string())
                .filter(|o| !o.is_empty())
            });
            let lan_ip = s.spawn(|| {
                capture(runner, "/sbin/ip", &["-4", "addr", "show", "br-lan"]).and_then(|out| {
                    inet_re()
                        .captures(&out)
                        .map(|c| c[1].to_string())
                })
            });
            (
                running.join().unwrap_or(false),
                installed.join().unwrap_or(false),
                root_exists.join().unwrap_or(false),
                owner.join().unwrap_or(None),
                lan_ip.join().unwrap_or(None),
            )
        });

        let lan_ip = lan_ip.unwrap_or_else(|| "192.168.1.1".to_string());

        ServiceStatus {
            installed,
            running,
            browser_root_exists: root_exists,
            observed_owner: owner,
            version: cfg
                .get("main", "version")
                .map(str::to_string)
                .filter(|v| !v.is_empty()),
            web_url: Some(format!("http://{}:32400/web", lan_ip)),
            ..Default::default()
        }
    }
}

// --- Tailscale: the binary's own status subcommand ---

pub struct TailscaleProbe;

const TAILSCALE_BIN: &str = "/usr/sbin/tailscale";

impl StatusProvider for TailscaleProbe {
    fn probe(&self, runner: &dyn CommandRunner, _cfg: &ConfigFile) -> ServiceStatus {
        let (installed, status, address, wan_device) = thread::scope(|s| {
            let installed = s.spawn(|| runner.file_exists(Path::new(TAILSCALE_BIN)));
            let status = s.spawn(|| capture(runner, TAILSCALE_BIN, &["status"]));
            let address = s.spawn(|| {
                capture(runner, TAILSCALE_BIN, &["ip", "-4"])
                    .map(|out| out.trim().to_string())
                    .filter(|a| !a.is_empty())
            });
            let wan_device = s.spawn(|| {
                capture(runner, "/sbin/ip", &["-4", "route", "show", "default"]).and_then(|out| {
                    default_dev_re()
                        .captures(&out)
                        .map(|c| c[1].to_string())
                })
            });
            (
                installed.join().unwrap_or(false),
                status.join().unwrap_or(None),
                address.join().unwrap_or(None),
                wan_device.join().unwrap_or(None),
            )
        });

        let running = status.is_some();
        let status_text = status
            .unwrap_or_else(|| "Tailscale is stopped or not installed.".to_string());
        let auth_url = auth_re()
            .captures(&status_text)
            .map(|c| c[1].to_string());

        ServiceStatus {
            installed,
            running,
            status_text: Some(status_text),
            address,
            auth_url,
            wan_device: Some(wan_device.unwrap_or_else(|| "eth0".to_string())),
            ..Default::default()
        }
    }
}

// --- ZeroTier: process grep ---

pub struct ZeroTierProbe;

const ZEROTIER_BIN: &str = "/usr/bin/zerotier-one";

impl StatusProvider for ZeroTierProbe {
    fn probe(&self, runner: &dyn CommandRunner, _cfg: &ConfigFile) -> ServiceStatus {
        let (installed, running) = thread::scope(|s| {
            let installed = s.spawn(|| runner.file_exists(Path::new(ZEROTIER_BIN)));
            let running = s.spawn(|| check_ok(runner, "/usr/bin/pgrep", &["-f", "zerotier-one"]));
            (
                installed.join().unwrap_or(false),
                running.join().unwrap_or(false),
            )
        });
        ServiceStatus {
            installed,
            running,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::shell::FakeRunner;

    #[test]
    fn pairdrop_not_installed_without_marker_file() {
        let runner = FakeRunner::new().on("/bin/mount", 0, "", "");
        let cfg = ConfigFile::empty("pairdrop");
        let status = PairDropProbe.probe(&runner, &cfg);
        assert!(!status.installed);
        assert!(!status.running);
    }

    #[test]
    fn pairdrop_running_when_mount_table_lists_it() {
        let mounts = "\
/dev/sda1 on /mnt/sda1 type ext4 (rw,relatime)
/mnt/sda1/.webapps/pairdrop.sqfs on /www/pairdrop type squashfs (ro,relatime)
";
        let runner = FakeRunner::new()
            .with_file(PAIRDROP_MARKER)
            .on("/bin/mount", 0, mounts, "");
        let cfg = ConfigFile::empty("pairdrop");
        let status = PairDropProbe.probe(&runner, &cfg);
        assert!(status.installed);
        assert!(status.running);
    }

    #[test]
    fn pairdrop_probe_failure_reads_as_stopped() {
        let runner = FakeRunner::new().broken("/bin/mount");
        let cfg = ConfigFile::empty("pairdrop");
        let status = PairDropProbe.probe(&runner, &cfg);
        assert!(!status.running);
    }

    #[test]
    fn plex_probe_combines_subcommands_and_stat() {
        let mut cfg = ConfigFile::empty("plexmediaserver");
        cfg.set("main", "plexmediaserver", "browser_root", "/mnt/sda1");
        cfg.set("main", "plexmediaserver", "version", "1.41.0");

        let runner = FakeRunner::new()
            .on("/usr/bin/pgrep -f Plex Media Server", 0, "1234\n", "")
            .on("/etc/init.d/plexmediaserver is_installed", 0, "", "")
            .on("/etc/init.d/plexmediaserver check_browser_root", 0, "", "")
            .on("/usr/bin/stat -c %u:%g /mnt/sda1", 0, "1000:1000\n", "")
            .on(
                "/sbin/ip -4 addr show br-lan",
                0,
                "    inet 192.168.2.1/24 brd 192.168.2.255 scope global br-lan\n",
                "",
            );

        let status = PlexProbe.probe(&runner, &cfg);
        assert!(status.installed);
        assert!(status.running);
        assert!(status.browser_root_exists);
        assert_eq!(status.observed_owner.as_deref(), Some("1000:1000"));
        assert_eq!(status.version.as_deref(), Some("1.41.0"));
        assert_eq!(
            status.web_url.as_deref(),
            Some("http://192.168.2.1:32400/web")
        );
    }

    #[test]
    fn plex_lan_ip_falls_back_when_interface_query_fails() {
        let cfg = ConfigFile::empty("plexmediaserver");
        let runner = FakeRunner::new();
        let status = PlexProbe.probe(&runner, &cfg);
        assert!(!status.installed);
        assert_eq!(
            status.web_url.as_deref(),
            Some("http://192.168.1.1:32400/web")
        );
    }

    #[test]
    fn tailscale_extracts_auth_url_and_wan_device() {
        let status_out = "\
Logged out.
To authenticate, visit: https://login.tailscale.com/a/abc123DEF
";
        let runner = FakeRunner::new()
            .with_file(TAILSCALE_BIN)
            .on("/usr/sbin/tailscale status", 0, status_out, "")
            .on("/usr/sbin/tailscale ip -4", 0, "100.64.0.3\n", "")
            .on(
                "/sbin/ip -4 route show default",
                0,
                "default via 10.0.0.1 dev wan0 proto static\n",
                "",
            );
        let cfg = ConfigFile::empty("tailscale");
        let status = TailscaleProbe.probe(&runner, &cfg);
        assert!(status.running);
        assert_eq!(
            status.auth_url.as_deref(),
            Some("https://login.tailscale.com/a/abc123DEF")
        );
        assert_eq!(status.address.as_deref(), Some("100.64.0.3"));
        assert_eq!(status.wan_device.as_deref(), Some("wan0"));
    }

    #[test]
    fn tailscale_stopped_shows_placeholder_text() {
        let runner = FakeRunner::new();
        let cfg = ConfigFile::empty("tailscale");
        let status = TailscaleProbe.probe(&runner, &cfg);
        assert!(!status.running);
        assert_eq!(
            status.status_text.as_deref(),
            Some("Tailscale is stopped or not installed.")
        );
        assert_eq!(status.wan_device.as_deref(), Some("eth0"));
    }
}
