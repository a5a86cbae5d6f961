// Thin binding to the router's key-value config storage: one text file
// per service under /etc/config, UCI syntax. Values are read at panel
// load and written back verbatim on save; unknown options and sections
// are preserved.

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Section {
    pub sec_type: String,
    /// Named sections carry an identifier ("main", "global"); typed
    /// sections (ZeroTier networks) are anonymous.
    pub name: Option<String>,
    pub options: Vec<(String, String)>,
}

impl Section {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: &str, value: &str) {
        match self.options.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.options.push((key.to_string(), value.to_string())),
        }
    }

    pub fn remove(&mut self, key: &str) {
        self.options.retain(|(k, _)| k != key);
    }
}

#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub package: String,
    pub sections: Vec<Section>,
}

impl ConfigFile {
    pub fn empty(package: &str) -> Self {
        Self {
            package: package.to_string(),
            sections: Vec::new(),
        }
    }

    pub fn parse(package: &str, text: &str) -> Self {
        let mut sections: Vec<Section> = Vec::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut words = tokenize(line);
            if words.is_empty() {
                continue;
            }
            match words.remove(0).as_str() {
                "config" => {
                    let sec_type = words.first().cloned().unwrap_or_default();
                    let name = words.get(1).cloned();
                    sections.push(Section {
                        sec_type,
                        name,
                        options: Vec::new(),
                    });
                }
                "option" | "list" => {
                    if let (Some(section), 2) = (sections.last_mut(), words.len()) {
                        section
                            .options
                            .push((words[0].clone(), words[1].clone()));
                    }
                }
                _ => {}
            }
        }
        Self {
            package: package.to_string(),
            sections,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            out.push_str("config ");
            out.push_str(&section.sec_type);
            if let Some(name) = &section.name {
                out.push_str(" '");
                out.push_str(name);
                out.push('\'');
            }
            out.push('\n');
            for (key, value) in &section.options {
                out.push_str("\toption ");
                out.push_str(key);
                out.push_str(" '");
                out.push_str(&value.replace('\'', "'\\''"));
                out.push_str("'\n");
            }
            out.push('\n');
        }
        out
    }

    pub fn named_section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name.as_deref() == Some(name))
    }

    pub fn named_section_mut(&mut self, name: &str) -> Option<&mut Section> {
        self.sections
            .iter_mut()
            .find(|s| s.name.as_deref() == Some(name))
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.named_section(section).and_then(|s| s.get(key))
    }

    /// Set an option in a named section, creating the section when it
    /// does not exist yet. An empty value removes the option, matching
    /// the host framework's rmempty behavior for optional fields.
    pub fn set(&mut self, section: &str, sec_type: &str, key: &str, value: &str) {
        let idx = match self
            .sections
            .iter()
            .position(|s| s.name.as_deref() == Some(section))
        {
            Some(idx) => idx,
            None => {
                self.sections.push(Section {
                    sec_type: sec_type.to_string(),
                    name: Some(section.to_string()),
                    options: Vec::new(),
                });
                self.sections.len() - 1
            }
        };
        if value.is_empty() {
            self.sections[idx].remove(key);
        } else {
            self.sections[idx].set(key, value);
        }
    }

    pub fn typed_sections(&self, sec_type: &str) -> Vec<usize> {
        self.sections
            .iter()
            .enumerate()
            .filter(|(_, s)| s.sec_type == sec_type && s.name.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn add_typed_section(&mut self, sec_type: &str) -> usize {
        self.sections.push(Section {
            sec_type: sec_type.to_string(),
            name: None,
            options: Vec::new(),
        });
        self.sections.len() - 1
    }

    pub fn remove_section(&mut self, index: usize) {
        if index < self.sections.len() {
            self.sections.remove(index);
        }
    }
}

fn tokenize(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' if quoted => {
                // '\'' escape: closing quote, literal quote, reopening quote
                if chars.peek() == Some(&'\\') {
                    chars.next();
                    if chars.peek() == Some(&'\'') {
                        chars.next();
                        current.push('\'');
                        if chars.peek() == Some(&'\'') {
                            chars.next();
                        }
                        continue;
                    }
                    current.push('\\');
                    continue;
                }
                quoted = false;
                words.push(std::mem::take(&mut current));
            }
            '\'' => quoted = true,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Loads and saves per-service config files from a fixed directory.
pub struct ConfigStore {
    root: PathBuf,
}

impl ConfigStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, package: &str) -> PathBuf {
        self.root.join(package)
    }

    /// Missing files load as an empty config; the init scripts create
    /// them on first install.
    pub fn load(&self, package: &str) -> Result<ConfigFile> {
        let path = self.path(package);
        if !path.exists() {
            return Ok(ConfigFile::empty(package));
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(ConfigFile::parse(package, &text))
    }

    pub fn save(&self, config: &ConfigFile) -> Result<()> {
        let path = self.path(&config.package);
        fs::write(&path, config.render())
            .with_context(|| format!("Failed to write {}", path.display()))
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new("/etc/config")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ZEROTIER: &str = "\
config zerotier 'global'
\toption enabled '1'
\toption port '9993'

config network
\toption id '0123456789abcdef'
\toption allow_managed '1'

config network
\toption id 'fedcba9876543210'
";

    #[test]
    fn parses_named_and_typed_sections() {
        let cfg = ConfigFile::parse("zerotier", ZEROTIER);
        assert_eq!(cfg.get("global", "enabled"), Some("1"));
        assert_eq!(cfg.get("global", "port"), Some("9993"));

        let networks = cfg.typed_sections("network");
        assert_eq!(networks.len(), 2);
        assert_eq!(cfg.sections[networks[0]].get("id"), Some("0123456789abcdef"));
        assert_eq!(cfg.sections[networks[1]].get("allow_managed"), None);
    }

    #[test]
    fn set_creates_section_and_empty_removes() {
        let mut cfg = ConfigFile::empty("pairdrop");
        cfg.set("main", "pairdrop", "port", "3000");
        assert_eq!(cfg.get("main", "port"), Some("3000"));
        assert_eq!(cfg.named_section("main").unwrap().sec_type, "pairdrop");

        cfg.set("main", "pairdrop", "port", "");
        assert_eq!(cfg.get("main", "port"), None);
    }

    #[test]
    fn render_parse_preserves_values_with_quotes() {
        let mut cfg = ConfigFile::empty("tailscale");
        cfg.set("settings", "tailscale", "state_file", "/etc/tailscale/it's.state");
        let text = cfg.render();
        let back = ConfigFile::parse("tailscale", &text);
        assert_eq!(back.get("settings", "state_file"), Some("/etc/tailscale/it's.state"));
    }

    #[test]
    fn store_round_trip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());

        let missing = store.load("plexmediaserver").unwrap();
        assert!(missing.sections.is_empty());

        let mut cfg = ConfigFile::empty("plexmediaserver");
        cfg.set("main", "plexmediaserver", "run_user", "1000");
        cfg.set("main", "plexmediaserver", "browser_root", "/mnt/sda1");
        store.save(&cfg).unwrap();

        let back = store.load("plexmediaserver").unwrap();
        assert_eq!(back.get("main", "run_user"), Some("1000"));
        assert_eq!(back.get("main", "browser_root"), Some("/mnt/sda1"));
    }

    #[test]
    fn unknown_options_survive_a_round_trip() {
        let text = "config pairdrop 'main'\n\toption custom_flag 'keep-me'\n";
        let cfg = ConfigFile::parse("pairdrop", text);
        let rendered = cfg.render();
        let back = ConfigFile::parse("pairdrop", &rendered);
        assert_eq!(back.get("main", "custom_flag"), Some("keep-me"));
    }
}
