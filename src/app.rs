// The central application controller and event loop.

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode};
use ratatui::{Terminal, backend::Backend, widgets::ListState};
use std::thread;
use std::time::{Duration, Instant};

pub mod config;
pub mod control;
pub mod forms;
pub mod model;
pub mod probe;
pub mod services;
pub mod shell;
pub mod ui;

use config::{ConfigFile, ConfigStore};
use control::AfterDispatch;
use forms::{FieldSpec, SideEffect, Widget};
use model::{Notification, ServiceId, ServiceStatus};
use services::{Action, ActionKind, SERVICES, ServiceSpec, available_actions};
use shell::CommandRunner;

/// Status poll interval, matching the 5 second poll of the original
/// panels.
const TICK_RATE: Duration = Duration::from_secs(5);

/// One editable line of a panel: a field spec bound to its current
/// value. Network rows carry the ordinal of their config section.
struct Row {
    spec: &'static FieldSpec,
    network: Option<usize>,
    value: String,
    dirty: bool,
    error: Option<String>,
}

struct Panel {
    spec: &'static ServiceSpec,
    cfg: ConfigFile,
    status: ServiceStatus,
    rows: Vec<Row>,
    list_state: ListState,
    logs: Vec<String>,
    log_scroll: u16,
    stick_to_bottom: bool,
}

impl Panel {
    fn new(spec: &'static ServiceSpec, cfg: ConfigFile) -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));
        let mut panel = Self {
            spec,
            cfg,
            status: ServiceStatus::default(),
            rows: Vec::new(),
            list_state,
            logs: Vec::new(),
            log_scroll: 0,
            stick_to_bottom: true,
        };
        panel.rebuild_rows();
        panel
    }

    fn rebuild_rows(&mut self) {
        let mut rows = Vec::new();
        for spec in self.spec.fields {
            let value = self
                .cfg
                .get(self.spec.section, spec.key)
                .unwrap_or(spec.default)
                .to_string();
            rows.push(Row {
                spec,
                network: None,
                value,
                dirty: false,
                error: None,
            });
        }
        if !self.spec.network_type.is_empty() {
            for (ordinal, idx) in self
                .cfg
                .typed_sections(self.spec.network_type)
                .into_iter()
                .enumerate()
            {
                for spec in self.spec.network_fields {
                    let value = self.cfg.sections[idx]
                        .get(spec.key)
                        .unwrap_or(spec.default)
                        .to_string();
                    rows.push(Row {
                        spec,
                        network: Some(ordinal),
                        value,
                        dirty: false,
                        error: None,
                    });
                }
            }
        }
        rows.shrink_to_fit();
        self.rows = rows;
        if let Some(selected) = self.list_state.selected() {
            if selected >= self.rows.len() {
                self.list_state
                    .select(Some(self.rows.len().saturating_sub(1)));
            }
        }
    }

    /// Copy the edited row values into the in-memory config. Empty
    /// optional values drop the option (rmempty).
    fn sync_rows_into_cfg(&mut self) {
        let section = self.spec.section;
        let sec_type = self.spec.section_type;
        let net_indices = if self.spec.network_type.is_empty() {
            Vec::new()
        } else {
            self.cfg.typed_sections(self.spec.network_type)
        };
        for row in &self.rows {
            match row.network {
                None => self.cfg.set(section, sec_type, row.spec.key, &row.value),
                Some(ordinal) => {
                    if let Some(&idx) = net_indices.get(ordinal) {
                        if row.value.is_empty() {
                            self.cfg.sections[idx].remove(row.spec.key);
                        } else {
                            self.cfg.sections[idx].set(row.spec.key, &row.value);
                        }
                    }
                }
            }
        }
    }

    fn selected_row(&self) -> Option<&Row> {
        self.list_state.selected().and_then(|i| self.rows.get(i))
    }

    /// Configured owner as "uid:gid" with the same 0 defaults the init
    /// script applies.
    fn configured_owner(&self) -> String {
        let user = self.cfg.get(self.spec.section, "run_user").unwrap_or("0");
        let group = self.cfg.get(self.spec.section, "run_group").unwrap_or("0");
        format!("{}:{}", user, group)
    }
}

enum Mode {
    Normal,
    Edit { buffer: String },
    Menu { actions: Vec<Action>, state: ListState },
    Confirm { action: Action },
    Logs,
    Output { title: String, text: String },
    Busy { message: String },
}

pub struct App {
    runner: Box<dyn CommandRunner>,
    store: ConfigStore,
    panels: Vec<Panel>,
    tab: usize,
    mode: Mode,
    notification: Option<Notification>,
    should_quit: bool,
}

impl App {
    pub fn new(runner: Box<dyn CommandRunner>, store: ConfigStore) -> Result<Self> {
        let mut panels = Vec::with_capacity(SERVICES.len());
        for spec in &SERVICES {
            let cfg = store.load(spec.config_name)?;
            panels.push(Panel::new(spec, cfg));
        }
        let mut app = Self {
            runner,
            store,
            panels,
            tab: 0,
            mode: Mode::Normal,
            notification: None,
            should_quit: false,
        };
        app.refresh_all();
        Ok(app)
    }

    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> Result<()> {
        let mut last_tick = Instant::now();

        loop {
            terminal.draw(|f| ui::render(f, self))?;

            let timeout = TICK_RATE
                .checked_sub(last_tick.elapsed())
                .unwrap_or_default();

            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    self.handle_key(key.code, terminal)?;
                }
            }

            if last_tick.elapsed() >= TICK_RATE {
                self.on_tick();
                last_tick = Instant::now();
            }

            if self.should_quit {
                return Ok(());
            }
        }
    }

    fn current(&mut self) -> &mut Panel {
        &mut self.panels[self.tab]
    }

    /// Probe every panel concurrently and join before rendering. Used
    /// once at startup; ticks only refresh the visible panel.
    fn refresh_all(&mut self) {
        let runner = self.runner.as_ref();
        let statuses: Vec<ServiceStatus> = thread::scope(|s| {
            let handles: Vec<_> = self
                .panels
                .iter()
                .map(|panel| {
                    let cfg = &panel.cfg;
                    let provider = panel.spec.provider;
                    s.spawn(move || provider.probe(runner, cfg))
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap_or_default())
                .collect()
        });
        for (panel, status) in self.panels.iter_mut().zip(statuses) {
            panel.status = status;
        }
    }

    fn refresh_current(&mut self) {
        let runner = self.runner.as_ref();
        let panel = &self.panels[self.tab];
        let status = panel.spec.provider.probe(runner, &panel.cfg);
        self.panels[self.tab].status = status;
    }

    fn refresh_logs(&mut self) {
        let runner = self.runner.as_ref();
        let tag = self.panels[self.tab].spec.log_tag;
        let logs = match runner.run("/sbin/logread", &["-e", tag, "-l", "100"]) {
            Ok(out) if out.success() => out.stdout.lines().map(str::to_string).collect(),
            _ => Vec::new(),
        };
        if !logs.is_empty() {
            self.panels[self.tab].logs = logs;
        }
    }

    /// Re-read the config from disk and re-probe: the page-reload
    /// analog after a disruptive action.
    fn reload_current(&mut self) -> Result<()> {
        let panel = &mut self.panels[self.tab];
        panel.cfg = self.store.load(panel.spec.config_name)?;
        panel.rebuild_rows();
        self.refresh_current();
        Ok(())
    }

    fn on_tick(&mut self) {
        match self.mode {
            // A modal command owns the terminal; skip the poll.
            Mode::Busy { .. } => {}
            Mode::Logs => {
                self.refresh_current();
                self.refresh_logs();
            }
            _ => self.refresh_current(),
        }
    }

    fn handle_key<B: Backend>(
        &mut self,
        code: KeyCode,
        terminal: &mut Terminal<B>,
    ) -> Result<()> {
        self.notification = None;

        match std::mem::replace(&mut self.mode, Mode::Normal) {
            Mode::Normal => self.handle_normal_key(code),
            Mode::Edit { buffer } => self.handle_edit_key(code, buffer),
            Mode::Menu { actions, state } => {
                self.handle_menu_key(code, actions, state, terminal)?
            }
            Mode::Confirm { action } => match code {
                KeyCode::Char('y') | KeyCode::Enter => self.run_action(terminal, action)?,
                _ => {}
            },
            Mode::Logs => self.handle_logs_key(code),
            Mode::Output { .. } => {}
            Mode::Busy { message } => {
                // Shouldn't receive keys here; stay busy.
                self.mode = Mode::Busy { message };
            }
        }
        Ok(())
    }

    fn handle_normal_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Tab => {
                self.tab = (self.tab + 1) % self.panels.len();
                self.refresh_current();
            }
            KeyCode::BackTab => {
                self.tab = (self.tab + self.panels.len() - 1) % self.panels.len();
                self.refresh_current();
            }
            KeyCode::Char('j') | KeyCode::Down => self.next_row(),
            KeyCode::Char('k') | KeyCode::Up => self.previous_row(),
            KeyCode::Enter => self.activate_row(),
            KeyCode::Char('w') => self.save_current(),
            KeyCode::Char('a') => self.open_menu(),
            KeyCode::Char('l') => {
                self.refresh_logs();
                self.mode = Mode::Logs;
            }
            KeyCode::Char('R') => {
                self.refresh_current();
                self.refresh_logs();
            }
            KeyCode::Char('n') => self.add_network(),
            KeyCode::Char('d') => self.remove_network(),
            _ => {}
        }
    }

    fn next_row(&mut self) {
        let panel = self.current();
        let len = panel.rows.len();
        let i = match panel.list_state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        panel.list_state.select(Some(i));
    }

    fn previous_row(&mut self) {
        let panel = self.current();
        let len = panel.rows.len();
        let i = match panel.list_state.selected() {
            Some(0) | None => len.saturating_sub(1),
            Some(i) => i - 1,
        };
        panel.list_state.select(Some(i));
    }

    fn activate_row(&mut self) {
        let panel = self.current();
        let Some(i) = panel.list_state.selected() else {
            return;
        };
        let Some(row) = panel.rows.get_mut(i) else {
            return;
        };
        match row.spec.widget {
            Widget::Flag => {
                row.value = if row.value == "1" { "0" } else { "1" }.to_string();
                row.dirty = true;
                row.error = None;
            }
            Widget::Select(options) => {
                let next = options
                    .iter()
                    .position(|&o| o == row.value)
                    .map(|p| (p + 1) % options.len())
                    .unwrap_or(0);
                row.value = options[next].to_string();
                row.dirty = true;
                row.error = None;
            }
            Widget::Text | Widget::Password => {
                let buffer = row.value.clone();
                self.mode = Mode::Edit { buffer };
            }
        }
    }

    fn handle_edit_key(&mut self, code: KeyCode, mut buffer: String) {
        match code {
            KeyCode::Esc => {}
            KeyCode::Enter => self.commit_edit(buffer),
            KeyCode::Backspace => {
                buffer.pop();
                self.mode = Mode::Edit { buffer };
            }
            KeyCode::Char(c) => {
                buffer.push(c);
                self.mode = Mode::Edit { buffer };
            }
            _ => self.mode = Mode::Edit { buffer },
        }
    }

    fn commit_edit(&mut self, value: String) {
        let is_plex = self.panels[self.tab].spec.id == ServiceId::Plex;
        let panel = self.current();
        let Some(i) = panel.list_state.selected() else {
            return;
        };
        let Some(row) = panel.rows.get_mut(i) else {
            return;
        };
        row.error = forms::check(row.spec, &value).err();
        let key = row.spec.key;
        row.value = value.clone();
        row.dirty = true;

        // Browser root auto-fills the dependent paths left empty.
        if is_plex && key == "browser_root" && !value.is_empty() {
            for (path_key, path_value) in forms::plex_path_defaults(&value) {
                if let Some(target) = panel
                    .rows
                    .iter_mut()
                    .find(|r| r.spec.key == path_key && r.value.is_empty())
                {
                    target.value = path_value;
                    target.dirty = true;
                }
            }
        }
    }

    fn open_menu(&mut self) {
        let panel = &self.panels[self.tab];
        let actions = available_actions(panel.spec, &panel.status, &panel.cfg);
        if actions.is_empty() {
            self.notification = Some(Notification::info("No actions available."));
            return;
        }
        let mut state = ListState::default();
        state.select(Some(0));
        self.mode = Mode::Menu { actions, state };
    }

    fn handle_menu_key<B: Backend>(
        &mut self,
        code: KeyCode,
        actions: Vec<Action>,
        mut state: ListState,
        terminal: &mut Terminal<B>,
    ) -> Result<()> {
        match code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('a') => {}
            KeyCode::Char('j') | KeyCode::Down => {
                let i = match state.selected() {
                    Some(i) if i + 1 < actions.len() => i + 1,
                    _ => 0,
                };
                state.select(Some(i));
                self.mode = Mode::Menu { actions, state };
            }
            KeyCode::Char('k') | KeyCode::Up => {
                let i = match state.selected() {
                    Some(0) | None => actions.len().saturating_sub(1),
                    Some(i) => i - 1,
                };
                state.select(Some(i));
                self.mode = Mode::Menu { actions, state };
            }
            KeyCode::Enter => {
                if let Some(action) = state.selected().and_then(|i| actions.get(i)).copied() {
                    if action.confirm.is_some() {
                        self.mode = Mode::Confirm { action };
                    } else {
                        self.run_action(terminal, action)?;
                    }
                }
            }
            _ => self.mode = Mode::Menu { actions, state },
        }
        Ok(())
    }

    fn handle_logs_key(&mut self, code: KeyCode) {
        let panel = &mut self.panels[self.tab];
        match code {
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('l') => return,
            KeyCode::Char('j') | KeyCode::Down => {
                panel.stick_to_bottom = false;
                panel.log_scroll = panel.log_scroll.saturating_add(1);
            }
            KeyCode::Char('k') | KeyCode::Up => {
                panel.stick_to_bottom = false;
                panel.log_scroll = panel.log_scroll.saturating_sub(1);
            }
            KeyCode::Char('G') => panel.stick_to_bottom = true,
            _ => {}
        }
        self.mode = Mode::Logs;
    }

    fn add_network(&mut self) {
        let panel = self.current();
        if panel.spec.network_type.is_empty() {
            return;
        }
        panel.sync_rows_into_cfg();
        let net_type = panel.spec.network_type;
        panel.cfg.add_typed_section(net_type);
        panel.rebuild_rows();
        self.notification = Some(Notification::info(
            "Network added. Save to persist it.",
        ));
    }

    fn remove_network(&mut self) {
        let panel = self.current();
        if panel.spec.network_type.is_empty() {
            return;
        }
        let Some(ordinal) = panel.selected_row().and_then(|r| r.network) else {
            return;
        };
        panel.sync_rows_into_cfg();
        let net_type = panel.spec.network_type;
        if let Some(&idx) = panel.cfg.typed_sections(net_type).get(ordinal) {
            panel.cfg.remove_section(idx);
        }
        panel.rebuild_rows();
        self.notification = Some(Notification::info(
            "Network removed. Save to persist it.",
        ));
    }

    /// Validate every field, persist the file, then chain the external
    /// commands owed by the changed fields. Any invalid field blocks
    /// the whole save.
    fn save_current(&mut self) {
        let panel = &mut self.panels[self.tab];

        let mut invalid = false;
        for row in &mut panel.rows {
            match forms::check(row.spec, &row.value) {
                Ok(()) => row.error = None,
                Err(e) => {
                    row.error = Some(e);
                    invalid = true;
                }
            }
        }
        if invalid {
            self.notification = Some(Notification::error(
                "Validation failed, nothing was saved.",
            ));
            return;
        }

        let effects: Vec<(SideEffect, String)> = panel
            .rows
            .iter()
            .filter(|r| r.dirty)
            .filter_map(|r| r.spec.side_effect.map(|e| (e, r.value.clone())))
            .collect();
        let any_dirty = panel.rows.iter().any(|r| r.dirty);

        panel.sync_rows_into_cfg();
        let wan = panel
            .status
            .wan_device
            .clone()
            .unwrap_or_else(|| "eth0".to_string());
        let result = forms::save_and_chain(
            self.runner.as_ref(),
            &self.store,
            &panel.cfg,
            &effects,
            panel.spec.init_script,
            &wan,
        );

        if !result.persisted {
            self.notification = Some(Notification::error(format!(
                "Save failed: {}",
                result.error.unwrap_or_default()
            )));
            return;
        }

        for row in &mut panel.rows {
            row.dirty = false;
        }

        if let Some(e) = result.error {
            // Persisted but the chained command failed: the stored value
            // and the running state now diverge, say so.
            self.notification = Some(Notification::error(format!(
                "Saved, but applying the change failed: {}",
                e
            )));
        } else if let Some(verb) = panel.spec.save_chain.filter(|_| any_dirty) {
            let script = panel.spec.init_script;
            let outcome = control::dispatch(self.runner.as_ref(), script, verb);
            self.notification = Some(match outcome.after {
                Some(_) => Notification::info("Configuration saved, service restarted."),
                None => Notification::error(format!(
                    "Saved, but {} failed: {}",
                    verb, outcome.notice.text
                )),
            });
        } else {
            self.notification = Some(Notification::info("Configuration saved."));
        }

        self.refresh_current();
    }

    fn run_action<B: Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
        action: Action,
    ) -> Result<()> {
        self.mode = Mode::Busy {
            message: format!("Executing service action: {}...", action.verb),
        };
        terminal.draw(|f| ui::render(f, self))?;

        let script = self.panels[self.tab].spec.init_script;
        let runner = self.runner.as_ref();

        let outcome = match action.kind {
            ActionKind::Script => control::dispatch(runner, script, action.verb),
            ActionKind::Detached => control::dispatch_detached(runner, script, action.verb),
            ActionKind::Capture => {
                match control::dispatch_capture(runner, script, action.verb) {
                    Ok(text) => {
                        self.mode = Mode::Output {
                            title: "Update Check Result".to_string(),
                            text,
                        };
                        return Ok(());
                    }
                    Err(notice) => {
                        self.notification = Some(notice);
                        self.mode = Mode::Normal;
                        return Ok(());
                    }
                }
            }
        };

        self.notification = Some(outcome.notice);
        self.mode = Mode::Normal;
        match outcome.after {
            Some(AfterDispatch::Refresh) => self.reload_current()?,
            // Non-disruptive: the regular poll picks the state up.
            Some(AfterDispatch::ResumePoll) | None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::shell::FakeRunner;

    fn plex_tab() -> usize {
        SERVICES
            .iter()
            .position(|s| s.id == ServiceId::Plex)
            .unwrap()
    }

    #[test]
    fn enabled_toggle_divergence_is_observable_not_corrected() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());
        // Persisting works; the chained enable fails; the running probe
        // stays negative.
        let runner = FakeRunner::new().on(
            "/etc/init.d/plexmediaserver enable",
            1,
            "",
            "init hook missing\n",
        );

        let mut app = App::new(Box::new(runner), ConfigStore::new(dir.path())).unwrap();
        app.tab = plex_tab();

        let panel = app.current();
        let row = panel
            .rows
            .iter_mut()
            .find(|r| r.spec.key == "enabled")
            .unwrap();
        row.value = "1".to_string();
        row.dirty = true;

        app.save_current();

        let notice = app.notification.clone().unwrap();
        assert_eq!(notice.level, model::NoticeLevel::Error);
        assert!(notice.text.contains("init hook missing"));

        // The value stayed persisted while the service never came up.
        let back = store.load("plexmediaserver").unwrap();
        assert_eq!(back.get("main", "enabled"), Some("1"));
        assert!(!app.panels[app.tab].status.running);
    }

    #[test]
    fn invalid_field_blocks_the_entire_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path());

        let mut app = App::new(Box::new(FakeRunner::new()), ConfigStore::new(dir.path())).unwrap();
        app.tab = SERVICES
            .iter()
            .position(|s| s.id == ServiceId::ZeroTier)
            .unwrap();

        app.add_network();
        let panel = app.current();
        let id_row = panel
            .rows
            .iter_mut()
            .find(|r| r.network == Some(0) && r.spec.key == "id")
            .unwrap();
        id_row.value = "12345".to_string();
        id_row.dirty = true;
        let port_row = panel
            .rows
            .iter_mut()
            .find(|r| r.network.is_none() && r.spec.key == "port")
            .unwrap();
        port_row.value = "9993".to_string();
        port_row.dirty = true;

        app.save_current();

        let notice = app.notification.clone().unwrap();
        assert_eq!(notice.level, model::NoticeLevel::Error);

        // Nothing reached the store, not even the valid port.
        let back = store.load("zerotier").unwrap();
        assert_eq!(back.get("global", "port"), None);

        // With a valid ID the same save goes through.
        let panel = app.current();
        let id_row = panel
            .rows
            .iter_mut()
            .find(|r| r.network == Some(0) && r.spec.key == "id")
            .unwrap();
        id_row.value = "0123456789abcdef".to_string();
        app.save_current();

        let back = store.load("zerotier").unwrap();
        assert_eq!(back.get("global", "port"), Some("9993"));
        let nets = back.typed_sections("network");
        assert_eq!(nets.len(), 1);
        assert_eq!(back.sections[nets[0]].get("id"), Some("0123456789abcdef"));
    }

    #[test]
    fn browser_root_edit_autofills_empty_paths_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut app = App::new(Box::new(FakeRunner::new()), ConfigStore::new(dir.path())).unwrap();
        app.tab = plex_tab();

        {
            let panel = app.current();
            let lib = panel
                .rows
                .iter_mut()
                .find(|r| r.spec.key == "library_dir")
                .unwrap();
            lib.value = "/custom/Library".to_string();

            let idx = panel
                .rows
                .iter()
                .position(|r| r.spec.key == "browser_root")
                .unwrap();
            panel.list_state.select(Some(idx));
        }

        app.commit_edit("/mnt/sda1/".to_string());

        let panel = app.current();
        let by_key = |key: &str| {
            panel
                .rows
                .iter()
                .find(|r| r.spec.key == key)
                .unwrap()
                .value
                .clone()
        };
        assert_eq!(by_key("library_dir"), "/custom/Library");
        assert_eq!(
            by_key("application_support_dir"),
            "/mnt/sda1/.plex/Library/Application Support"
        );
        assert_eq!(
            by_key("compressed_archive_path"),
            "/mnt/sda1/.plex/Library/Application/plexmediaserver.sqfs"
        );
    }
}
