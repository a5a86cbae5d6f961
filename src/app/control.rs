// Translates user actions into init-script invocations and turns the
// result into a notification. Fire-and-forget: no retries, no rollback,
// no timeout on the child process.

use super::model::Notification;
use super::shell::CommandRunner;

/// What the panel should do after a successful dispatch. Most actions
/// warrant a full probe refresh (the page-reload analog); stopping a
/// service or reclaiming ownership only lets the regular poll pick the
/// new state up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterDispatch {
    Refresh,
    ResumePoll,
}

#[derive(Debug)]
pub struct DispatchOutcome {
    pub notice: Notification,
    pub after: Option<AfterDispatch>,
}

fn success_message(action: &str) -> &'static str {
    match action {
        "start" => "Service started.",
        "stop" => "Service stopped.",
        "restart" => "Service restarted.",
        "reclaim" => "Ownership reclaimed recursively.",
        "install" => "Installation finished.",
        "uninstall" => "Service uninstalled.",
        _ => "Command executed successfully.",
    }
}

fn is_disruptive(action: &str) -> bool {
    !matches!(action, "stop" | "reclaim")
}

/// Run `<script> <action>` to completion. Non-zero exit or a spawn
/// failure becomes an error notification carrying whatever the script
/// printed; `after` stays empty so the stale view is kept for the user
/// to inspect.
pub fn dispatch(runner: &dyn CommandRunner, script: &str, action: &str) -> DispatchOutcome {
    log::info!("dispatch: {} {}", script, action);
    match runner.run(script, &[action]) {
        Ok(out) if out.success() => DispatchOutcome {
            notice: Notification::info(success_message(action)),
            after: Some(if is_disruptive(action) {
                AfterDispatch::Refresh
            } else {
                AfterDispatch::ResumePoll
            }),
        },
        Ok(out) => {
            log::warn!("dispatch failed: {} {} -> {}", script, action, out.code);
            DispatchOutcome {
                notice: Notification::error(format!("Action failed: {}", out.failure_message())),
                after: None,
            }
        }
        Err(e) => {
            log::warn!("dispatch error: {} {}: {:#}", script, action, e);
            DispatchOutcome {
                notice: Notification::error(format!("Error: {}", e)),
                after: None,
            }
        }
    }
}

/// Run an action and hand its raw output back for display (the Plex
/// `check_update` report).
pub fn dispatch_capture(runner: &dyn CommandRunner, script: &str, action: &str) -> Result<String, Notification> {
    match runner.run(script, &[action]) {
        Ok(out) => {
            let text = if !out.stdout.trim().is_empty() {
                out.stdout
            } else if !out.stderr.trim().is_empty() {
                out.stderr
            } else {
                "No output returned.".to_string()
            };
            Ok(text)
        }
        Err(e) => Err(Notification::error(format!("Error: {}", e))),
    }
}

/// Kick off a long-running action in the background; the script keeps
/// running after the panel moves on.
pub fn dispatch_detached(runner: &dyn CommandRunner, script: &str, action: &str) -> DispatchOutcome {
    let line = format!("{} {} > /dev/null 2>&1 &", script, action);
    match runner.run_detached(&line) {
        Ok(()) => DispatchOutcome {
            notice: Notification::info("Update started in background. Please wait..."),
            after: Some(AfterDispatch::Refresh),
        },
        Err(e) => DispatchOutcome {
            notice: Notification::error(format!("Error: {}", e)),
            after: None,
        },
    }
}
