//! OS action dispatch
//!
//! Executes one resolved command against the desktop: launching and killing
//! processes, volume, brightness, power state, clipboard. Every effect is
//! best-effort and reported as an `Outcome`; nothing in here can take the
//! listener down.

use crate::config::DispatchConfig;
use crate::resolver::ResolvedCommand;
use crate::vocabulary::{ActionKind, Vocabulary};
use anyhow::{anyhow, Context, Result};
use enigo::{Direction, Enigo, Key, Keyboard, Settings};
use std::collections::BTreeSet;
use std::process::{Child, Command, Stdio};

/// Result of dispatching one command. The message is what the user sees
/// in the notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(String),
    Failure(String),
}

/// Execute a resolved command. Never panics and never returns an error;
/// every failure is folded into the outcome.
pub fn dispatch(cmd: &ResolvedCommand, vocab: &Vocabulary, cfg: &DispatchConfig) -> Outcome {
    tracing::info!(
        "Dispatching '{}' ({:?}, confidence {:.2})",
        cmd.name,
        cmd.action,
        cmd.confidence
    );

    let result = match cmd.action {
        ActionKind::LaunchApp => launch_app(cmd),
        ActionKind::CloseApp => close_app(cmd),
        ActionKind::CloseAll => close_all(vocab),
        ActionKind::VolumeUp => adjust_volume(amount(cmd, cfg.volume_step) as i32),
        ActionKind::VolumeDown => adjust_volume(-(amount(cmd, cfg.volume_step) as i32)),
        ActionKind::BrightnessUp => adjust_brightness(amount(cmd, cfg.brightness_step) as i32),
        ActionKind::BrightnessDown => {
            adjust_brightness(-(amount(cmd, cfg.brightness_step) as i32))
        }
        ActionKind::Shutdown => power(&["systemctl", "poweroff"], "Shutting down."),
        ActionKind::Restart => power(&["systemctl", "reboot"], "Restarting."),
        ActionKind::Sleep => power(&["systemctl", "suspend"], "Suspending."),
        ActionKind::Logout => logout(cfg),
        ActionKind::ClipboardCopy => send_shortcut('c').map(|_| "Copied.".to_string()),
        ActionKind::ClipboardPaste => send_shortcut('v').map(|_| "Pasted.".to_string()),
        ActionKind::ClipboardRead => read_clipboard(),
        ActionKind::StopListening => Ok("Stopping listener.".to_string()),
    };

    match result {
        Ok(message) => Outcome::Success(message),
        Err(e) => {
            tracing::warn!("Dispatch of '{}' failed: {:#}", cmd.name, e);
            Outcome::Failure(format!("{:#}", e))
        }
    }
}

/// Step amount for volume and brightness, clamped to a sane percentage
fn amount(cmd: &ResolvedCommand, default: u8) -> u8 {
    cmd.amount.unwrap_or(default).clamp(1, 100)
}

fn launch_app(cmd: &ResolvedCommand) -> Result<String> {
    spawn_detached(&cmd.payload)
        .with_context(|| format!("Could not launch {}", cmd.name))?;
    Ok(format!("Opening {}.", cmd.name))
}

fn close_app(cmd: &ResolvedCommand) -> Result<String> {
    let token = process_token(&cmd.payload)
        .ok_or_else(|| anyhow!("No executable configured for {}", cmd.name))?;

    if run_silent(&["pkill", "-f", token]).is_ok() {
        Ok(format!("Closed {}.", cmd.name))
    } else {
        Err(anyhow!("{} does not seem to be running", cmd.name))
    }
}

/// Kill every distinct executable in the vocabulary's app entries
fn close_all(vocab: &Vocabulary) -> Result<String> {
    let tokens: BTreeSet<&str> = vocab
        .entries()
        .iter()
        .filter(|e| e.action == ActionKind::LaunchApp)
        .filter_map(|e| process_token(&e.payload))
        .collect();

    let mut closed = 0usize;
    for token in tokens {
        if run_silent(&["pkill", "-f", token]).is_ok() {
            closed += 1;
        }
    }
    Ok(format!("Closed {} applications.", closed))
}

fn adjust_volume(delta: i32) -> Result<String> {
    let op = if delta >= 0 {
        format!("+{}%", delta)
    } else {
        format!("-{}%", -delta)
    };
    run_silent(&["pactl", "set-sink-volume", "@DEFAULT_SINK@", &op])
        .context("Volume control failed (is pactl installed?)")?;
    Ok(format!("Volume {}.", op))
}

/// xbacklight where it works, brightnessctl as the fallback
fn adjust_brightness(delta: i32) -> Result<String> {
    let step = delta.unsigned_abs().to_string();

    let xbacklight_flag = if delta >= 0 { "-inc" } else { "-dec" };
    if run_silent(&["xbacklight", xbacklight_flag, &step]).is_ok() {
        return Ok(format!("Brightness {}{}%.", sign(delta), step));
    }

    let ctl_arg = if delta >= 0 {
        format!("{}%+", step)
    } else {
        format!("{}%-", step)
    };
    run_silent(&["brightnessctl", "set", &ctl_arg])
        .context("No supported brightness control found")?;
    Ok(format!("Brightness {}{}%.", sign(delta), step))
}

fn sign(delta: i32) -> &'static str {
    if delta >= 0 {
        "+"
    } else {
        "-"
    }
}

fn power(tokens: &[&str], message: &str) -> Result<String> {
    run_silent(tokens).context("Power command failed")?;
    Ok(message.to_string())
}

fn logout(cfg: &DispatchConfig) -> Result<String> {
    let command = cfg
        .logout_command
        .clone()
        .or_else(default_logout_command)
        .ok_or_else(|| anyhow!("No logout command configured for this desktop"))?;

    let tokens: Vec<&str> = command.split_whitespace().collect();
    run_silent(&tokens).context("Logout command failed")?;
    Ok("Logging out.".to_string())
}

/// Pick a logout command from the desktop environment, matching what the
/// session managers of common distros ship
fn default_logout_command() -> Option<String> {
    let desktop = std::env::var("XDG_CURRENT_DESKTOP")
        .or_else(|_| std::env::var("DESKTOP_SESSION"))
        .unwrap_or_default()
        .to_lowercase();

    logout_command_for(&desktop)
}

fn logout_command_for(desktop: &str) -> Option<String> {
    if desktop.contains("xfce") {
        Some("xfce4-session-logout --logout --fast".to_string())
    } else if desktop.contains("cinnamon") {
        Some("cinnamon-session-quit --logout --no-prompt".to_string())
    } else if desktop.contains("gnome") || desktop.contains("unity") {
        Some("gnome-session-quit --logout --no-prompt".to_string())
    } else {
        None
    }
}

/// Synthesise Ctrl+<key> into the focused window
fn send_shortcut(key: char) -> Result<()> {
    let mut enigo = Enigo::new(&Settings::default())
        .map_err(|e| anyhow!("Failed to initialise input synthesis: {}", e))?;

    enigo
        .key(Key::Control, Direction::Press)
        .map_err(|e| anyhow!("Failed to press Control: {}", e))?;
    let result = enigo
        .key(Key::Unicode(key), Direction::Click)
        .map_err(|e| anyhow!("Failed to send key: {}", e));
    // Always release the modifier, even when the click failed
    let _ = enigo.key(Key::Control, Direction::Release);
    result?;
    Ok(())
}

fn read_clipboard() -> Result<String> {
    let mut clipboard =
        arboard::Clipboard::new().map_err(|e| anyhow!("Clipboard unavailable: {}", e))?;
    let text = clipboard
        .get_text()
        .map_err(|e| anyhow!("Clipboard is empty or not text: {}", e))?;

    let preview: String = text.chars().take(80).collect();
    if preview.len() < text.len() {
        Ok(format!("Clipboard: {}…", preview))
    } else {
        Ok(format!("Clipboard: {}", preview))
    }
}

/// First whitespace token of an app command line, used as the pkill target
fn process_token(payload: &str) -> Option<&str> {
    payload.split_whitespace().next()
}

/// Launch a command line without waiting for it
fn spawn_detached(command_line: &str) -> Result<()> {
    let mut tokens = command_line.split_whitespace();
    let program = tokens
        .next()
        .ok_or_else(|| anyhow!("Empty command line"))?;

    let child = Command::new(program)
        .args(tokens)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("Failed to start '{}'", program))?;
    reap(child);
    Ok(())
}

/// Wait on a detached child from a background thread. Without the wait an
/// exited child stays a zombie for the life of the listener.
pub(crate) fn reap(mut child: Child) {
    std::thread::spawn(move || {
        let _ = child.wait();
    });
}

/// Run a command to completion, discarding output; Ok only on exit code 0
fn run_silent(tokens: &[&str]) -> Result<()> {
    let (program, args) = tokens
        .split_first()
        .ok_or_else(|| anyhow!("Empty command"))?;

    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .with_context(|| format!("Failed to run '{}'", program))?;

    if status.success() {
        Ok(())
    } else {
        Err(anyhow!("'{}' exited with {}", program, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_process_token() {
        assert_eq!(process_token("firefox"), Some("firefox"));
        assert_eq!(
            process_token("flatpak run com.figma.Figma"),
            Some("flatpak")
        );
        assert_eq!(process_token("   "), None);
    }

    #[test]
    fn test_amount_clamps() {
        let cmd = ResolvedCommand {
            name: "volume up".to_string(),
            action: ActionKind::VolumeUp,
            payload: String::new(),
            confidence: 1.0,
            amount: None,
        };
        assert_eq!(amount(&cmd, 5), 5);

        let with_amount = ResolvedCommand {
            amount: Some(200),
            ..cmd.clone()
        };
        assert_eq!(amount(&with_amount, 5), 100);

        let zero = ResolvedCommand {
            amount: Some(0),
            ..cmd
        };
        assert_eq!(amount(&zero, 5), 1);
    }

    #[test]
    fn test_logout_command_detection() {
        assert!(logout_command_for("xfce").unwrap().contains("xfce4-session-logout"));
        assert!(logout_command_for("x-cinnamon").unwrap().contains("cinnamon-session-quit"));
        assert!(logout_command_for("ubuntu:gnome").unwrap().contains("gnome-session-quit"));
        assert_eq!(logout_command_for("sway"), None);
    }

    #[test]
    fn test_detached_children_do_not_linger_as_zombies() {
        let child = Command::new("true")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        let pid = child.id();
        reap(child);

        // Once waited on, the pid disappears from /proc; a zombie would
        // stay visible with state Z.
        let stat = format!("/proc/{}/stat", pid);
        for _ in 0..100 {
            if std::fs::read_to_string(&stat).is_err() {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
        }
        panic!("exited child was never reaped");
    }

    #[test]
    fn test_failed_command_is_an_outcome_not_a_panic() {
        let cmd = ResolvedCommand {
            name: "ghost".to_string(),
            action: ActionKind::LaunchApp,
            payload: "/nonexistent/definitely-not-a-binary".to_string(),
            confidence: 1.0,
            amount: None,
        };
        let vocab = crate::vocabulary::VocabularyStore::new(std::path::PathBuf::from(
            "/nonexistent/hark-test/apps.json",
        ))
        .snapshot();

        let outcome = dispatch(&cmd, &vocab, &DispatchConfig::default());
        assert!(matches!(outcome, Outcome::Failure(_)));
    }
}
