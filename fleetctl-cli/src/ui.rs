//! Unified UI helpers for the fleetctl CLI
//!
//! Progress spinners are suppressed when:
//! - `--quiet` flag is passed
//! - `FLEETCTL_QUIET=1` environment variable is set
//! - stderr is not a TTY (piped output)
//!
//! so the output stays clean for scripts and other tools.

use std::io::IsTerminal;
use std::sync::OnceLock;
use std::time::Duration;

use console::{style, StyledObject};
use indicatif::{ProgressBar, ProgressStyle};

use fleetctl_core::InstanceState;

/// Global quiet mode state
static QUIET_MODE: OnceLock<bool> = OnceLock::new();

/// Initialize quiet mode from the flag, environment, and TTY status.
/// Call once at startup.
pub fn init_quiet_mode(quiet_flag: bool) {
    let is_quiet = quiet_flag
        || std::env::var("FLEETCTL_QUIET").map(|v| v == "1").unwrap_or(false)
        || !std::io::stderr().is_terminal();

    QUIET_MODE.set(is_quiet).ok();
}

/// Check if we're in quiet mode
pub fn is_quiet() -> bool {
    *QUIET_MODE.get().unwrap_or(&false)
}

/// Create a spinner that respects quiet mode
pub fn spinner(msg: impl Into<String>) -> Option<ProgressBar> {
    if is_quiet() {
        return None;
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner:.cyan} {msg}")
            .expect("valid template"),
    );
    pb.set_message(msg.into());
    pb.enable_steady_tick(Duration::from_millis(80));
    Some(pb)
}

/// Finish a spinner with a success message
pub fn finish_success(pb: Option<ProgressBar>, msg: impl Into<String>) {
    if let Some(pb) = pb {
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{msg}")
                .expect("valid template"),
        );
        pb.finish_with_message(format!("✓ {}", msg.into()));
    }
}

/// Finish a spinner with an error message
pub fn finish_error(pb: Option<ProgressBar>, msg: impl Into<String>) {
    if let Some(pb) = pb {
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{msg}")
                .expect("valid template"),
        );
        pb.finish_with_message(format!("✗ {}", msg.into()));
    }
}

/// Instance state colored the way operators expect: green when usable,
/// yellow in transition, red when gone
pub fn paint_state(state: InstanceState) -> StyledObject<&'static str> {
    let name = state.as_str();
    match state {
        InstanceState::Running => style(name).green(),
        InstanceState::Pending | InstanceState::Stopping | InstanceState::ShuttingDown => {
            style(name).yellow()
        }
        InstanceState::Stopped | InstanceState::Terminated => style(name).red(),
    }
}

/// One line describing a cluster member
pub fn member_line(instance: &fleetctl_core::Instance) -> String {
    format!(
        "{}  {}  {}",
        instance.display_name(),
        instance.public_dns.as_deref().unwrap_or("-"),
        paint_state(instance.state)
    )
}
