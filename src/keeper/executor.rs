use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::prelude::*;
use crate::service::ManagedProcess;

/// Kills the selected victim with SIGKILL. The node is already in a bad
/// state, so the service gets no chance at a graceful shutdown.
pub fn kill_service(victim: &ManagedProcess) {
    info!(
        "RAM overload: killing service {} (pid {}, rss {} pages)",
        victim.spec().name(),
        victim.pid(),
        victim.current_rss()
    );
    if let Err(err) = kill(Pid::from_raw(victim.pid()), Signal::SIGKILL) {
        // The victim may already be gone; the caller clears the thrash
        // window either way.
        warn!("failed to kill pid {}: {err}", victim.pid());
    }
}
