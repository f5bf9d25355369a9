use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;

use nix::unistd;

use crate::prelude::*;
use crate::service::ProcessRegistry;

pub mod executor;
pub mod rollup;
pub mod sampler;
pub mod selector;
pub mod thrash;

use self::thrash::ThrashWindow;

const CYCLE_SLEEP: Duration = Duration::from_secs(1);
/// Extra sleep after a failed cycle: ten seconds in total, so a transient
/// environment fault cannot turn into a kill storm.
const FAULT_BACKOFF: Duration = Duration::from_secs(9);
/// sysexits.h EX_SOFTWARE.
const EX_SOFTWARE: i32 = 70;

/// The chore-keeping supervisor of this node.
///
/// Once per second it snapshots `/proc`, rolls per-process usage up into
/// per-service totals, and watches the kernel vmstat counters for signs
/// of thrashing. The kernel has its own out-of-memory killer, but it
/// acts slowly and its choice of victim ignores everything operators
/// declared about their services; the keeper does the job itself, using
/// the declared typical and peak sizes and the per-service value.
///
/// When thrashing holds for eight consecutive seconds, one service is
/// killed and further kills are held off until sampling stabilizes
/// again.
pub struct ChoreKeeper<R> {
    registry: R,
    proc_root: PathBuf,
    vmstat_path: PathBuf,
    own_pid: i32,
    window: ThrashWindow,
}

impl<R: ProcessRegistry> ChoreKeeper<R> {
    /// A keeper watching the live `/proc`.
    pub fn new(registry: R) -> Self {
        Self::with_paths(registry, "/proc", "/proc/vmstat", unistd::getpid().as_raw())
    }

    /// A keeper against explicit paths and supervisor pid, so tests can
    /// point it at a synthetic process tree.
    pub fn with_paths(
        registry: R,
        proc_root: impl Into<PathBuf>,
        vmstat_path: impl Into<PathBuf>,
        own_pid: i32,
    ) -> Self {
        ChoreKeeper {
            registry,
            proc_root: proc_root.into(),
            vmstat_path: vmstat_path.into(),
            own_pid,
            window: ThrashWindow::new(),
        }
    }

    /// Whether the keeper can do its job on this system.
    pub fn valid(&self) -> bool {
        self.proc_root.join("1/stat").exists() && self.vmstat_path.exists()
    }

    /// Runs chores for the lifetime of the process.
    ///
    /// If the capability probe fails the keeper announces itself inert
    /// and sleeps forever; the surrounding service keeps running. An
    /// error escaping a cycle is logged and followed by a back-off, never
    /// a crash. The one exception is losing the process directory itself,
    /// which exits the process.
    pub fn start(mut self) {
        if !self.valid() {
            debug!("chorekeeper will not watch for RAM overload on this system");
            loop {
                thread::sleep(Duration::from_secs(31_415_926));
            }
        }

        loop {
            thread::sleep(CYCLE_SLEEP);
            if let Err(err) = self.cycle() {
                warn!("chore cycle failed, backing off: {err:#}");
                thread::sleep(FAULT_BACKOFF);
            }
        }
    }

    /// One pipeline advance: sample, aggregate, detect, select, execute.
    fn cycle(&mut self) -> Result<()> {
        let mut view = match sampler::scan_processes(&self.proc_root) {
            Ok(view) => view,
            Err(err) => {
                // The process directory itself is gone; every assumption
                // the keeper rests on is broken.
                error!("{err:#}");
                process::exit(EX_SOFTWARE);
            }
        };
        rollup::attribute_to_roots(&mut view, self.own_pid);
        let managed = self.registry.managed();
        rollup::write_back(&view, &managed);

        let sample = sampler::read_vmstat(&self.vmstat_path)?;
        self.window.push(thrash::momentary_verdict(&sample));

        if self.window.is_sustained() {
            if let Some(victim) = selector::select_victim(&managed) {
                executor::kill_service(&victim);
                // Survivors now page their working sets back in; that
                // burst of faults must not count as fresh thrashing.
                self.window.suppress();
            }
        }

        Ok(())
    }
}
