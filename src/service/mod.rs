use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Capacity declaration for one service, supplied by the cluster users as
/// JSON when the service is deployed.
///
/// Memory sizes are in pages. `value` is the operator-assigned priority;
/// larger means more important.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceSpec {
    name: String,
    expected_typical_memory: u64,
    expected_peak_memory: u64,
    value: i64,
}

impl ServiceSpec {
    pub fn new(
        name: impl Into<String>,
        expected_typical_memory: u64,
        expected_peak_memory: u64,
        value: i64,
    ) -> Self {
        ServiceSpec {
            name: name.into(),
            expected_typical_memory,
            expected_peak_memory,
            value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// How much RSS the service is expected to use in steady state, in pages.
    pub fn expected_typical_memory(&self) -> u64 {
        self.expected_typical_memory
    }

    /// How much RSS the service may use at worst, in pages.
    pub fn expected_peak_memory(&self) -> u64 {
        self.expected_peak_memory
    }

    pub fn value(&self) -> i64 {
        self.value
    }
}

/// A service process spawned and tracked by the surrounding supervisor.
///
/// The chore keeper updates `current_rss` and `recent_page_faults` once
/// per sampling cycle with the totals of the process and all its
/// descendants; everything else is read-only input. The counters are
/// atomics so the keeper can write through a shared handle, but all
/// writes happen from the keeper task.
#[derive(Debug)]
pub struct ManagedProcess {
    pid: i32,
    spec: ServiceSpec,
    current_rss: AtomicU64,
    recent_page_faults: AtomicU64,
}

impl ManagedProcess {
    pub fn new(pid: i32, spec: ServiceSpec) -> Self {
        ManagedProcess {
            pid,
            spec,
            current_rss: AtomicU64::new(0),
            recent_page_faults: AtomicU64::new(0),
        }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    /// RSS of the service and all its descendants, in pages, as of the
    /// last sampling cycle.
    pub fn current_rss(&self) -> u64 {
        self.current_rss.load(Ordering::Relaxed)
    }

    /// Major page faults of the service and all its descendants, as of
    /// the last sampling cycle.
    pub fn recent_page_faults(&self) -> u64 {
        self.recent_page_faults.load(Ordering::Relaxed)
    }

    pub fn set_current_rss(&self, pages: u64) {
        self.current_rss.store(pages, Ordering::Relaxed);
    }

    pub fn set_page_faults(&self, count: u64) {
        self.recent_page_faults.store(count, Ordering::Relaxed);
    }
}

/// The managed-process registry the chore keeper consults each cycle.
///
/// Passed to the keeper as an explicit collaborator so tests can hand it
/// a synthetic process table.
pub trait ProcessRegistry {
    /// A consistent snapshot of the currently managed processes.
    fn managed(&self) -> Vec<Arc<ManagedProcess>>;
}

impl<R: ProcessRegistry + ?Sized> ProcessRegistry for Arc<R> {
    fn managed(&self) -> Vec<Arc<ManagedProcess>> {
        (**self).managed()
    }
}

/// In-memory registry of the services this node runs.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    procs: Mutex<Vec<Arc<ManagedProcess>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        ServiceRegistry::default()
    }

    /// Takes a service under management and returns the shared handle.
    pub fn manage(&self, process: ManagedProcess) -> Arc<ManagedProcess> {
        let process = Arc::new(process);
        self.procs.lock().unwrap().push(Arc::clone(&process));
        process
    }

    pub fn find(&self, pid: i32) -> Option<Arc<ManagedProcess>> {
        self.procs
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.pid() == pid)
            .cloned()
    }

    /// Drops a service from management, typically after it has exited or
    /// been killed.
    pub fn forget(&self, pid: i32) {
        self.procs.lock().unwrap().retain(|p| p.pid() != pid);
    }
}

impl ProcessRegistry for ServiceRegistry {
    fn managed(&self) -> Vec<Arc<ManagedProcess>> {
        self.procs.lock().unwrap().clone()
    }
}
