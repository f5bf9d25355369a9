use std::sync::Arc;

use super::sampler::ProcessView;
use crate::service::ManagedProcess;

/// Folds every sampled process's rss and major faults into its
/// attribution root, so a service's totals cover all its descendants.
///
/// Only root entries are ever written and the walk follows ppid links,
/// which are never touched, so mutating totals mid-iteration is safe.
pub fn attribute_to_roots(view: &mut ProcessView, own_pid: i32) {
    let pids: Vec<i32> = view.keys().copied().collect();
    for pid in pids {
        let root = attribution_root(view, pid, own_pid);
        if root == pid {
            continue;
        }
        let Some(&sample) = view.get(&pid) else {
            continue;
        };
        if let Some(entry) = view.get_mut(&root) {
            entry.rss += sample.rss;
            entry.majflt += sample.majflt;
        }
    }
}

/// Walks ppid links upward until reaching a root: a node with pid or ppid
/// zero, a node whose parent is the supervisor itself, or a node whose
/// parent was not observed this cycle. Iterative, with a step limit so a
/// malformed cyclic view cannot hang the cycle.
fn attribution_root(view: &ProcessView, pid: i32, own_pid: i32) -> i32 {
    let mut mother = pid;
    let mut steps = view.len();
    while steps > 0 {
        let Some(process) = view.get(&mother) else {
            break;
        };
        if process.pid == 0
            || process.ppid == 0
            || process.ppid == own_pid
            || !view.contains_key(&process.ppid)
        {
            break;
        }
        mother = process.ppid;
        steps -= 1;
    }
    mother
}

/// Pushes this cycle's totals into the managed processes. A pid absent
/// from the view was not observed this cycle and reads as zero.
pub fn write_back(view: &ProcessView, managed: &[Arc<ManagedProcess>]) {
    for process in managed {
        match view.get(&process.pid()) {
            Some(entry) => {
                process.set_current_rss(entry.rss);
                process.set_page_faults(entry.majflt);
            }
            None => {
                process.set_current_rss(0);
                process.set_page_faults(0);
            }
        }
    }
}
