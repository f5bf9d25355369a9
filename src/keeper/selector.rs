use std::sync::Arc;

use crate::service::ManagedProcess;

/// Picks the service to kill, or None when nothing is managed.
///
/// Five policies run in strict priority order and the first one with an
/// answer wins. Ties within a policy go to the first candidate seen.
pub fn select_victim(managed: &[Arc<ManagedProcess>]) -> Option<Arc<ManagedProcess>> {
    furthest_over_peak(managed)
        .or_else(|| furthest_over_typical(managed))
        .or_else(|| thrashing_most(managed))
        .or_else(|| least_valuable(managed))
        .or_else(|| biggest(managed))
        .cloned()
}

/// The service furthest above its declared peak RSS. None if every
/// service is within its peak.
fn furthest_over_peak(managed: &[Arc<ManagedProcess>]) -> Option<&Arc<ManagedProcess>> {
    furthest_over(managed, |p| p.spec().expected_peak_memory())
}

/// The service furthest above its declared typical RSS. None if every
/// service is within its typical size.
fn furthest_over_typical(managed: &[Arc<ManagedProcess>]) -> Option<&Arc<ManagedProcess>> {
    furthest_over(managed, |p| p.spec().expected_typical_memory())
}

fn furthest_over(
    managed: &[Arc<ManagedProcess>],
    limit: impl Fn(&ManagedProcess) -> u64,
) -> Option<&Arc<ManagedProcess>> {
    let mut furthest: Option<(&Arc<ManagedProcess>, u64)> = None;
    for process in managed {
        let rss = process.current_rss();
        let declared = limit(process);
        if rss <= declared {
            continue;
        }
        let over = rss - declared;
        if furthest.map_or(true, |(_, best)| over > best) {
            furthest = Some((process, over));
        }
    }
    furthest.map(|(process, _)| process)
}

/// The service suffering strictly the most major page faults. None when
/// every service is equally served, including when all counts are zero.
fn thrashing_most(managed: &[Arc<ManagedProcess>]) -> Option<&Arc<ManagedProcess>> {
    let mut worst: Option<&Arc<ManagedProcess>> = None;
    let mut least: Option<&Arc<ManagedProcess>> = None;
    for process in managed {
        if worst.map_or(true, |w| process.recent_page_faults() > w.recent_page_faults()) {
            worst = Some(process);
        }
        if least.map_or(true, |l| process.recent_page_faults() < l.recent_page_faults()) {
            least = Some(process);
        }
    }
    let (worst, least) = (worst?, least?);
    if worst.recent_page_faults() == least.recent_page_faults() {
        return None;
    }
    Some(worst)
}

/// The service with the lowest declared value. None when all services
/// share the same value, since killing any of them would be arbitrary.
fn least_valuable(managed: &[Arc<ManagedProcess>]) -> Option<&Arc<ManagedProcess>> {
    let mut min: Option<&Arc<ManagedProcess>> = None;
    let mut max: Option<&Arc<ManagedProcess>> = None;
    for process in managed {
        if min.map_or(true, |m| process.spec().value() < m.spec().value()) {
            min = Some(process);
        }
        if max.map_or(true, |m| process.spec().value() > m.spec().value()) {
            max = Some(process);
        }
    }
    let (min, max) = (min?, max?);
    if min.spec().value() == max.spec().value() {
        return None;
    }
    Some(min)
}

/// The service with the biggest RSS. None only when nothing is managed.
fn biggest(managed: &[Arc<ManagedProcess>]) -> Option<&Arc<ManagedProcess>> {
    let mut biggest: Option<&Arc<ManagedProcess>> = None;
    for process in managed {
        if biggest.map_or(true, |b| process.current_rss() > b.current_rss()) {
            biggest = Some(process);
        }
    }
    biggest
}
