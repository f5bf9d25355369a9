use super::sampler::VmstatSample;

const WINDOW_SIZE: usize = 8;

/// Free pages above which the host cannot be thrashing.
const AMPLE_FREE_PAGES: u64 = 5000;
/// Major-fault level above which a RAM-starved host counts as paging in.
const PAGE_IN_CEILING: u64 = 3;
/// Page-out level below which the host is not under write pressure.
const PAGE_OUT_FLOOR: u64 = 3;

/// The last eight momentary thrashing verdicts, most recent first.
///
/// Sustained thrashing needs the whole window true, so at least eight
/// consecutive seconds of momentary thrashing pass before anything acts,
/// and a single clear second resets the wait.
#[derive(Debug, Default)]
pub struct ThrashWindow {
    slots: [bool; WINDOW_SIZE],
}

impl ThrashWindow {
    pub fn new() -> Self {
        ThrashWindow::default()
    }

    /// Shifts the window one slot and records a fresh verdict at slot 0.
    pub fn push(&mut self, verdict: bool) {
        self.slots.rotate_right(1);
        self.slots[0] = verdict;
    }

    /// True iff every verdict in the window is true.
    pub fn is_sustained(&self) -> bool {
        self.slots.iter().all(|&slot| slot)
    }

    /// Forces the most recent verdict to false.
    ///
    /// Called after a kill: the survivors page their working sets back
    /// in, and that burst of faults must not read as fresh thrashing.
    pub fn suppress(&mut self) {
        self.slots[0] = false;
    }
}

/// Heuristic momentary test of whether the vmstat levels look like
/// thrashing. Deliberately biased toward false positives; the window
/// absorbs the noise.
pub fn momentary_verdict(sample: &VmstatSample) -> bool {
    // Megabytes of unused RAM rule thrashing out entirely.
    if sample.nr_free_pages > AMPLE_FREE_PAGES {
        return false;
    }
    // Out of RAM and paging in. The threshold is very low, but it has to
    // hold for eight consecutive seconds before anything is killed.
    if sample.pgmajfault > PAGE_IN_CEILING {
        return true;
    }
    // Out of RAM but writing nothing out: the shortage is not hurting.
    if sample.pgpgout < PAGE_OUT_FLOOR {
        return false;
    }
    true
}
