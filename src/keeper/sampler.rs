use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::prelude::*;

/// Momentary levels read from the kernel vmstat file.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct VmstatSample {
    /// Pages currently unused.
    pub nr_free_pages: u64,
    /// Times a process has had to wait for a page from disk.
    pub pgmajfault: u64,
    /// Pages written to disk, swap or otherwise.
    pub pgpgout: u64,
}

/// One process as observed in a single sampling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunningProcess {
    pub pid: i32,
    pub ppid: i32,
    /// Major faults of the process plus its waited-for children.
    pub majflt: u64,
    /// Resident set size in pages.
    pub rss: u64,
}

/// The process table of one cycle, keyed by pid.
pub type ProcessView = HashMap<i32, RunningProcess>;

/// Reads the three counters the thrash detector wants from a vmstat file.
///
/// Counters not present in the file read as zero. A recognized counter
/// with a missing or non-numeric value spoils the whole sample; the
/// caller gets an error and this cycle produces no verdict.
pub fn read_vmstat(path: &Path) -> Result<VmstatSample> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut sample = VmstatSample::default();
    for line in contents.lines() {
        let mut fields = line.split_ascii_whitespace();
        let Some(name) = fields.next() else {
            continue;
        };
        let counter = match name {
            "nr_free_pages" => &mut sample.nr_free_pages,
            "pgmajfault" => &mut sample.pgmajfault,
            "pgpgout" => &mut sample.pgpgout,
            _ => continue,
        };
        let value = fields
            .next()
            .with_context(|| format!("{name} has no value in {}", path.display()))?;
        *counter = value
            .parse()
            .with_context(|| format!("{name} has a non-numeric value {value:?}"))?;
    }

    Ok(sample)
}

/// Scans `proc_root` for pid directories and parses each one's stat file.
///
/// A vanished entry or an unparsable record just drops that process from
/// the view. Failure to enumerate the directory itself is returned to the
/// caller, which treats it as a broken environment.
pub fn scan_processes(proc_root: &Path) -> Result<ProcessView> {
    let entries = fs::read_dir(proc_root)
        .with_context(|| format!("failed to enumerate {}", proc_root.display()))?;

    let mut view = ProcessView::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to enumerate {}", proc_root.display()))?;
        let name = entry.file_name();
        // Pid directories are the ones whose name ends in a digit.
        if !name
            .to_string_lossy()
            .chars()
            .last()
            .is_some_and(|c| c.is_ascii_digit())
        {
            continue;
        }
        // The process may exit between the listing and this read.
        let Ok(contents) = fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        let Some(line) = contents.lines().next() else {
            continue;
        };
        if let Some(process) = parse_stat_line(line) {
            view.insert(process.pid, process);
        }
    }

    Ok(view)
}

/// Parses one `/proc/<pid>/stat` line. Returns None for anything the
/// kernel would not have written; a partial record is never returned.
///
/// Field 2 is the executable name in parentheses. It may contain spaces
/// and parentheses (the kernel backslash-escapes a right paren), so the
/// line cannot be tokenized as-is: every byte from the opening paren
/// through the paren that closes the name, which is the last one on the
/// line, is overwritten with a digit. The name then reads as one numeric
/// token that the positional extraction below skips over.
pub fn parse_stat_line(line: &str) -> Option<RunningProcess> {
    let mut bytes = line.as_bytes().to_vec();
    if let Some(open) = bytes.iter().position(|&b| b == b'(') {
        let close = bytes.iter().rposition(|&b| b == b')')?;
        if close < open {
            return None;
        }
        for b in &mut bytes[open..=close] {
            *b = b'0';
        }
    }
    let line = String::from_utf8(bytes).ok()?;

    let mut fields = line.split_ascii_whitespace();
    let pid = fields.next()?.parse().ok()?;
    // Skip the neutralized name and the state character.
    let ppid = fields.nth(2)?.parse().ok()?;
    // Skip pgrp, session, tty, tpgid, flags, minflt and cminflt.
    let majflt: u64 = fields.nth(7)?.parse().ok()?;
    let cmajflt: u64 = fields.next()?.parse().ok()?;
    // Skip the time and priority fields, starttime and vsize.
    let rss = fields.nth(10)?.parse().ok()?;

    Some(RunningProcess {
        pid,
        ppid,
        majflt: majflt + cmajflt,
        rss,
    })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rstest::rstest;
    use tempfile::TempDir;

    use super::*;

    fn stat_line(pid: i32, comm: &str, ppid: i32, majflt: u64, cmajflt: u64, rss: u64) -> String {
        format!(
            "{pid} ({comm}) S {ppid} 1 1 0 -1 4194304 120 0 {majflt} {cmajflt} \
             10 2 0 0 20 0 1 0 1234 567890 {rss} 18446744073709551615 94000000000000"
        )
    }

    #[test]
    fn parses_the_fields_it_cares_about() {
        let parsed = parse_stat_line(&stat_line(42, "cat", 7, 3, 1, 99)).unwrap();
        assert_eq!(
            parsed,
            RunningProcess {
                pid: 42,
                ppid: 7,
                majflt: 4,
                rss: 99,
            }
        );
    }

    #[rstest]
    #[case::spaces("Web Content")]
    #[case::escaped_paren(r"kworker\)")]
    #[case::unescaped_parens("evil (name")]
    fn awkward_executable_names_do_not_shift_the_fields(#[case] comm: &str) {
        let parsed = parse_stat_line(&stat_line(12, comm, 7, 5, 0, 33)).unwrap();
        assert_eq!(parsed.pid, 12);
        assert_eq!(parsed.ppid, 7);
        assert_eq!(parsed.majflt, 5);
        assert_eq!(parsed.rss, 33);
    }

    #[test]
    fn name_with_embedded_right_paren_parses() {
        let line = "12 (foo ) bar) S 7 1 1 0 -1 0 0 0 5 0 0 0 0 0 20 0 1 0 0 0 33";
        let parsed = parse_stat_line(line).unwrap();
        assert_eq!(parsed.pid, 12);
        assert_eq!(parsed.ppid, 7);
    }

    #[rstest]
    #[case::empty("")]
    #[case::truncated("42 (cat) S 7 1 1 0 -1 0 0 0 5")]
    #[case::bad_pid("nope (cat) S 7 1 1 0 -1 0 0 0 5 0 0 0 0 0 20 0 1 0 0 0 33")]
    #[case::bad_rss("42 (cat) S 7 1 1 0 -1 0 0 0 5 0 0 0 0 0 20 0 1 0 0 0 lots")]
    #[case::unclosed_name("42 (cat S 7 1 1 0 -1 0 0 0 5 0 0 0 0 0 20 0 1 0 0 0 33")]
    fn malformed_lines_are_discarded(#[case] line: &str) {
        assert_eq!(parse_stat_line(line), None);
    }

    #[test]
    fn synthesized_line_round_trips() {
        let parsed = parse_stat_line(&stat_line(31337, "some daemon", 1, 100, 23, 4096)).unwrap();
        assert_eq!(parsed.pid, 31337);
        assert_eq!(parsed.ppid, 1);
        assert_eq!(parsed.majflt, 123);
        assert_eq!(parsed.rss, 4096);
    }

    #[test]
    fn vmstat_reads_recognized_counters_and_ignores_the_rest() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("vmstat");
        fs::write(
            &path,
            "nr_dirty 12\nnr_free_pages 6000\npgpgin 777\npgpgout 42\npgmajfault 9\n",
        )?;
        let sample = read_vmstat(&path)?;
        assert_eq!(
            sample,
            VmstatSample {
                nr_free_pages: 6000,
                pgmajfault: 9,
                pgpgout: 42,
            }
        );
        Ok(())
    }

    #[test]
    fn vmstat_counters_default_to_zero() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("vmstat");
        fs::write(&path, "pgpgout 42\n")?;
        let sample = read_vmstat(&path)?;
        assert_eq!(sample.nr_free_pages, 0);
        assert_eq!(sample.pgmajfault, 0);
        assert_eq!(sample.pgpgout, 42);
        Ok(())
    }

    #[rstest]
    #[case::non_numeric("nr_free_pages lots\n")]
    #[case::missing_value("pgmajfault\n")]
    fn vmstat_with_a_spoiled_counter_is_no_signal(#[case] contents: &str) -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("vmstat");
        fs::write(&path, contents)?;
        assert!(read_vmstat(&path).is_err());
        Ok(())
    }

    #[test]
    fn vmstat_missing_file_is_an_error() {
        assert!(read_vmstat(Path::new("/nonexistent/vmstat")).is_err());
    }

    #[test]
    fn scan_collects_pid_directories_and_skips_the_rest() -> Result<()> {
        let proc = TempDir::new()?;

        // Two well-formed processes.
        fs::create_dir(proc.path().join("100"))?;
        fs::write(
            proc.path().join("100/stat"),
            stat_line(100, "alpha", 1, 2, 0, 50),
        )?;
        fs::create_dir(proc.path().join("200"))?;
        fs::write(
            proc.path().join("200/stat"),
            stat_line(200, "beta", 100, 0, 0, 60),
        )?;
        // Not a pid directory.
        fs::create_dir(proc.path().join("self"))?;
        fs::write(proc.path().join("self/stat"), "not read")?;
        // A pid directory with no stat file (process raced away).
        fs::create_dir(proc.path().join("300"))?;
        // A pid directory with garbage: dropped, not inserted zeroed.
        fs::create_dir(proc.path().join("400"))?;
        fs::write(proc.path().join("400/stat"), "garbage in here")?;

        let view = scan_processes(proc.path())?;
        assert_eq!(view.len(), 2);
        assert_eq!(view[&100].rss, 50);
        assert_eq!(view[&200].ppid, 100);
        assert!(!view.contains_key(&400));
        Ok(())
    }

    #[test]
    fn scan_of_a_missing_directory_is_an_error() {
        assert!(scan_processes(Path::new("/nonexistent/proc")).is_err());
    }
}
