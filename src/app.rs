use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use clap::Parser;
use serde::Deserialize;

use crate::keeper::ChoreKeeper;
use crate::local_logger::init_local_logger;
use crate::prelude::*;
use crate::service::{ManagedProcess, ServiceRegistry, ServiceSpec};
use crate::VERSION;

#[derive(Parser, Debug)]
#[command(version, about = "Per-node service runner chore-keeping supervisor")]
pub struct Cli {
    /// JSON manifest of already-running services to adopt: an array of
    /// {pid, name, expected-typical-memory, expected-peak-memory, value}
    #[arg(long, env = "NODEE_SERVICES")]
    services: Option<PathBuf>,
}

/// One manifest entry: a live pid plus its declared capacities.
#[derive(Debug, Deserialize)]
struct ManifestEntry {
    pid: i32,
    #[serde(flatten)]
    spec: ServiceSpec,
}

fn load_manifest(path: &Path) -> Result<Vec<ManifestEntry>> {
    let raw = fs::read(path)
        .with_context(|| format!("failed to read service manifest {}", path.display()))?;
    serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse service manifest {}", path.display()))
}

pub fn run() -> Result<()> {
    init_local_logger()?;
    let cli = Cli::parse();
    debug!("nodee v{VERSION}");

    let registry = Arc::new(ServiceRegistry::new());
    if let Some(path) = &cli.services {
        for entry in load_manifest(path)? {
            debug!("adopting service {} (pid {})", entry.spec.name(), entry.pid);
            registry.manage(ManagedProcess::new(entry.pid, entry.spec));
        }
    }

    let keeper = ChoreKeeper::new(Arc::clone(&registry));
    let chores = thread::Builder::new()
        .name("chorekeeper".into())
        .spawn(move || keeper.start())?;

    // The keeper runs for process lifetime; join only returns if it
    // panics.
    chores
        .join()
        .map_err(|_| anyhow!("chorekeeper thread panicked"))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    #[test]
    fn parses_a_service_manifest() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(
            file,
            r#"[
                {{"pid": 12, "name": "indexer",
                  "expected-typical-memory": 400,
                  "expected-peak-memory": 800,
                  "value": 10}},
                {{"pid": 34, "name": "frontend",
                  "expected-typical-memory": 100,
                  "expected-peak-memory": 300,
                  "value": 25}}
            ]"#
        )?;

        let entries = load_manifest(file.path())?;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].pid, 12);
        assert_eq!(entries[0].spec.name(), "indexer");
        assert_eq!(entries[0].spec.expected_peak_memory(), 800);
        assert_eq!(entries[1].spec.value(), 25);
        Ok(())
    }

    #[test]
    fn a_broken_manifest_is_an_error() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        write!(file, "not json")?;
        assert!(load_manifest(file.path()).is_err());
        Ok(())
    }
}
