use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use ising_sim::{Ensemble, EnsembleMetadata, RunRegistry, ScanConfig};
use serde::{Deserialize, Serialize};

/// On-disk form of one ensemble: its metadata plus the flat
/// `(iternum, sysnum, nx, ny)` spin array.
#[derive(Debug, Serialize, Deserialize)]
pub struct EnsembleRecord {
    pub metadata: EnsembleMetadata,
    pub spins: Vec<i8>,
}

impl EnsembleRecord {
    pub fn of(ensemble: &Ensemble) -> Self {
        Self {
            metadata: ensemble.metadata(),
            spins: ensemble.as_array().to_vec(),
        }
    }

    pub fn into_ensemble(self) -> Result<Ensemble> {
        let shape = self.metadata.shape();
        Ensemble::from_record(self.metadata, self.spins)
            .with_context(|| format!("rebuilding ensemble of shape {shape:?}"))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScanEntry {
    pub relaxation: usize,
    pub record: EnsembleRecord,
}

/// On-disk form of a whole parameter scan.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScanRecord {
    pub scan: ScanConfig,
    pub runs: Vec<ScanEntry>,
}

impl ScanRecord {
    pub fn into_registry(self) -> Result<(ScanConfig, RunRegistry)> {
        let mut registry = RunRegistry::new();
        for (k, entry) in self.runs.into_iter().enumerate() {
            let ensemble = entry.record.into_ensemble().with_context(|| format!("run {k}"))?;
            registry.insert(ensemble, entry.relaxation)?;
        }
        Ok((self.scan, registry))
    }
}

/// Either kind of saved file, told apart by its fields.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Record {
    Scan(ScanRecord),
    Ensemble(EnsembleRecord),
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer(BufWriter::new(file), value)
        .with_context(|| format!("writing {}", path.display()))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))
}

pub fn save_ensemble(ensemble: &Ensemble, path: &Path) -> Result<()> {
    write_json(&EnsembleRecord::of(ensemble), path)
}

pub fn load_ensemble(path: &Path) -> Result<Ensemble> {
    let record: EnsembleRecord = read_json(path)?;
    record
        .into_ensemble()
        .with_context(|| format!("loading {}", path.display()))
}

pub fn save_scan(scan: &ScanConfig, registry: &RunRegistry, path: &Path) -> Result<()> {
    let runs = registry
        .iter()
        .map(|(_, run)| ScanEntry {
            relaxation: run.relaxation,
            record: EnsembleRecord::of(&run.ensemble),
        })
        .collect();
    write_json(
        &ScanRecord {
            scan: scan.clone(),
            runs,
        },
        path,
    )
}

/// Read a saved ensemble or scan in one pass.
pub fn load_record(path: &Path) -> Result<Record> {
    read_json(path)
}
