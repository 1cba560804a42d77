//! Name → deployment lookup, optionally backed by `deployments/<network>/`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::DeployError;
use crate::chain::ConstructorArg;

/// One deployed contract. Written once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub name: String,
    pub address: String,
    pub args: Vec<ConstructorArg>,
    /// Address of the deploying account
    pub from: String,
    /// Ledger at which the deployment was considered confirmed
    pub ledger: u32,
}

#[derive(Debug, Default)]
pub struct DeploymentRegistry {
    records: BTreeMap<String, DeploymentRecord>,
    dir: Option<PathBuf>,
}

impl DeploymentRegistry {
    /// Registry that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Registry persisted under `dir`, loading whatever is already there.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, DeployError> {
        let dir = dir.into();
        let mut records = BTreeMap::new();

        if dir.exists() {
            for entry in std::fs::read_dir(&dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let record: DeploymentRecord =
                    serde_json::from_str(&std::fs::read_to_string(&path)?)?;
                debug!(name = %record.name, path = %path.display(), "Loaded deployment");
                records.insert(record.name.clone(), record);
            }
        }

        Ok(Self {
            records,
            dir: Some(dir),
        })
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Store a record, replacing any earlier deployment of the same name.
    pub fn record(&mut self, record: DeploymentRecord) -> Result<(), DeployError> {
        if let Some(dir) = &self.dir {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!("{}.json", record.name));
            std::fs::write(&path, serde_json::to_string_pretty(&record)?)?;
        }
        self.records.insert(record.name.clone(), record);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&DeploymentRecord, DeployError> {
        self.records
            .get(name)
            .ok_or_else(|| DeployError::MissingDeployment(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeploymentRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
