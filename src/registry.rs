//! Read-only cattle registration table, loaded once at startup.

use std::io::Read;
use std::path::Path;

use thiserror::Error;
use tracing::info;

use crate::models::{RegistrationDetails, RegistrationRecord};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to open registry {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed registry row: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    records: Vec<RegistrationRecord>,
}

impl Registry {
    pub fn new(records: Vec<RegistrationRecord>) -> Self {
        Self { records }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| RegistryError::Open {
            path: path.display().to_string(),
            source,
        })?;
        let registry = Self::from_reader(file)?;
        info!(
            "Loaded {} registration records from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RegistryError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let records = csv_reader
            .deserialize()
            .collect::<Result<Vec<RegistrationRecord>, _>>()?;
        Ok(Self { records })
    }

    /// Every row registered under `class`, in file order.
    pub fn lookup(&self, class: &str) -> Vec<RegistrationDetails> {
        self.records
            .iter()
            .filter(|record| record.class == class)
            .map(RegistrationDetails::from)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
