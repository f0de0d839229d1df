//! Versioned model registry.
//!
//! Layout under the models directory:
//!
//! ```text
//! registry/<model_name>/index.json      versions + active version
//! registry/<model_name>/v<N>/model.json serialized fitted model
//! ```
//!
//! The active version is an explicit field of the index, never inferred from
//! directory contents. Versions are never deleted; a newer registration
//! supersedes older ones. All writes for one model name go through a single
//! in-process writer lock, and every file is replaced atomically.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use coincast_core::{
    ArtifactStore, DecomposableModel, EvaluationMetrics, Hyperparameters, RunId, StoreError,
};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("model '{name}' has no version {version}")]
    VersionNotFound { name: String, version: u32 },

    #[error("invalid stage transition: {0}")]
    InvalidTransition(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("registry writer lock poisoned")]
    LockPoisoned,
}

/// Lifecycle stage of a registered version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    #[default]
    None,
    Staging,
    Production,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::None => "None",
            Stage::Staging => "Staging",
            Stage::Production => "Production",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Stage::None),
            "staging" => Ok(Stage::Staging),
            "production" => Ok(Stage::Production),
            other => Err(format!(
                "unknown stage '{other}' (expected None, Staging or Production)"
            )),
        }
    }
}

/// Metadata of one registered version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelVersionRecord {
    pub version: u32,
    pub stage: Stage,
    pub created_at: DateTime<Utc>,
    pub model_type: String,
    pub hyperparameters: Hyperparameters,
    pub metrics: EvaluationMetrics,
    pub training_fingerprint: String,
    pub training_start: NaiveDate,
    pub training_end: NaiveDate,
    pub n_train: usize,
    pub run_id: Option<RunId>,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryIndex {
    pub model_name: String,
    pub description: String,
    pub active_version: Option<u32>,
    pub versions: Vec<ModelVersionRecord>,
}

impl RegistryIndex {
    fn empty(name: &str, description: &str) -> Self {
        Self {
            model_name: name.to_string(),
            description: description.to_string(),
            active_version: None,
            versions: Vec::new(),
        }
    }

    pub fn get(&self, version: u32) -> Option<&ModelVersionRecord> {
        self.versions.iter().find(|r| r.version == version)
    }

    pub fn active(&self) -> Option<&ModelVersionRecord> {
        self.active_version.and_then(|v| self.get(v))
    }

    fn next_version(&self) -> u32 {
        self.versions.iter().map(|r| r.version).max().unwrap_or(0) + 1
    }

    /// At most one Production version: demote every other one to None.
    fn demote_other_production(&mut self, keep: u32) {
        for record in &mut self.versions {
            if record.version != keep && record.stage == Stage::Production {
                record.stage = Stage::None;
            }
        }
    }

    /// Newest Production version, else newest Staging version.
    fn best_serving_version(&self) -> Option<u32> {
        let newest = |stage: Stage| {
            self.versions
                .iter()
                .filter(|r| r.stage == stage)
                .map(|r| r.version)
                .max()
        };
        newest(Stage::Production).or_else(|| newest(Stage::Staging))
    }
}

/// The active version's record together with its loaded model.
#[derive(Debug, Clone)]
pub struct ActiveModel {
    pub record: ModelVersionRecord,
    pub model: DecomposableModel,
}

/// One lock per registry directory, keyed by its canonical path so that
/// `models`, `./models` and `/abs/models` share a writer.
fn writer_lock(dir: &Path) -> Result<Arc<Mutex<()>>, RegistryError> {
    std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    let key = std::fs::canonicalize(dir).map_err(|source| StoreError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let locks = LOCKS.get_or_init(|| Mutex::new(HashMap::new()));
    let mut map = match locks.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    Ok(map
        .entry(key)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone())
}

const INDEX_FILE: &str = "index.json";

/// Handle to one named model in the registry.
#[derive(Debug, Clone)]
pub struct ModelRegistry {
    name: String,
    description: String,
    store: ArtifactStore,
    lock: Arc<Mutex<()>>,
}

impl ModelRegistry {
    /// Open (or create) `registry/<name>` under `models_dir`.
    pub fn open(
        models_dir: impl AsRef<Path>,
        name: &str,
        description: &str,
    ) -> Result<Self, RegistryError> {
        let dir = models_dir.as_ref().join("registry").join(name);
        let registry = Self {
            name: name.to_string(),
            description: description.to_string(),
            store: ArtifactStore::new(&dir),
            lock: writer_lock(&dir)?,
        };
        if !registry.store.exists(INDEX_FILE) {
            let _guard = registry.lock.lock().map_err(|_| RegistryError::LockPoisoned)?;
            if !registry.store.exists(INDEX_FILE) {
                registry
                    .store
                    .write_json(INDEX_FILE, &RegistryIndex::empty(name, description))?;
            }
        }
        Ok(registry)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        self.store.root()
    }

    pub fn index(&self) -> Result<RegistryIndex, RegistryError> {
        match self.store.read_json(INDEX_FILE) {
            Ok(index) => Ok(index),
            Err(StoreError::Missing { .. }) => {
                Ok(RegistryIndex::empty(&self.name, &self.description))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn versions(&self) -> Result<Vec<ModelVersionRecord>, RegistryError> {
        Ok(self.index()?.versions)
    }

    pub fn active_version(&self) -> Result<Option<u32>, RegistryError> {
        Ok(self.index()?.active_version)
    }

    /// Register an accepted model as a new version and make it active.
    ///
    /// Registering at `Production` demotes the previous Production version.
    pub fn register(
        &self,
        model: &DecomposableModel,
        metrics: &EvaluationMetrics,
        stage: Stage,
        run_id: Option<RunId>,
    ) -> Result<ModelVersionRecord, RegistryError> {
        let _guard = self.lock.lock().map_err(|_| RegistryError::LockPoisoned)?;
        let mut index = self.index()?;
        let version = index.next_version();

        self.store.write_json(model_path(version), model)?;

        let record = ModelVersionRecord {
            version,
            stage,
            created_at: Utc::now(),
            model_type: DecomposableModel::MODEL_TYPE.to_string(),
            hyperparameters: model.hyperparameters().clone(),
            metrics: metrics.clone(),
            training_fingerprint: model.training_fingerprint().to_string(),
            training_start: model.start_date(),
            training_end: model.last_date(),
            n_train: model.n_observations(),
            run_id,
            description: self.description.clone(),
        };
        index.versions.push(record.clone());
        if stage == Stage::Production {
            index.demote_other_production(version);
        }
        index.active_version = Some(version);
        self.store.write_json(INDEX_FILE, &index)?;

        info!(
            model = %self.name,
            version,
            stage = %stage,
            mape = metrics.mape,
            r2 = metrics.r2,
            "registered model version"
        );
        Ok(record)
    }

    /// Move a version to a new stage.
    ///
    /// Promoting to Production makes the version active. Demoting the active
    /// version hands the active slot to the newest Production (else Staging)
    /// version, or clears it.
    pub fn transition(&self, version: u32, stage: Stage) -> Result<ModelVersionRecord, RegistryError> {
        let _guard = self.lock.lock().map_err(|_| RegistryError::LockPoisoned)?;
        let mut index = self.index()?;

        let record = index
            .versions
            .iter_mut()
            .find(|r| r.version == version)
            .ok_or_else(|| RegistryError::VersionNotFound {
                name: self.name.clone(),
                version,
            })?;
        if record.stage == stage {
            return Err(RegistryError::InvalidTransition(format!(
                "version {version} is already in {stage}"
            )));
        }
        let from = record.stage;
        record.stage = stage;
        let updated = record.clone();

        match stage {
            Stage::Production => {
                index.demote_other_production(version);
                index.active_version = Some(version);
            }
            _ if index.active_version == Some(version) => {
                index.active_version = index.best_serving_version();
            }
            _ => {}
        }
        self.store.write_json(INDEX_FILE, &index)?;

        info!(model = %self.name, version, from = %from, to = %stage, "stage transition");
        Ok(updated)
    }

    pub fn load_model(&self, version: u32) -> Result<DecomposableModel, RegistryError> {
        match self.store.read_json::<DecomposableModel>(model_path(version)) {
            Ok(model) => {
                model.check_shape().map_err(|e| StoreError::Corrupt {
                    path: self.store.path(model_path(version)),
                    reason: e.to_string(),
                })?;
                Ok(model)
            }
            Err(StoreError::Missing { .. }) => Err(RegistryError::VersionNotFound {
                name: self.name.clone(),
                version,
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// The active version and its model, or `None` when nothing is active.
    pub fn load_active(&self) -> Result<Option<ActiveModel>, RegistryError> {
        let index = self.index()?;
        let Some(record) = index.active().cloned() else {
            return Ok(None);
        };
        let model = self.load_model(record.version)?;
        Ok(Some(ActiveModel { record, model }))
    }
}

fn model_path(version: u32) -> PathBuf {
    PathBuf::from(format!("v{version}")).join("model.json")
}
