//! Durable record of deployed programs, keyed by logical contract name, and of the wiring and
//! initialisation calls already made against them.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use alloy_primitives::B256;
use growstreams_types::{ActorId, CodeId};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::StateStoreError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub program_id: ActorId,
    pub code_id: CodeId,
    #[serde(with = "time::serde::rfc3339")]
    pub deployed_at: OffsetDateTime,
    pub network: String,
    pub node: String,
}

/// Ordered so that identical state always serialises to identical bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Deployments(BTreeMap<String, DeploymentRecord>);

impl Deployments {
    pub fn get(&self, name: &str) -> Option<&DeploymentRecord> {
        self.0.get(name)
    }

    /// Insert or overwrite the record for `name`.
    pub fn insert(&mut self, name: impl Into<String>, record: DeploymentRecord) {
        self.0.insert(name.into(), record);
    }

    pub fn is_deployed(&self, name: &str, network: &str) -> bool {
        self.program_id(name, network).is_some()
    }

    /// Program id of `name`, if it was deployed on `network`.
    pub fn program_id(&self, name: &str, network: &str) -> Option<ActorId> {
        self.get(name)
            .filter(|r| r.network == network)
            .map(|r| r.program_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DeploymentRecord)> {
        self.0.iter()
    }
}

/// A finalized wiring or initialisation call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRecord {
    /// Programs the call acted on. Redeploying any of them makes the step due again.
    pub programs: Vec<ActorId>,
    pub block_hash: B256,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: OffsetDateTime,
}

impl StepRecord {
    pub fn new(programs: &[ActorId], block_hash: B256) -> Self {
        Self {
            programs: programs.to_vec(),
            block_hash,
            completed_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Completed steps by network, then by step label.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepLog(BTreeMap<String, BTreeMap<String, StepRecord>>);

impl StepLog {
    pub fn get(&self, network: &str, step: &str) -> Option<&StepRecord> {
        self.0.get(network)?.get(step)
    }

    /// Whether `step` already completed on `network` against exactly `programs`.
    pub fn is_done(&self, network: &str, step: &str, programs: &[ActorId]) -> bool {
        self.get(network, step)
            .is_some_and(|record| record.programs == programs)
    }

    pub fn record(&mut self, network: &str, step: &str, record: StepRecord) {
        self.0
            .entry(network.to_string())
            .or_default()
            .insert(step.to_string(), record);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Deployments live in `<path>`, the step log next to it in `<stem>.steps.json`.
#[derive(Clone, Debug)]
pub struct DeploymentStore {
    path: PathBuf,
}

impl DeploymentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn steps_path(&self) -> PathBuf {
        self.path.with_extension("steps.json")
    }

    /// A missing or blank file is an empty store; unparsable JSON is an error.
    pub fn load(&self) -> Result<Deployments, StateStoreError> {
        read_json(&self.path)
    }

    /// Replace the whole file: write `<path>.tmp`, then rename over the target.
    pub fn save(&self, deployments: &Deployments) -> Result<(), StateStoreError> {
        write_json(&self.path, deployments)
    }

    pub fn load_steps(&self) -> Result<StepLog, StateStoreError> {
        read_json(&self.steps_path())
    }

    pub fn save_steps(&self, steps: &StepLog) -> Result<(), StateStoreError> {
        write_json(&self.steps_path(), steps)
    }
}

fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StateStoreError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let existing = fs::read_to_string(path).map_err(|source| StateStoreError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if existing.trim().is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(&existing).map_err(|source| StateStoreError::Corrupt {
        path: path.to_path_buf(),
        source,
    })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StateStoreError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    if !parent.as_os_str().is_empty() && !parent.exists() {
        fs::create_dir_all(parent).map_err(|source| StateStoreError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    let serialised = serde_json::to_string_pretty(value).map_err(StateStoreError::Serialize)?;
    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, serialised.as_bytes()).map_err(|source| StateStoreError::Write {
        path: tmp_path.clone(),
        source,
    })?;
    fs::rename(&tmp_path, path).map_err(|source| StateStoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_os_string();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn record(network: &str) -> DeploymentRecord {
        DeploymentRecord {
            program_id: ActorId::new([0xaa; 32]),
            code_id: CodeId::new([0xbb; 32]),
            deployed_at: datetime!(2025-01-02 03:04:05 UTC),
            network: network.into(),
            node: "wss://testnet.vara.network".into(),
        }
    }

    #[test]
    fn missing_and_empty_files_load_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeploymentStore::new(dir.path().join("deployments.json"));
        assert!(store.load().unwrap().is_empty());

        fs::write(store.path(), "  \n").unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn corrupt_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeploymentStore::new(dir.path().join("deployments.json"));
        fs::write(store.path(), "{ not json").unwrap();
        assert!(matches!(store.load(), Err(StateStoreError::Corrupt { .. })));
    }

    #[test]
    fn save_then_load_is_identity_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeploymentStore::new(dir.path().join("nested/deployments.json"));
        let mut deployments = Deployments::default();
        deployments.insert("token-vault", record("testnet"));
        deployments.insert("stream-core", record("testnet"));

        store.save(&deployments).unwrap();
        assert_eq!(store.load().unwrap(), deployments);
        assert!(!tmp_path_for(store.path()).exists());

        let first = fs::read(store.path()).unwrap();
        store.save(&store.load().unwrap()).unwrap();
        assert_eq!(fs::read(store.path()).unwrap(), first);
    }

    #[test]
    fn file_layout_uses_camel_case_and_rfc3339() {
        let mut deployments = Deployments::default();
        deployments.insert("stream-core", record("testnet"));
        let json: serde_json::Value = serde_json::to_value(&deployments).unwrap();
        let entry = &json["stream-core"];
        assert_eq!(entry["programId"], format!("0x{}", "aa".repeat(32)));
        assert_eq!(entry["codeId"], format!("0x{}", "bb".repeat(32)));
        assert_eq!(entry["deployedAt"], "2025-01-02T03:04:05Z");
        assert_eq!(entry["network"], "testnet");
    }

    #[test]
    fn step_log_tracks_programs_per_network() {
        let dir = tempfile::tempdir().unwrap();
        let store = DeploymentStore::new(dir.path().join("deploy-state.json"));
        assert_eq!(store.steps_path(), dir.path().join("deploy-state.steps.json"));
        assert!(store.load_steps().unwrap().is_empty());

        let token = ActorId::new([0xcc; 32]);
        let mut log = StepLog::default();
        log.record(
            "testnet",
            "mint",
            StepRecord {
                programs: vec![token],
                block_hash: B256::repeat_byte(1),
                completed_at: datetime!(2025-01-02 03:04:05 UTC),
            },
        );
        store.save_steps(&log).unwrap();

        let loaded = store.load_steps().unwrap();
        assert_eq!(loaded, log);
        assert!(loaded.is_done("testnet", "mint", &[token]));
        assert!(!loaded.is_done("mainnet", "mint", &[token]));
        assert!(!loaded.is_done("testnet", "mint", &[ActorId::new([0xdd; 32])]));
        // The deployments file is untouched.
        assert!(!store.path().exists());

        let json: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(store.steps_path()).unwrap()).unwrap();
        assert_eq!(json["testnet"]["mint"]["completedAt"], "2025-01-02T03:04:05Z");
    }

    #[test]
    fn deployment_is_scoped_to_network() {
        let mut deployments = Deployments::default();
        deployments.insert("grow-token", record("testnet"));
        assert!(deployments.is_deployed("grow-token", "testnet"));
        assert!(!deployments.is_deployed("grow-token", "mainnet"));
        assert!(!deployments.is_deployed("stream-core", "testnet"));
    }
}
