//! Deploy, wire and fund the GrowStreams programs, one step at a time.
//!
//! A failed step is reported and the run moves on. Every successful deployment is persisted
//! before the next step starts, so an interrupted run loses at most the step in flight. Wiring
//! and mint completions are journaled the same way; `all` skips them once recorded against the
//! current program ids.

use std::{fmt, fs, io, path::Path, sync::Arc};

use alloy_primitives::{Bytes, B256};
use growstreams_types::{ActorId, Payload};
use time::OffsetDateTime;
use tracing::{error, info};

use crate::{
    catalog::{self, ContractSpec, WiringCall, GROW_TOKEN, STREAM_CORE, TOKEN_VAULT, WIRING},
    config::{DeployConfig, Mode},
    error::{StateStoreError, StepError},
    gas::GasEstimator,
    keyring::Signer,
    lifecycle::{Finalized, LifecycleManager, TxTarget},
    runtime::{GasDestination, GasQuery, MessageArgs, Runtime, UploadArgs},
    state::{DeploymentRecord, DeploymentStore, Deployments, StepLog, StepRecord},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepStatus {
    Deployed(ActorId),
    Skipped,
    Completed(B256),
    Failed(String),
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployed(id) => write!(f, "deployed {id}"),
            Self::Skipped => f.write_str("skipped (already done)"),
            Self::Completed(block) => write!(f, "completed in block {block}"),
            Self::Failed(reason) => write!(f, "FAILED: {reason}"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepReport {
    pub name: String,
    pub status: StepStatus,
    /// Whether a failure of this step fails the run.
    pub required: bool,
}

impl StepReport {
    fn new(name: impl Into<String>, status: StepStatus) -> Self {
        Self {
            name: name.into(),
            status,
            required: true,
        }
    }

    fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, StepStatus::Failed(_))
    }
}

const MINT_STEP: &str = "mint";

#[derive(Clone, Debug)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
    /// State as saved at the end of the run.
    pub deployments: Deployments,
    pub completed: StepLog,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        !self.steps.iter().any(|s| s.required && s.is_failure())
    }

    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn print_summary(&self) {
        println!();
        println!("=== Deployment summary ===");
        for step in &self.steps {
            let marker = if step.required { "" } else { " (optional)" };
            println!("  {}{marker}: {}", step.name, step.status);
        }
        if !self.deployments.is_empty() {
            println!("Contract addresses:");
            for (name, record) in self.deployments.iter() {
                println!("  {name}: {} ({})", record.program_id, record.network);
            }
        }
    }
}

pub struct Orchestrator {
    config: DeployConfig,
    runtime: Arc<dyn Runtime>,
    signer: Arc<dyn Signer>,
    store: DeploymentStore,
    gas: GasEstimator,
    lifecycle: LifecycleManager,
}

impl Orchestrator {
    pub fn new(config: DeployConfig, runtime: Arc<dyn Runtime>, signer: Arc<dyn Signer>) -> Self {
        Self {
            store: DeploymentStore::new(config.state_path.clone()),
            gas: GasEstimator::new(Arc::clone(&runtime)),
            lifecycle: LifecycleManager::new(Arc::clone(&runtime), config.timeouts),
            config,
            runtime,
            signer,
        }
    }

    /// Only state store failures abort the run; everything else becomes a failed step.
    pub async fn run(&self, mode: Mode) -> Result<RunReport, StateStoreError> {
        let mut deployments = self.store.load()?;
        let mut completed = self.store.load_steps()?;
        let repeat = mode.repeats_recorded_steps();
        let mut steps = Vec::new();

        for spec in mode.contracts() {
            steps.push(self.deploy_step(spec, &mut deployments).await?);
        }
        if mode.wires() {
            steps.extend(self.wire(&deployments, &mut completed, repeat).await?);
        }
        if mode.mints() {
            let step = self.mint(&deployments, &mut completed, repeat).await?;
            steps.push(if mode == Mode::Mint { step } else { step.optional() });
        }

        Ok(RunReport {
            steps,
            deployments,
            completed,
        })
    }

    async fn deploy_step(
        &self,
        spec: &ContractSpec,
        deployments: &mut Deployments,
    ) -> Result<StepReport, StateStoreError> {
        let network = &self.config.network;
        if !self.config.redeploy {
            if let Some(program_id) = deployments.program_id(spec.name, network) {
                info!(
                    contract = spec.name,
                    program_id = %program_id,
                    network = %network,
                    "already deployed; skipping"
                );
                return Ok(StepReport::new(spec.name, StepStatus::Skipped));
            }
        }

        match self.deploy(spec).await {
            Ok(record) => {
                let program_id = record.program_id;
                deployments.insert(spec.name, record);
                self.store.save(deployments)?;
                println!("Deployed `{}` to {}", spec.name, program_id);
                Ok(StepReport::new(spec.name, StepStatus::Deployed(program_id)))
            }
            Err(err) => {
                error!(contract = spec.name, error = %err, "deployment failed");
                Ok(StepReport::new(spec.name, StepStatus::Failed(err.to_string())))
            }
        }
    }

    async fn deploy(&self, spec: &ContractSpec) -> Result<DeploymentRecord, StepError> {
        let code = read_artifact(&spec.artifact_path(&self.config.artifacts_dir))?;
        let init_payload = spec.constructor_payload()?;

        let query = GasQuery {
            source: self.signer.account(),
            destination: GasDestination::Upload { code: code.clone() },
            payload: init_payload.clone(),
            value: 0,
            keep_result: true,
        };
        let gas = self
            .gas
            .estimate_or_fallback(&query, self.config.gas.upload)
            .await;

        let upload = self.runtime.upload_program(UploadArgs {
            code,
            init_payload,
            gas_limit: gas.limit,
            value: 0,
        })?;
        info!(
            contract = spec.name,
            program_id = %upload.program_id,
            code_id = %upload.code_id,
            gas_limit = gas.limit,
            "uploading program"
        );

        let target = TxTarget::Upload {
            program_id: upload.program_id,
            code_id: upload.code_id,
        };
        let finalized = self
            .lifecycle
            .submit(spec.name, target, upload.extrinsic, self.signer.as_ref())
            .await?
            .into_result()?;
        info!(
            contract = spec.name,
            program_id = %upload.program_id,
            block_hash = %finalized.block_hash,
            "program initialised"
        );

        Ok(DeploymentRecord {
            program_id: upload.program_id,
            code_id: upload.code_id,
            deployed_at: OffsetDateTime::now_utc(),
            network: self.config.network.clone(),
            node: self.config.node.clone(),
        })
    }

    async fn wire(
        &self,
        deployments: &Deployments,
        completed: &mut StepLog,
        repeat: bool,
    ) -> Result<Vec<StepReport>, StateStoreError> {
        let network = &self.config.network;
        let mut ids = Vec::with_capacity(WIRING.len());
        for call in &WIRING {
            match self.wiring_ids(call, deployments) {
                Ok(pair) => ids.push(pair),
                Err(err) => {
                    error!(network = %network, error = %err, "cannot wire");
                    return Ok(vec![StepReport::new("wire", StepStatus::Failed(err.to_string()))]);
                }
            }
        }

        let mut steps = Vec::with_capacity(WIRING.len());
        let mut sent_any = false;
        for (call, (target, argument)) in WIRING.iter().zip(ids) {
            let label = call.label();
            let programs = [target, argument];
            if !repeat && completed.is_done(network, &label, &programs) {
                info!(call = %label, network = %network, "already wired; skipping");
                steps.push(StepReport::new(label, StepStatus::Skipped));
                continue;
            }
            if sent_any {
                tokio::time::sleep(self.config.wire_delay).await;
            }
            sent_any = true;

            info!(contract = call.target, argument = %argument, "{}.{}", call.service, call.method);
            let sent = match call.payload(argument) {
                Ok(payload) => self.send(&label, target, payload).await,
                Err(err) => Err(err.into()),
            };
            let status = match sent {
                Ok(finalized) => {
                    let record = StepRecord::new(&programs, finalized.block_hash);
                    completed.record(network, &label, record);
                    self.store.save_steps(completed)?;
                    StepStatus::Completed(finalized.block_hash)
                }
                Err(err) => {
                    error!(call = %label, error = %err, "wiring call failed");
                    StepStatus::Failed(err.to_string())
                }
            };
            steps.push(StepReport::new(label, status));
        }
        Ok(steps)
    }

    fn wiring_ids(
        &self,
        call: &WiringCall,
        deployments: &Deployments,
    ) -> Result<(ActorId, ActorId), StepError> {
        let network = &self.config.network;
        for name in [STREAM_CORE, TOKEN_VAULT] {
            if !deployments.is_deployed(name, network) {
                return Err(StepError::MissingDeployment(name));
            }
        }
        let target = deployments
            .program_id(call.target, network)
            .ok_or(StepError::MissingDeployment(call.target))?;
        let argument = deployments
            .program_id(call.argument, network)
            .ok_or(StepError::MissingDeployment(call.argument))?;
        Ok((target, argument))
    }

    async fn mint(
        &self,
        deployments: &Deployments,
        completed: &mut StepLog,
        repeat: bool,
    ) -> Result<StepReport, StateStoreError> {
        let network = &self.config.network;
        let Some(token) = deployments.program_id(GROW_TOKEN, network) else {
            let err = StepError::MissingDeployment(GROW_TOKEN);
            error!(contract = GROW_TOKEN, error = %err, "mint failed");
            return Ok(StepReport::new(MINT_STEP, StepStatus::Failed(err.to_string())));
        };
        if !repeat && completed.is_done(network, MINT_STEP, &[token]) {
            info!(contract = GROW_TOKEN, network = %network, "already minted; skipping");
            return Ok(StepReport::new(MINT_STEP, StepStatus::Skipped));
        }

        let status = match self.mint_to_signer(token).await {
            Ok(finalized) => {
                let record = StepRecord::new(&[token], finalized.block_hash);
                completed.record(network, MINT_STEP, record);
                self.store.save_steps(completed)?;
                StepStatus::Completed(finalized.block_hash)
            }
            Err(err) => {
                error!(contract = GROW_TOKEN, error = %err, "mint failed");
                StepStatus::Failed(err.to_string())
            }
        };
        Ok(StepReport::new(MINT_STEP, status))
    }

    async fn mint_to_signer(&self, token: ActorId) -> Result<Finalized, StepError> {
        let to = self.signer.account();
        info!(contract = GROW_TOKEN, to = %to, amount = %self.config.mint_amount, "minting");
        let payload = catalog::mint_payload(to, self.config.mint_amount)?;
        self.send("grow-token.VftService/Mint", token, payload).await
    }

    async fn send(
        &self,
        label: &str,
        destination: ActorId,
        payload: Payload,
    ) -> Result<Finalized, StepError> {
        let query = GasQuery {
            source: self.signer.account(),
            destination: GasDestination::Program(destination),
            payload: payload.clone(),
            value: 0,
            keep_result: true,
        };
        let gas = self
            .gas
            .estimate_or_fallback(&query, self.config.gas.message)
            .await;
        let extrinsic = self.runtime.send_message(MessageArgs {
            destination,
            payload,
            gas_limit: gas.limit,
            value: 0,
        })?;
        Ok(self
            .lifecycle
            .submit(label, TxTarget::Message { destination }, extrinsic, self.signer.as_ref())
            .await?
            .into_result()?)
    }
}

fn read_artifact(path: &Path) -> Result<Bytes, StepError> {
    match fs::read(path) {
        Ok(code) => Ok(code.into()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Err(StepError::MissingArtifact {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(StepError::Artifact {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use growstreams_encoder::{decoder::read_actor_id, decoder::read_u128_le, decoder::skip_strings};

    use super::*;
    use crate::{
        catalog::CONTRACTS,
        keyring::Keyring,
        runtime::{dev::GasBehaviour, DevRuntime},
    };

    fn setup(dir: &Path) -> (DeployConfig, Arc<DevRuntime>, Arc<Keyring>) {
        let artifacts = dir.join("artifacts");
        fs::create_dir_all(&artifacts).unwrap();
        for spec in &CONTRACTS {
            fs::write(spec.artifact_path(&artifacts), format!("\0asm {}", spec.name)).unwrap();
        }
        let mut config = DeployConfig::new("dev://test", "//Alice");
        config.state_path = dir.join("deploy-state.json");
        config.artifacts_dir = artifacts;
        config.wire_delay = Duration::ZERO;
        let keyring = Arc::new(Keyring::from_suri("//Alice").unwrap());
        (config, Arc::new(DevRuntime::new()), keyring)
    }

    #[tokio::test]
    async fn full_run_deploys_wires_and_mints() {
        let dir = tempfile::tempdir().unwrap();
        let (config, runtime, keyring) = setup(dir.path());
        let orchestrator = Orchestrator::new(config, runtime.clone(), keyring.clone());

        let report = orchestrator.run(Mode::All).await.unwrap();
        assert!(report.is_success(), "{report:?}");
        assert_eq!(runtime.upload_count(), 3);
        assert_eq!(report.deployments.len(), 3);

        let messages = runtime.sent_messages();
        assert_eq!(messages.len(), 3);
        let vault = report.deployments.program_id(TOKEN_VAULT, "vara-testnet").unwrap();
        let core = report.deployments.program_id(STREAM_CORE, "vara-testnet").unwrap();
        assert_eq!(messages[0].destination, vault);
        assert_eq!(messages[1].destination, core);

        let mint_args = skip_strings(&messages[2].payload, 2).unwrap();
        let mut i = 0;
        assert_eq!(read_actor_id(mint_args, &mut i).unwrap(), keyring.account());
        assert_eq!(read_u128_le(mint_args, &mut i).unwrap(), catalog::DEFAULT_MINT_AMOUNT);
    }

    #[tokio::test]
    async fn wiring_without_deployments_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let (config, runtime, keyring) = setup(dir.path());
        let orchestrator = Orchestrator::new(config, runtime.clone(), keyring);

        let report = orchestrator.run(Mode::Wire).await.unwrap();
        assert!(!report.is_success());
        assert_eq!(
            report.step("wire").unwrap().status,
            StepStatus::Failed("missing stream-core in deployment state".into())
        );
        assert!(runtime.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn gas_simulation_failure_uses_fallback_ceilings() {
        let dir = tempfile::tempdir().unwrap();
        let (config, runtime, keyring) = setup(dir.path());
        runtime.set_gas_behaviour(GasBehaviour::Fail);
        let orchestrator = Orchestrator::new(config, runtime.clone(), keyring);

        let report = orchestrator.run(Mode::All).await.unwrap();
        assert!(report.is_success(), "{report:?}");
        assert_eq!(runtime.upload_count(), 3);
    }

    #[tokio::test]
    async fn missing_artifact_fails_only_that_step() {
        let dir = tempfile::tempdir().unwrap();
        let (config, runtime, keyring) = setup(dir.path());
        fs::remove_file(catalog::contract(GROW_TOKEN).unwrap().artifact_path(&config.artifacts_dir))
            .unwrap();
        let orchestrator = Orchestrator::new(config, runtime.clone(), keyring);

        let report = orchestrator.run(Mode::All).await.unwrap();
        assert!(!report.is_success());
        assert!(report.step(GROW_TOKEN).unwrap().is_failure());
        assert!(matches!(report.step(STREAM_CORE).unwrap().status, StepStatus::Deployed(_)));
        // Mint is optional in `all` mode and fails for lack of grow-token.
        let mint = report.step("mint").unwrap();
        assert!(mint.is_failure() && !mint.required);
    }
}
