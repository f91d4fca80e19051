//! Command line and environment configuration.

use std::{path::PathBuf, time::Duration};

use clap::{Parser, ValueEnum};

use crate::{
    catalog::{self, ContractSpec, DEFAULT_MINT_AMOUNT},
    keyring::{self, Keyring, KeyringError},
    lifecycle::{Timeouts, DEFAULT_MESSAGE_TIMEOUT, DEFAULT_UPLOAD_TIMEOUT},
};

pub const DEFAULT_NODE: &str = "wss://testnet.vara.network";
pub const DEFAULT_UPLOAD_GAS_CEILING: u64 = 500_000_000_000;
pub const DEFAULT_MESSAGE_GAS_CEILING: u64 = 50_000_000_000;
pub const DEFAULT_WIRE_DELAY: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Deploy every program, wire them, mint to the deployer. Steps already recorded for the
    /// network are skipped.
    All,
    StreamCore,
    TokenVault,
    GrowToken,
    /// Connect token-vault and stream-core to each other, even if already recorded.
    Wire,
    /// Mint GROW to the deployer account, even if a mint is already recorded.
    Mint,
}

impl Mode {
    pub fn contracts(self) -> Vec<&'static ContractSpec> {
        let only = match self {
            Self::All => return catalog::CONTRACTS.iter().collect(),
            Self::StreamCore => catalog::STREAM_CORE,
            Self::TokenVault => catalog::TOKEN_VAULT,
            Self::GrowToken => catalog::GROW_TOKEN,
            Self::Wire | Self::Mint => return Vec::new(),
        };
        catalog::contract(only).into_iter().collect()
    }

    pub fn wires(self) -> bool {
        matches!(self, Self::All | Self::Wire)
    }

    pub fn mints(self) -> bool {
        matches!(self, Self::All | Self::Mint)
    }

    /// Whether wiring and mint run again when already recorded for the network.
    pub fn repeats_recorded_steps(self) -> bool {
        matches!(self, Self::Wire | Self::Mint)
    }
}

/// Deploy the GrowStreams programs to a Vara node and record their ids.
///
/// Re-running is safe: programs, wiring and the initial mint already recorded for the selected
/// network are skipped.
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Which part of the deployment to run.
    #[arg(value_enum, default_value_t = Mode::All)]
    pub mode: Mode,

    /// Node endpoint. `dev://<name>` runs against an in-process development chain.
    #[arg(long, env = "VARA_NODE", default_value = DEFAULT_NODE)]
    pub node: String,

    /// Deployer secret: a mnemonic, a 0x seed, or a URI such as `//Alice`.
    #[arg(long, env = "VARA_SEED", hide_env_values = true)]
    pub seed: Option<String>,

    /// Network name recorded with each deployment (eg vara-testnet).
    #[arg(long, env = "VARA_NETWORK", default_value = "vara-testnet")]
    pub network: String,

    /// Deployment state file.
    #[arg(long, env = "DEPLOY_STATE_PATH", default_value = "deploy-state.json")]
    pub state_path: PathBuf,

    /// Directory holding `<name>.opt.wasm` artifacts.
    #[arg(long, env = "ARTIFACTS_DIR", default_value = "artifacts")]
    pub artifacts_dir: PathBuf,

    /// Gas limit used for uploads when simulation fails.
    #[arg(long, env = "UPLOAD_GAS_CEILING", default_value_t = DEFAULT_UPLOAD_GAS_CEILING)]
    pub upload_gas_ceiling: u64,

    /// Gas limit used for messages when simulation fails.
    #[arg(long, env = "MESSAGE_GAS_CEILING", default_value_t = DEFAULT_MESSAGE_GAS_CEILING)]
    pub message_gas_ceiling: u64,

    #[arg(long, default_value_t = DEFAULT_UPLOAD_TIMEOUT.as_secs())]
    pub upload_timeout_secs: u64,

    #[arg(long, default_value_t = DEFAULT_MESSAGE_TIMEOUT.as_secs())]
    pub message_timeout_secs: u64,

    /// Pause between the two wiring calls.
    #[arg(long, default_value_t = 2000)]
    pub wire_delay_ms: u64,

    /// Amount minted to the deployer, in base units.
    #[arg(long, default_value_t = DEFAULT_MINT_AMOUNT)]
    pub mint_amount: u128,

    /// Deploy even if the state file already has the program for this network.
    #[arg(long)]
    pub redeploy: bool,

    /// Emit logs as JSON.
    #[arg(long)]
    pub log_json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("VARA_SEED is not set (pass --seed or add it to .env)")]
    MissingSeed,
    #[error("VARA_SEED is still the placeholder from the sample .env")]
    PlaceholderSeed,
    #[error("invalid VARA_SEED: {0}")]
    Suri(#[from] KeyringError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasCeilings {
    pub upload: u64,
    pub message: u64,
}

impl Default for GasCeilings {
    fn default() -> Self {
        Self {
            upload: DEFAULT_UPLOAD_GAS_CEILING,
            message: DEFAULT_MESSAGE_GAS_CEILING,
        }
    }
}

#[derive(Clone, Debug)]
pub struct DeployConfig {
    pub node: String,
    pub seed: String,
    pub network: String,
    pub state_path: PathBuf,
    pub artifacts_dir: PathBuf,
    pub gas: GasCeilings,
    pub timeouts: Timeouts,
    pub wire_delay: Duration,
    pub mint_amount: u128,
    pub redeploy: bool,
}

impl DeployConfig {
    /// Defaults for everything but the endpoint and the signer.
    pub fn new(node: impl Into<String>, seed: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            seed: seed.into(),
            network: "vara-testnet".into(),
            state_path: PathBuf::from("deploy-state.json"),
            artifacts_dir: PathBuf::from("artifacts"),
            gas: GasCeilings::default(),
            timeouts: Timeouts::default(),
            wire_delay: DEFAULT_WIRE_DELAY,
            mint_amount: DEFAULT_MINT_AMOUNT,
            redeploy: false,
        }
    }

    pub fn keyring(&self) -> Result<Keyring, ConfigError> {
        Ok(Keyring::from_suri(&self.seed)?)
    }
}

impl Cli {
    /// Validate the seed before anything touches the network.
    pub fn into_config(self) -> Result<(Mode, DeployConfig), ConfigError> {
        let seed = self
            .seed
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::MissingSeed)?;
        if keyring::is_placeholder(&seed) {
            return Err(ConfigError::PlaceholderSeed);
        }

        let config = DeployConfig {
            node: self.node,
            seed,
            network: self.network,
            state_path: self.state_path,
            artifacts_dir: self.artifacts_dir,
            gas: GasCeilings {
                upload: self.upload_gas_ceiling,
                message: self.message_gas_ceiling,
            },
            timeouts: Timeouts {
                upload: Duration::from_secs(self.upload_timeout_secs),
                message: Duration::from_secs(self.message_timeout_secs),
            },
            wire_delay: Duration::from_millis(self.wire_delay_ms),
            mint_amount: self.mint_amount,
            redeploy: self.redeploy,
        };
        Ok((self.mode, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["growstreams-deploy"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn mode_selection() {
        assert_eq!(parse(&["--seed", "//Alice"]).mode, Mode::All);
        assert_eq!(parse(&["token-vault", "--seed", "//Alice"]).mode, Mode::TokenVault);
        assert!(Cli::try_parse_from(["growstreams-deploy", "everything"]).is_err());

        let names: Vec<_> = Mode::All.contracts().iter().map(|c| c.name).collect();
        assert_eq!(names, ["stream-core", "token-vault", "grow-token"]);
        assert_eq!(Mode::GrowToken.contracts()[0].name, "grow-token");
        assert!(Mode::Wire.contracts().is_empty());
        assert!(Mode::Wire.wires() && !Mode::Wire.mints());
    }

    #[test]
    fn flags_flow_into_config() {
        let cli = parse(&[
            "mint",
            "--seed",
            "//Alice",
            "--node",
            "dev://local",
            "--message-timeout-secs",
            "5",
            "--mint-amount",
            "1000000000000",
            "--redeploy",
        ]);
        let (mode, config) = cli.into_config().unwrap();
        assert_eq!(mode, Mode::Mint);
        assert_eq!(config.node, "dev://local");
        assert_eq!(config.timeouts.message, Duration::from_secs(5));
        assert_eq!(config.mint_amount, 1_000_000_000_000);
        assert!(config.redeploy);
        assert!(config.keyring().is_ok());
    }

    #[test]
    fn placeholder_seed_is_rejected() {
        let cli = parse(&["--seed", "word1 word2 word3"]);
        assert!(matches!(cli.into_config(), Err(ConfigError::PlaceholderSeed)));
    }
}
