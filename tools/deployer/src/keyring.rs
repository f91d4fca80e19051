//! Deployer keyring and the signer abstraction.
//!
//! Accounts are derived from a secret URI (`<phrase>//hard/soft///password`) as sr25519 keys,
//! the scheme Vara accounts use. The account id is the 32-byte public key.

use std::{fmt, str::FromStr};

use alloy_primitives::Bytes;
use async_trait::async_trait;
use growstreams_types::ActorId;
use regex::Regex;
use subxt_signer::sr25519;

use crate::error::SignerError;

/// Phrase used when a URI carries only a derivation path (eg `//Alice`).
pub const DEV_PHRASE: &str =
    "bottom drive obey lake curtain smoke basket hold race lonely fit walk";

const PLACEHOLDERS: [&str; 3] = ["word1 word2", "your_seed_phrase_here", "your seed phrase"];
const MNEMONIC_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];

/// Anything able to produce a signature for an account: the deployer's keyring, or a wallet
/// extension on the client side.
#[async_trait]
pub trait Signer: Send + Sync {
    fn account(&self) -> ActorId;

    fn public_key(&self) -> Bytes;

    async fn sign(&self, message: &[u8]) -> Result<Bytes, SignerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum KeyringError {
    #[error("signer credential is a placeholder; set VARA_SEED to a real seed phrase or URI")]
    Placeholder,
    #[error("invalid secret URI")]
    InvalidSuri,
    #[error("invalid phrase: expected 12, 15, 18, 21 or 24 words, or a 0x-prefixed 32-byte seed")]
    InvalidPhrase,
    #[error("failed deriving sr25519 key: {0}")]
    Derivation(String),
    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Junction {
    Hard(String),
    Soft(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct SecretUri {
    pub phrase: String,
    pub junctions: Vec<Junction>,
    pub password: Option<String>,
}

impl fmt::Debug for SecretUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretUri")
            .field("junctions", &self.junctions)
            .finish_non_exhaustive()
    }
}

impl FromStr for SecretUri {
    type Err = KeyringError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if is_placeholder(s) {
            return Err(KeyringError::Placeholder);
        }

        let re = Regex::new(r"^(?P<phrase>[\w ]+)?(?P<path>(//?[^/]+)*)(///(?P<password>.*))?$")?;
        let caps = re.captures(s).ok_or(KeyringError::InvalidSuri)?;

        let phrase = caps.name("phrase").map(|m| m.as_str().trim()).unwrap_or("");
        let phrase = if phrase.is_empty() { DEV_PHRASE } else { phrase };
        if !is_valid_phrase(phrase) {
            return Err(KeyringError::InvalidPhrase);
        }

        let junction_re = Regex::new(r"/(/?[^/]+)")?;
        let path = caps.name("path").map(|m| m.as_str()).unwrap_or("");
        let junctions = junction_re
            .captures_iter(path)
            .filter_map(|c| c.get(1))
            .map(|m| match m.as_str().strip_prefix('/') {
                Some(hard) => Junction::Hard(hard.to_string()),
                None => Junction::Soft(m.as_str().to_string()),
            })
            .collect();

        Ok(Self {
            phrase: phrase.to_string(),
            junctions,
            password: caps.name("password").map(|m| m.as_str().to_string()),
        })
    }
}

/// Template values from sample `.env` files.
pub fn is_placeholder(suri: &str) -> bool {
    PLACEHOLDERS.iter().any(|p| suri.contains(p))
}

fn is_valid_phrase(phrase: &str) -> bool {
    if let Some(seed) = phrase.strip_prefix("0x") {
        return seed.len() == 64 && seed.bytes().all(|b| b.is_ascii_hexdigit());
    }
    let words: Vec<&str> = phrase.split_whitespace().collect();
    MNEMONIC_WORD_COUNTS.contains(&words.len())
        && words
            .iter()
            .all(|w| w.chars().all(|c| c.is_ascii_lowercase()))
}

impl SecretUri {
    /// Canonical URI text, handed to the sr25519 derivation.
    fn expose(&self) -> String {
        let mut uri = self.phrase.clone();
        for junction in &self.junctions {
            match junction {
                Junction::Hard(name) => uri.push_str(&format!("//{name}")),
                Junction::Soft(name) => uri.push_str(&format!("/{name}")),
            }
        }
        if let Some(password) = &self.password {
            uri.push_str(&format!("///{password}"));
        }
        uri
    }
}

/// A local sr25519 key derived from a secret URI.
pub struct Keyring {
    pair: sr25519::Keypair,
    account: ActorId,
}

impl Keyring {
    pub fn from_suri(suri: &str) -> Result<Self, KeyringError> {
        Self::from_uri(&suri.parse()?)
    }

    pub fn from_uri(uri: &SecretUri) -> Result<Self, KeyringError> {
        let derivation = subxt_signer::SecretUri::from_str(&uri.expose())
            .map_err(|err| KeyringError::Derivation(err.to_string()))?;
        let pair = sr25519::Keypair::from_uri(&derivation)
            .map_err(|err| KeyringError::Derivation(err.to_string()))?;
        let account = ActorId::new(pair.public_key().0);
        Ok(Self { pair, account })
    }
}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyring")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Signer for Keyring {
    fn account(&self) -> ActorId {
        self.account
    }

    fn public_key(&self) -> Bytes {
        Bytes::copy_from_slice(self.account.as_slice())
    }

    async fn sign(&self, message: &[u8]) -> Result<Bytes, SignerError> {
        Ok(Bytes::copy_from_slice(&self.pair.sign(message).0))
    }
}

/// Account owning `public_key`, if it is a 32-byte sr25519 key.
pub fn account_id_for(public_key: &[u8]) -> Option<ActorId> {
    <[u8; 32]>::try_from(public_key).ok().map(ActorId::new)
}

pub fn verify_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let (Ok(public_key), Ok(signature)) = (
        <[u8; 32]>::try_from(public_key),
        <[u8; 64]>::try_from(signature),
    ) else {
        return false;
    };
    sr25519::verify(
        &sr25519::Signature(signature),
        message,
        &sr25519::PublicKey(public_key),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dev_uri_with_junctions_and_password() {
        let uri: SecretUri = "//Alice/soft///secret".parse().unwrap();
        assert_eq!(uri.phrase, DEV_PHRASE);
        assert_eq!(
            uri.junctions,
            vec![Junction::Hard("Alice".into()), Junction::Soft("soft".into())]
        );
        assert_eq!(uri.password.as_deref(), Some("secret"));
    }

    #[test]
    fn rejects_placeholders_and_bad_phrases() {
        assert!(matches!(
            "word1 word2 word3".parse::<SecretUri>(),
            Err(KeyringError::Placeholder)
        ));
        assert!(matches!(
            "only three words".parse::<SecretUri>(),
            Err(KeyringError::InvalidPhrase)
        ));
    }

    #[test]
    fn dev_accounts_match_the_substrate_keyring() {
        let alice = Keyring::from_suri("//Alice").unwrap();
        assert_eq!(
            alice.account().to_string(),
            "0xd43593c715fdd31c61141abd04a99fd6822c8558854ccde39a5684e7a56da27d"
        );
        let bob = Keyring::from_suri(&format!("{DEV_PHRASE}//Bob")).unwrap();
        assert_eq!(
            bob.account().to_string(),
            "0x8eaf04151687736326c9fea17e25fc5287613693c912909cb226aa4794f26a48"
        );
    }

    #[test]
    fn accepts_hex_seed() {
        let seed = format!("0x{}", "42".repeat(32));
        assert!(Keyring::from_suri(&seed).is_ok());
    }

    #[tokio::test]
    async fn derivation_is_deterministic_and_signatures_verify() {
        let alice = Keyring::from_suri("//Alice").unwrap();
        let again = Keyring::from_suri("//Alice").unwrap();
        let bob = Keyring::from_suri("//Bob").unwrap();
        assert_eq!(alice.account(), again.account());
        assert_ne!(alice.account(), bob.account());
        assert_eq!(Some(alice.account()), account_id_for(&alice.public_key()));

        let sig = alice.sign(b"payload").await.unwrap();
        assert!(verify_signature(&alice.public_key(), b"payload", &sig));
        assert!(!verify_signature(&bob.public_key(), b"payload", &sig));
        assert!(!verify_signature(&alice.public_key(), b"other", &sig));
    }
}
