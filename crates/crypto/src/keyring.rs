//! In-process keyring deriving named BTC keypairs from a single root
//! extended private key, mirroring how the daemon derives its signing key
//! from a root `Xpriv` on disk. Only derivation paths are persisted by
//! callers ([`fpd_store`]); the root secret and all derived secrets live in
//! memory only, for the lifetime of the process.

use std::collections::HashMap;
use std::str::FromStr;

use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv};
use bitcoin::secp256k1::{Keypair, Secp256k1, XOnlyPublicKey};
use zeroize::Zeroize;

use crate::error::{CryptoError, Result};

/// Wraps a root `Xpriv` so it's zeroized when the keyring is dropped.
struct RootKey(Xpriv);

impl Drop for RootKey {
    fn drop(&mut self) {
        let mut bytes = self.0.private_key.secret_bytes();
        bytes.zeroize();
    }
}

pub struct Keyring {
    root: RootKey,
    secp: Secp256k1<bitcoin::secp256k1::All>,
    paths: HashMap<String, DerivationPath>,
}

/// The two public keys returned by `CreateKey`: the chain's native key and a
/// parallel BTC key used for proof-of-possession. Both are secp256k1
/// x-only keys here since the consumer chain's native key scheme is out of
/// scope for this daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyPairHandle {
    pub chain_pk: XOnlyPublicKey,
    pub btc_pk: XOnlyPublicKey,
}

impl Keyring {
    pub fn from_root_xpriv(root: Xpriv) -> Self {
        Self {
            root: RootKey(root),
            secp: Secp256k1::new(),
            paths: HashMap::new(),
        }
    }

    pub fn from_seed(seed: &[u8], network: bitcoin::Network) -> Result<Self> {
        let root =
            Xpriv::new_master(network, seed).map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Self::from_root_xpriv(root))
    }

    /// Derives a keypair at `hd_path` and registers it under `name`. Calling
    /// this again with the same name and path is idempotent; a different
    /// path for an existing name is rejected.
    pub fn create_key(&mut self, name: &str, hd_path: &str) -> Result<KeyPairHandle> {
        let chain_path = DerivationPath::from_str(hd_path)
            .map_err(|e| CryptoError::InvalidDerivationPath(e.to_string()))?;
        // A parallel path for the proof-of-possession key, siblings under the
        // same account: .../0 for the chain key, .../1 for the BTC key.
        let btc_path = chain_path.child(ChildNumber::from_normal_idx(1).expect("1 is a valid index"));

        if let Some(existing) = self.paths.get(name) {
            if *existing != chain_path {
                return Err(CryptoError::InvalidDerivationPath(format!(
                    "key {name} already registered under a different path"
                )));
            }
        } else {
            self.paths.insert(name.to_string(), chain_path.clone());
        }

        let chain_xpriv = self
            .root
            .0
            .derive_priv(&self.secp, &chain_path)
            .map_err(|_| CryptoError::InvalidSecretKey)?;
        let btc_xpriv = self
            .root
            .0
            .derive_priv(&self.secp, &btc_path)
            .map_err(|_| CryptoError::InvalidSecretKey)?;

        let chain_keypair = Keypair::from_secret_key(&self.secp, &chain_xpriv.private_key);
        let btc_keypair = Keypair::from_secret_key(&self.secp, &btc_xpriv.private_key);

        Ok(KeyPairHandle {
            chain_pk: chain_keypair.x_only_public_key().0,
            btc_pk: btc_keypair.x_only_public_key().0,
        })
    }

    /// Recovers the signing keypair for an already-created key, by name.
    pub fn keypair_for(&self, name: &str, which: KeyKind) -> Result<Keypair> {
        let chain_path = self
            .paths
            .get(name)
            .ok_or_else(|| CryptoError::InvalidDerivationPath(format!("unknown key {name}")))?;
        let path = match which {
            KeyKind::Chain => chain_path.clone(),
            KeyKind::Btc => chain_path.child(ChildNumber::from_normal_idx(1).expect("1 is a valid index")),
        };
        let xpriv = self
            .root
            .0
            .derive_priv(&self.secp, &path)
            .map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(Keypair::from_secret_key(&self.secp, &xpriv.private_key))
    }

    /// The raw 32-byte secret for an already-created key, by name. Used by
    /// [`fpd_signer`](../../fpd_signer/index.html) to seed the EOTS scheme
    /// with the same secret used for on-chain proof-of-possession.
    pub fn secret_bytes_for(&self, name: &str, which: KeyKind) -> Result<[u8; 32]> {
        let chain_path = self
            .paths
            .get(name)
            .ok_or_else(|| CryptoError::InvalidDerivationPath(format!("unknown key {name}")))?;
        let path = match which {
            KeyKind::Chain => chain_path.clone(),
            KeyKind::Btc => chain_path.child(ChildNumber::from_normal_idx(1).expect("1 is a valid index")),
        };
        let xpriv = self
            .root
            .0
            .derive_priv(&self.secp, &path)
            .map_err(|_| CryptoError::InvalidSecretKey)?;
        Ok(xpriv.private_key.secret_bytes())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Chain,
    Btc,
}
