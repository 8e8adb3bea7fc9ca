//! [`LocalEotsManager`]: an in-process reference implementation of the
//! external signer interface.
//!
//! BTC secret keys are held in an in-process keyring ([`fpd_crypto::keyring::Keyring`])
//! derived from a root seed, mirroring how a keyring-backed daemon derives its
//! signing key from a root `Xpriv` on disk. The same raw secret bytes also
//! seed the EOTS scheme in [`fpd_crypto::eots`] — one secret per provider,
//! reused consistently across proof-of-possession signing and finality
//! voting, rather than a second independently-derived key.

use std::collections::HashMap;
use std::sync::Mutex;

use bitcoin::Network;
use fpd_crypto::eots::{self, EotsSignature};
use fpd_crypto::keyring::{KeyKind, Keyring};
use fpd_crypto::schnorr;
use fpd_primitives::{Buf32, Buf64, ChainId};
use zeroize::Zeroizing;

use crate::error::{Result, SignerError};
use crate::traits::{EotsManager, NewKey};

pub struct LocalEotsManager {
    seed: Zeroizing<Vec<u8>>,
    keyring: Mutex<Keyring>,
    /// `btc_pk` (x-only point bytes) -> registered key name, so the trait's
    /// `btc_pk`-keyed methods can find the keyring entry they need.
    index: Mutex<HashMap<Buf32, String>>,
}

impl LocalEotsManager {
    pub fn from_seed(seed: &[u8], network: Network) -> Result<Self> {
        let keyring = Keyring::from_seed(seed, network)?;
        Ok(Self {
            seed: Zeroizing::new(seed.to_vec()),
            keyring: Mutex::new(keyring),
            index: Mutex::new(HashMap::new()),
        })
    }

    fn name_for(&self, btc_pk: &Buf32) -> Result<String> {
        self.index
            .lock()
            .expect("signer index mutex poisoned")
            .get(btc_pk)
            .cloned()
            .ok_or_else(|| SignerError::UnknownKey(btc_pk.to_string()))
    }
}

#[async_trait::async_trait]
impl EotsManager for LocalEotsManager {
    async fn create_key(&self, name: &str, hd_path: &str) -> Result<NewKey> {
        let handle = {
            let mut keyring = self.keyring.lock().expect("keyring mutex poisoned");
            keyring.create_key(name, hd_path)?
        };
        let babylon_pk = Buf32::from(handle.chain_pk.serialize());
        let btc_pk = Buf32::from(handle.btc_pk.serialize());

        self.index
            .lock()
            .expect("signer index mutex poisoned")
            .insert(btc_pk, name.to_string());

        Ok(NewKey { babylon_pk, btc_pk })
    }

    async fn sign_babylon(&self, btc_pk: &Buf32, msg: &[u8]) -> Result<Buf64> {
        let name = self.name_for(btc_pk)?;
        let keypair = {
            let keyring = self.keyring.lock().expect("keyring mutex poisoned");
            keyring.keypair_for(&name, KeyKind::Chain)?
        };
        Ok(schnorr::sign(&keypair, msg))
    }

    async fn sign_btc(&self, btc_pk: &Buf32, msg: &[u8]) -> Result<Buf64> {
        let name = self.name_for(btc_pk)?;
        let keypair = {
            let keyring = self.keyring.lock().expect("keyring mutex poisoned");
            keyring.keypair_for(&name, KeyKind::Btc)?
        };
        Ok(schnorr::sign(&keypair, msg))
    }

    async fn create_randomness_pair_list(
        &self,
        btc_pk: &Buf32,
        chain_id: &ChainId,
        start_height: u64,
        num: u64,
    ) -> Result<Vec<Buf32>> {
        let mut out = Vec::with_capacity(num as usize);
        for i in 0..num {
            let (pub_rand, _sec_rand) =
                eots::derive_randomness_pair(&self.seed, btc_pk, chain_id.as_bytes(), start_height + i);
            out.push(pub_rand);
        }
        Ok(out)
    }

    async fn sign_eots(
        &self,
        btc_pk: &Buf32,
        chain_id: &ChainId,
        height: u64,
        msg: &[u8],
    ) -> Result<EotsSignature> {
        let name = self.name_for(btc_pk)?;
        let (pub_rand, sec_rand) =
            eots::derive_randomness_pair(&self.seed, btc_pk, chain_id.as_bytes(), height);
        let privkey = self.local_privkey(&name)?;
        Ok(eots::sign_eots(&sec_rand, &privkey, &pub_rand, btc_pk, msg))
    }

    async fn extracted_key_is_ours(&self, btc_pk: &Buf32, extracted: &Buf32) -> Result<bool> {
        let name = self.name_for(btc_pk)?;
        let local = self.local_privkey(&name)?;
        let extracted = match eots::scalar_from_secret_bytes(extracted.as_bytes()) {
            Some(s) => s,
            None => return Ok(false),
        };
        let neg_local = -local;
        Ok(extracted == local || extracted == neg_local)
    }
}

impl LocalEotsManager {
    /// The raw BTC secret scalar for `name`, reduced into `k256`'s scalar
    /// field for use by [`fpd_crypto::eots`].
    fn local_privkey(&self, name: &str) -> Result<k256::Scalar> {
        let bytes = {
            let keyring = self.keyring.lock().expect("keyring mutex poisoned");
            keyring.secret_bytes_for(name, KeyKind::Btc)?
        };
        eots::scalar_from_secret_bytes(&bytes).ok_or(SignerError::UnknownKey(name.to_string()))
    }
}
