//! The external signer interface, consumed by the core actor and
//! the supervisor. [`crate::LocalEotsManager`] is the reference
//! implementation used for local development and every test in this repo.

use async_trait::async_trait;
use fpd_crypto::eots::EotsSignature;
use fpd_primitives::{Buf32, Buf64, ChainId};

use crate::error::Result;

/// The two public keys returned by `CreateKey`: the consumer
/// chain's native key and a parallel BTC key used for proof-of-possession.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewKey {
    pub babylon_pk: Buf32,
    pub btc_pk: Buf32,
}

#[async_trait]
pub trait EotsManager: Send + Sync {
    /// Derives a new keypair pair for `(name, hd_path)` and registers it.
    /// Idempotent: calling again with the same `name` and `hd_path` returns
    /// the same keys.
    async fn create_key(&self, name: &str, hd_path: &str) -> Result<NewKey>;

    /// Schnorr-signs `msg` with the chain-native key registered for
    /// `btc_pk` (used for the `babylon_sig` half of a PoP).
    async fn sign_babylon(&self, btc_pk: &Buf32, msg: &[u8]) -> Result<Buf64>;

    /// Schnorr-signs `msg` with the BTC key for `btc_pk` (used for the
    /// `btc_sig` half of a PoP, signing over `babylon_sig`).
    async fn sign_btc(&self, btc_pk: &Buf32, msg: &[u8]) -> Result<Buf64>;

    /// Deterministically derives `num` public randomness values for
    /// `[start_height, start_height + num)`. The matching secret nonces
    /// never leave this implementation; callers later request signatures
    /// over them by height via [`Self::sign_eots`].
    async fn create_randomness_pair_list(
        &self,
        btc_pk: &Buf32,
        chain_id: &ChainId,
        start_height: u64,
        num: u64,
    ) -> Result<Vec<Buf32>>;

    /// Produces the EOTS signature over `msg` at `height`, using the
    /// `sec_rand` committed for `(btc_pk, chain_id, height)`. Signing two
    /// different `msg`s at the same height is what makes the secret key
    /// extractable (see `fpd_crypto::eots::extract_secret_key`).
    async fn sign_eots(
        &self,
        btc_pk: &Buf32,
        chain_id: &ChainId,
        height: u64,
        msg: &[u8],
    ) -> Result<EotsSignature>;

    /// Does `extracted` match this signer's local secret key for `btc_pk`,
    /// up to the sign ambiguity inherent in x-only keys (`extracted ==
    /// local || extracted == -local`)?
    async fn extracted_key_is_ours(&self, btc_pk: &Buf32, extracted: &Buf32) -> Result<bool>;
}
