//! Small helpers shared between the instance loop and the fast-sync engine.

use fpd_primitives::{Buf32, ChainId};
use fpd_signer::EotsManager;

use crate::error::Result;

/// Re-derives the single deterministic `pub_rand` value for `(btc_pk,
/// chain_id, height)`. Cheap and side-effect free, so callers re-derive it
/// on demand rather than threading it through from the scheduler.
pub(crate) async fn single_pub_rand(
    signer: &dyn EotsManager,
    btc_pk: &Buf32,
    chain_id: &ChainId,
    height: u64,
) -> Result<Buf32> {
    let mut list = signer
        .create_randomness_pair_list(btc_pk, chain_id, height, 1)
        .await?;
    Ok(list.remove(0))
}
