//! Ordinary BIP-340 Schnorr signing, used for proof-of-possession and for
//! the two consumer-chain signature surfaces (`SignBabylon`/`SignBtc`).
//! Unlike [`crate::eots`] this is a standard single-round signature with a
//! fresh nonce per call — there is nothing extractable about it.

use bitcoin::secp256k1::{self, Keypair, Message, Secp256k1, XOnlyPublicKey};
use sha2::{Digest, Sha256};

use fpd_primitives::Buf64;

use crate::error::{CryptoError, Result};

fn message_digest(msg: &[u8]) -> Message {
    let digest = Sha256::digest(msg);
    Message::from_digest(digest.into())
}

/// Signs an arbitrary message with a BIP-340 Schnorr signature.
pub fn sign(keypair: &Keypair, msg: &[u8]) -> Buf64 {
    let secp = Secp256k1::signing_only();
    let message = message_digest(msg);
    let sig = secp.sign_schnorr(&message, keypair);
    Buf64::from(sig.serialize())
}

/// Verifies a BIP-340 Schnorr signature produced by [`sign`].
pub fn verify(pk: &XOnlyPublicKey, msg: &[u8], sig: &Buf64) -> Result<()> {
    let secp = Secp256k1::verification_only();
    let message = message_digest(msg);
    let sig = secp256k1::schnorr::Signature::from_slice(sig.as_bytes())
        .map_err(|_| CryptoError::InvalidSecretKey)?;
    secp.verify_schnorr(&sig, &message, pk)
        .map_err(|_| CryptoError::InvalidSecretKey)
}
