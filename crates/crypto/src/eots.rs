//! Extractable One-Time Signatures.
//!
//! `(pub_rand, sec_rand)` is derived deterministically from a root seed so
//! that a crash-and-restart regenerates byte-identical pairs for heights
//! already committed on chain — there is no RNG anywhere in this module.
//! Signing twice with the same `sec_rand` over different messages leaks the
//! signer's secret key (`extract_secret_key`); that's the "extractable" part,
//! and it's what makes an equivocating finality vote provably attributable.

use hmac::{Hmac, Mac};
use k256::{
    elliptic_curve::{ops::Reduce, point::AffineCoordinates, Field, PrimeField},
    FieldBytes, ProjectivePoint, Scalar, U256,
};
use sha2::{Digest, Sha256};

use fpd_primitives::Buf32;

use crate::error::{CryptoError, Result};

type HmacSha256 = Hmac<Sha256>;

/// A one-time signing nonce. Zeroized on drop; never serialized.
#[derive(Clone)]
pub struct SecRand(Scalar);

impl Drop for SecRand {
    fn drop(&mut self) {
        self.0 = Scalar::ZERO;
    }
}

impl SecRand {
    pub fn scalar(&self) -> &Scalar {
        &self.0
    }
}

/// The x-only point corresponding to a [`SecRand`]; safe to publish and log.
pub type PubRand = Buf32;

/// An EOTS signature: `(R, s)` with `R` the public randomness point used and
/// `s` the scalar response. 64 bytes on the wire (`r || s`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EotsSignature {
    pub r: Buf32,
    pub s: Buf32,
}

impl EotsSignature {
    pub fn to_bytes(self) -> [u8; 64] {
        let mut buf = [0u8; 64];
        buf[..32].copy_from_slice(self.r.as_bytes());
        buf[32..].copy_from_slice(self.s.as_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        Self {
            r: Buf32::from(<[u8; 32]>::try_from(&bytes[..32]).expect("slice is 32 bytes")),
            s: Buf32::from(<[u8; 32]>::try_from(&bytes[32..]).expect("slice is 32 bytes")),
        }
    }
}

fn hash_to_scalar(data: &[u8]) -> Scalar {
    let digest = Sha256::digest(data);
    let bytes = FieldBytes::clone_from_slice(&digest);
    <Scalar as Reduce<U256>>::reduce_bytes(&bytes)
}

pub fn scalar_to_buf32(s: &Scalar) -> Buf32 {
    Buf32::from(<[u8; 32]>::from(s.to_repr()))
}

fn point_x(point: &ProjectivePoint) -> Buf32 {
    let affine = point.to_affine();
    Buf32::from(<[u8; 32]>::from(affine.x()))
}

/// The x-only public key corresponding to a secret scalar. The x
/// coordinate of a point is invariant under negation (`P` and `-P` share an
/// `x`), so this is safe to use on a raw secp256k1 secret key without first
/// reconciling BIP-340 parity.
pub fn scalar_from_secret_bytes(bytes: &[u8; 32]) -> Option<Scalar> {
    let repr = FieldBytes::clone_from_slice(bytes);
    Option::from(Scalar::from_repr(repr))
}

/// The x-only public key corresponding to a secret scalar.
pub fn pubkey_x(privkey: &Scalar) -> Buf32 {
    point_x(&(ProjectivePoint::GENERATOR * privkey))
}

/// The full public point corresponding to a secret scalar, as needed by
/// [`verify_eots`].
pub fn pubkey_point(privkey: &Scalar) -> ProjectivePoint {
    ProjectivePoint::GENERATOR * privkey
}

/// Derives `sec_rand` for `(btc_pk, chain_id, height)` from a root seed via
/// `HMAC-SHA256(root_seed, btc_pk || chain_id || height)`, reduced mod the
/// curve order. Deterministic: the same inputs always yield the same pair.
pub fn derive_randomness_pair(
    root_seed: &[u8],
    btc_pk: &Buf32,
    chain_id: &[u8],
    height: u64,
) -> (PubRand, SecRand) {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(root_seed).expect("HMAC accepts any key length");
    mac.update(btc_pk.as_bytes());
    mac.update(chain_id);
    mac.update(&height.to_be_bytes());
    let mut digest = mac.finalize().into_bytes();

    let sec_rand = hash_to_scalar(&digest);
    digest.as_mut_slice().iter_mut().for_each(|b| *b = 0);

    let pub_rand_point = ProjectivePoint::GENERATOR * sec_rand;
    let pub_rand = point_x(&pub_rand_point);

    (pub_rand, SecRand(sec_rand))
}

fn challenge(r: &Buf32, pk: &Buf32, msg: &[u8]) -> Scalar {
    let mut data = Vec::with_capacity(32 + 32 + msg.len());
    data.extend_from_slice(r.as_bytes());
    data.extend_from_slice(pk.as_bytes());
    data.extend_from_slice(msg);
    hash_to_scalar(&data)
}

/// Builds `s = sec_rand + e * sk` for `e = hash(R || pk || msg)`.
pub fn sign_eots(sec_rand: &SecRand, privkey: &Scalar, pub_rand: &PubRand, pk_x: &Buf32, msg: &[u8]) -> EotsSignature {
    let e = challenge(pub_rand, pk_x, msg);
    let s = sec_rand.0 + e * privkey;
    EotsSignature {
        r: *pub_rand,
        s: scalar_to_buf32(&s),
    }
}

/// Verifies an EOTS signature: checks `s*G == R + e*P`.
pub fn verify_eots(sig: &EotsSignature, pk_point: &ProjectivePoint, msg: &[u8]) -> bool {
    let Some(s) = scalar_from_buf32(&sig.s) else {
        return false;
    };
    let e = challenge(&sig.r, &point_x(pk_point), msg);

    let lhs = ProjectivePoint::GENERATOR * s;
    let rhs_r = match pub_rand_to_point(&sig.r) {
        Some(p) => p,
        None => return false,
    };
    let rhs = rhs_r + *pk_point * e;
    lhs == rhs
}

fn scalar_from_buf32(buf: &Buf32) -> Option<Scalar> {
    let repr: FieldBytes = FieldBytes::clone_from_slice(buf.as_bytes());
    Option::from(Scalar::from_repr(repr))
}

/// Lifts an x-only point back onto the curve, assuming even `y` (BIP-340
/// convention). Used only by [`verify_eots`]; derivation never needs it
/// since it works forward from the generator.
fn pub_rand_to_point(x: &Buf32) -> Option<ProjectivePoint> {
    use k256::{elliptic_curve::sec1::FromEncodedPoint, AffinePoint, EncodedPoint};
    let mut compressed = [0u8; 33];
    compressed[0] = 0x02;
    compressed[1..].copy_from_slice(x.as_bytes());
    let encoded = EncodedPoint::from_bytes(compressed).ok()?;
    let affine: Option<AffinePoint> = Option::from(AffinePoint::from_encoded_point(&encoded));
    affine.map(ProjectivePoint::from)
}

/// Recovers the signer's secret key from two EOTS signatures that share the
/// same public randomness `R` but were made over different messages:
/// `x = (s1 - s2) / (e1 - e2) mod n`. This is the Equivocation Detector's
/// core primitive.
pub fn extract_secret_key(
    sig1: &EotsSignature,
    msg1: &[u8],
    sig2: &EotsSignature,
    msg2: &[u8],
    pk_x: &Buf32,
) -> Result<Scalar> {
    if sig1.r != sig2.r {
        return Err(CryptoError::MismatchedRandomness);
    }
    if msg1 == msg2 {
        return Err(CryptoError::IdenticalChallenge);
    }

    let s1 = scalar_from_buf32(&sig1.s).ok_or(CryptoError::InvalidSecretKey)?;
    let s2 = scalar_from_buf32(&sig2.s).ok_or(CryptoError::InvalidSecretKey)?;
    let e1 = challenge(&sig1.r, pk_x, msg1);
    let e2 = challenge(&sig2.r, pk_x, msg2);

    let e_diff = e1 - e2;
    let inv_e_diff: Option<Scalar> = Option::from(e_diff.invert());
    let inv_e_diff = inv_e_diff.ok_or(CryptoError::IdenticalChallenge)?;

    Ok((s1 - s2) * inv_e_diff)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_privkey() -> Scalar {
        hash_to_scalar(b"test signer secret")
    }

    fn test_pubkey(sk: &Scalar) -> (ProjectivePoint, Buf32) {
        let point = ProjectivePoint::GENERATOR * sk;
        let x = point_x(&point);
        (point, x)
    }

    #[test]
    fn derivation_is_deterministic() {
        let seed = b"root seed material";
        let pk = Buf32::zero();
        let (r1, _) = derive_randomness_pair(seed, &pk, b"chain-a", 100);
        let (r2, _) = derive_randomness_pair(seed, &pk, b"chain-a", 100);
        assert_eq!(r1, r2);
    }

    #[test]
    fn derivation_differs_by_height() {
        let seed = b"root seed material";
        let pk = Buf32::zero();
        let (r1, _) = derive_randomness_pair(seed, &pk, b"chain-a", 100);
        let (r2, _) = derive_randomness_pair(seed, &pk, b"chain-a", 101);
        assert_ne!(r1, r2);
    }

    #[test]
    fn sign_then_verify_roundtrip() {
        let sk = test_privkey();
        let (pk_point, pk_x) = test_pubkey(&sk);
        let (pub_rand, sec_rand) = derive_randomness_pair(b"seed", &pk_x, b"chain-a", 5);

        let sig = sign_eots(&sec_rand, &sk, &pub_rand, &pk_x, b"app-hash-1");
        assert!(verify_eots(&sig, &pk_point, b"app-hash-1"));
        assert!(!verify_eots(&sig, &pk_point, b"app-hash-2"));
    }

    #[test]
    fn reusing_sec_rand_leaks_secret_key() {
        let sk = test_privkey();
        let (_, pk_x) = test_pubkey(&sk);
        let (pub_rand, sec_rand) = derive_randomness_pair(b"seed", &pk_x, b"chain-a", 5);

        let sig1 = sign_eots(&sec_rand, &sk, &pub_rand, &pk_x, b"block-hash-a");
        let sig2 = sign_eots(&sec_rand, &sk, &pub_rand, &pk_x, b"block-hash-b");

        let recovered = extract_secret_key(&sig1, b"block-hash-a", &sig2, b"block-hash-b", &pk_x)
            .expect("extraction succeeds for conflicting votes");
        assert_eq!(recovered, sk);
    }

    #[test]
    fn extraction_rejects_mismatched_randomness() {
        let sk = test_privkey();
        let (_, pk_x) = test_pubkey(&sk);
        let (pub_rand_a, sec_rand_a) = derive_randomness_pair(b"seed", &pk_x, b"chain-a", 5);
        let (pub_rand_b, sec_rand_b) = derive_randomness_pair(b"seed", &pk_x, b"chain-a", 6);

        let sig1 = sign_eots(&sec_rand_a, &sk, &pub_rand_a, &pk_x, b"msg-a");
        let sig2 = sign_eots(&sec_rand_b, &sk, &pub_rand_b, &pk_x, b"msg-b");

        let err = extract_secret_key(&sig1, b"msg-a", &sig2, b"msg-b", &pk_x).unwrap_err();
        assert!(matches!(err, CryptoError::MismatchedRandomness));
    }
}
