//! The persisted provider record and its status lifecycle.
//!
//! These types are shared by the store, the core actor, the supervisor, and
//! the RPC surface, so they live in `fpd-primitives` rather than in any one
//! of those crates.

use serde::{Deserialize, Serialize};

use crate::block::ChainId;
use crate::buf::{Buf32, Buf64};

/// Proof of possession binding a provider's two public keys:
/// `babylon_sig = sign_babylon(pk_btc)`, `btc_sig = sign_btc(babylon_sig)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofOfPossession {
    pub babylon_sig: Buf64,
    pub btc_sig: Buf64,
}

/// Lifecycle status of a provider record.
///
/// Serialized as its variant name (`"ACTIVE"`, `"SLASHED"`, ...) everywhere
/// it crosses a wire boundary (store encoding, RPC responses).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderStatus {
    Created,
    Registered,
    Active,
    Inactive,
    Slashed,
}

impl ProviderStatus {
    /// Whether `self -> next` is one of the allowed lifecycle transitions.
    pub fn can_transition_to(self, next: ProviderStatus) -> bool {
        use ProviderStatus::*;
        match (self, next) {
            (_, Slashed) => self != Slashed,
            (Created, Registered) => true,
            (Registered, Active) => true,
            (Active, Inactive) | (Inactive, Active) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProviderStatus::Slashed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderStatus::Created => "CREATED",
            ProviderStatus::Registered => "REGISTERED",
            ProviderStatus::Active => "ACTIVE",
            ProviderStatus::Inactive => "INACTIVE",
            ProviderStatus::Slashed => "SLASHED",
        }
    }
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A finality provider record, keyed by `btc_pk` in the store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRecord {
    pub babylon_pk: Buf32,
    pub btc_pk: Buf32,
    pub key_name: String,
    pub chain_id: ChainId,
    pub description: String,
    /// Commission, in basis points (0..=10_000), matching how the staking
    /// side of the protocol represents fractional fees without floats.
    pub commission: u32,
    pub pop: ProofOfPossession,
    pub last_voted_height: u64,
    pub last_processed_height: u64,
    pub status: ProviderStatus,
}

impl ProviderRecord {
    pub fn new(
        babylon_pk: Buf32,
        btc_pk: Buf32,
        key_name: String,
        chain_id: ChainId,
        description: String,
        commission: u32,
        pop: ProofOfPossession,
    ) -> Self {
        Self {
            babylon_pk,
            btc_pk,
            key_name,
            chain_id,
            description,
            commission,
            pop,
            last_voted_height: 0,
            last_processed_height: 0,
            status: ProviderStatus::Created,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slashed_is_terminal_and_transitions_are_restricted() {
        use ProviderStatus::*;
        assert!(Created.can_transition_to(Registered));
        assert!(Registered.can_transition_to(Active));
        assert!(Active.can_transition_to(Inactive));
        assert!(Inactive.can_transition_to(Active));
        assert!(Active.can_transition_to(Slashed));
        assert!(Inactive.can_transition_to(Slashed));
        assert!(Registered.can_transition_to(Slashed));
        assert!(Created.can_transition_to(Slashed));

        assert!(!Created.can_transition_to(Active));
        assert!(!Slashed.can_transition_to(Active));
        assert!(!Slashed.can_transition_to(Registered));
        assert!(!Active.can_transition_to(Created));
    }

    #[test]
    fn status_displays_as_variant_name() {
        assert_eq!(ProviderStatus::Active.to_string(), "ACTIVE");
        assert_eq!(ProviderStatus::Slashed.to_string(), "SLASHED");
    }
}
