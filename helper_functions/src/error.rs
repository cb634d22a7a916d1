use derive_more::Display;
use thiserror::Error;
use types::phase0::primitives::{Slot, ValidatorIndex};

#[derive(Debug, Error)]
pub(crate) enum Error {
    #[error("attestation has no attesting indices")]
    AttestationHasNoAttestingIndices,
    #[error("attesting indices are not sorted and unique")]
    AttestingIndicesNotSortedAndUnique,
    #[error("epoch number overflowed")]
    EpochOverflow,
    #[error("failed to select proposer")]
    FailedToSelectProposer,
    #[error("no validators are active")]
    NoActiveValidators,
    #[error("{0} is invalid")]
    SignatureInvalid(SignatureKind),
    #[error("slot is out of range: {slot}")]
    SlotOutOfRange { slot: Slot },
    #[error("validator index is out of bounds: {index}")]
    ValidatorIndexOutOfBounds { index: ValidatorIndex },
}

#[derive(Debug, Display)]
pub enum SignatureKind {
    #[display("attestation signature")]
    Attestation,
    #[display("block signature")]
    Block,
    #[display("deposit signature")]
    Deposit,
    #[display("collection of multiple signatures")]
    Multi,
    #[display("RANDAO reveal")]
    Randao,
    #[display("voluntary exit signature")]
    VoluntaryExit,
}
