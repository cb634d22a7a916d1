use core::mem::size_of;
use core::num::NonZeroU64;

use blst::{
    min_pk::{AggregateSignature as RawAggregateSignature, Signature as RawSignature},
    blst_scalar, BLST_ERROR,
};
use derive_more::From;
use itertools::Itertools as _;
use rand::Rng as _;

use crate::{Error, PublicKey, SignatureBytes, DOMAIN_SEPARATION_TAG};

const MULTI_VERIFY_RANDOM_BYTES: usize = size_of::<NonZeroU64>();
const MULTI_VERIFY_RANDOM_BITS: usize = MULTI_VERIFY_RANDOM_BYTES * 8;

#[derive(Clone, Copy, PartialEq, Eq, Debug, From)]
pub struct Signature(RawSignature);

impl TryFrom<SignatureBytes> for Signature {
    type Error = Error;

    #[inline]
    fn try_from(bytes: SignatureBytes) -> Result<Self, Self::Error> {
        let raw =
            RawSignature::uncompress(bytes.as_bytes()).map_err(|_| Error::InvalidSignature)?;

        raw.validate(true).map_err(|_| Error::InvalidSignature)?;

        Ok(Self(raw))
    }
}

impl Signature {
    #[inline]
    #[must_use]
    pub fn verify(&self, message: impl AsRef<[u8]>, public_key: PublicKey) -> bool {
        let result = self.as_raw().verify(
            false,
            message.as_ref(),
            DOMAIN_SEPARATION_TAG,
            &[],
            public_key.as_raw(),
            false,
        );

        result == BLST_ERROR::BLST_SUCCESS
    }

    #[must_use]
    pub fn fast_aggregate_verify<'keys>(
        &self,
        message: impl AsRef<[u8]>,
        public_keys: impl IntoIterator<Item = &'keys PublicKey>,
    ) -> bool {
        let public_keys = public_keys
            .into_iter()
            .map(PublicKey::as_raw)
            .collect_vec();

        let result = self.as_raw().fast_aggregate_verify(
            false,
            message.as_ref(),
            DOMAIN_SEPARATION_TAG,
            public_keys.as_slice(),
        );

        result == BLST_ERROR::BLST_SUCCESS
    }

    #[inline]
    pub fn aggregate_in_place(&mut self, other: Self) {
        let mut self_aggregate = RawAggregateSignature::from_signature(self.as_raw());
        let other_aggregate = RawAggregateSignature::from_signature(other.as_raw());
        self_aggregate.add_aggregate(&other_aggregate);
        self.0 = self_aggregate.to_signature();
    }

    /// Verifies multiple aggregate signatures in a single pairing computation.
    ///
    /// <https://ethresear.ch/t/fast-verification-of-multiple-bls-signatures/5407>
    #[must_use]
    pub fn multi_verify<'all>(
        messages: impl IntoIterator<Item = &'all [u8]>,
        signatures: impl IntoIterator<Item = &'all Self>,
        public_keys: impl IntoIterator<Item = &'all PublicKey>,
    ) -> bool {
        let messages = messages.into_iter().collect_vec();
        let signatures = signatures.into_iter().map(Self::as_raw).collect_vec();
        let public_keys = public_keys
            .into_iter()
            .map(PublicKey::as_raw)
            .collect_vec();

        let mut rng = rand::thread_rng();

        // The scalars must be nonzero. A zero scalar would make the
        // corresponding signature pass verification regardless of contents.
        let rands = signatures
            .iter()
            .map(|_| {
                let mut blinding = [0; 32];
                let random = rng.gen::<NonZeroU64>();
                blinding[..MULTI_VERIFY_RANDOM_BYTES].copy_from_slice(&random.get().to_le_bytes());
                blst_scalar { b: blinding }
            })
            .collect_vec();

        let result = RawSignature::verify_multiple_aggregate_signatures(
            messages.as_slice(),
            DOMAIN_SEPARATION_TAG,
            public_keys.as_slice(),
            false,
            signatures.as_slice(),
            false,
            rands.as_slice(),
            MULTI_VERIFY_RANDOM_BITS,
        );

        result == BLST_ERROR::BLST_SUCCESS
    }

    #[must_use]
    pub(crate) const fn as_raw(&self) -> &RawSignature {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use crate::SecretKey;

    use super::*;

    const MESSAGE: &str = "foo";

    #[test]
    fn signature_verify_succeeds_on_correct_triple() {
        let secret_key = secret_key();
        let public_key = secret_key.to_public_key();
        let signature = secret_key.sign(MESSAGE);

        assert!(signature.verify(MESSAGE, public_key));
    }

    #[test]
    fn signature_verify_fails_on_incorrect_public_key() {
        let secret_key = secret_key();
        let public_key = other_secret_key().to_public_key();
        let signature = secret_key.sign(MESSAGE);

        assert!(!signature.verify(MESSAGE, public_key));
    }

    #[test]
    fn signature_verify_fails_on_incorrect_signature() {
        let secret_key = secret_key();
        let public_key = secret_key.to_public_key();
        let signature = other_secret_key().sign(MESSAGE);

        assert!(!signature.verify(MESSAGE, public_key));
    }

    #[test]
    fn fast_aggregate_verify_succeeds_on_aggregated_signature() {
        let secret_keys = [secret_key(), other_secret_key()];
        let public_keys = secret_keys.each_ref().map(SecretKey::to_public_key);

        let signature = secret_keys
            .iter()
            .map(|secret_key| secret_key.sign(MESSAGE))
            .reduce(|mut accumulator, signature| {
                accumulator.aggregate_in_place(signature);
                accumulator
            })
            .expect("the array of secret keys is not empty");

        assert!(signature.fast_aggregate_verify(MESSAGE, &public_keys));
    }

    #[test]
    fn multi_verify_succeeds_on_correct_triples() {
        let secret_keys = [secret_key(), other_secret_key()];
        let public_keys = secret_keys.each_ref().map(SecretKey::to_public_key);
        let messages = [b"foo".as_slice(), b"bar".as_slice()];

        let signatures = [
            secret_keys[0].sign(messages[0]),
            secret_keys[1].sign(messages[1]),
        ];

        assert!(Signature::multi_verify(
            messages,
            signatures.iter(),
            public_keys.iter(),
        ));
    }

    #[test]
    fn multi_verify_fails_on_mismatched_message() {
        let secret_keys = [secret_key(), other_secret_key()];
        let public_keys = secret_keys.each_ref().map(SecretKey::to_public_key);
        let messages = [b"foo".as_slice(), b"bar".as_slice()];

        let signatures = [
            secret_keys[0].sign(messages[0]),
            secret_keys[1].sign(b"baz"),
        ];

        assert!(!Signature::multi_verify(
            messages,
            signatures.iter(),
            public_keys.iter(),
        ));
    }

    #[test]
    fn conversion_fails_on_empty_signature() {
        SignatureBytes::empty()
            .try_into()
            .map(|_: Signature| ())
            .expect_err("the point at infinity should fail the infinity check");
    }

    fn secret_key() -> SecretKey {
        (*b"????????????????????????????????")
            .try_into()
            .expect("bytes encode a valid secret key")
    }

    fn other_secret_key() -> SecretKey {
        (*b"!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!!")
            .try_into()
            .expect("bytes encode a valid secret key")
    }
}
