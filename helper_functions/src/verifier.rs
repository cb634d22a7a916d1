use anyhow::{ensure, Result};
use bls::{PublicKey, PublicKeyBytes, Signature, SignatureBytes};
use derive_more::Constructor;
use rayon::iter::{IntoParallelRefIterator as _, ParallelIterator as _};
use types::phase0::primitives::H256;

use crate::error::{Error, SignatureKind};

/// The signature collection seam of block processing.
///
/// Extracting a signature descriptor is separated from checking it so that
/// all signatures in a block (or a whole batch of blocks) can be verified in
/// one pairing computation. Implementations decide what to do with each
/// descriptor as it is produced.
pub trait Verifier {
    const IS_NULL: bool;

    fn reserve(&mut self, additional: usize);

    fn verify_singular(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_key_bytes: PublicKeyBytes,
        signature_kind: SignatureKind,
    ) -> Result<()>;

    fn verify_aggregate(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_keys: impl IntoIterator<Item = PublicKey>,
        signature_kind: SignatureKind,
    ) -> Result<()>;

    fn extend(
        &mut self,
        triples: impl IntoIterator<Item = Triple>,
        signature_kind: SignatureKind,
    ) -> Result<()>;

    fn finish(&self) -> Result<()>;
}

impl<V: Verifier> Verifier for &mut V {
    const IS_NULL: bool = V::IS_NULL;

    #[inline]
    fn reserve(&mut self, additional: usize) {
        (*self).reserve(additional)
    }

    #[inline]
    fn verify_singular(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_key_bytes: PublicKeyBytes,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        (*self).verify_singular(message, signature_bytes, public_key_bytes, signature_kind)
    }

    #[inline]
    fn verify_aggregate(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_keys: impl IntoIterator<Item = PublicKey>,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        (*self).verify_aggregate(message, signature_bytes, public_keys, signature_kind)
    }

    #[inline]
    fn extend(
        &mut self,
        triples: impl IntoIterator<Item = Triple>,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        (*self).extend(triples, signature_kind)
    }

    #[inline]
    fn finish(&self) -> Result<()> {
        (**self).finish()
    }
}

/// Skips signature verification entirely.
///
/// Meant for states and blocks whose signatures are already known to be valid,
/// like anchor blocks loaded from storage.
pub struct NullVerifier;

impl Verifier for NullVerifier {
    const IS_NULL: bool = true;

    #[inline]
    fn reserve(&mut self, _additional: usize) {}

    #[inline]
    fn verify_singular(
        &mut self,
        _message: H256,
        _signature_bytes: SignatureBytes,
        _public_key_bytes: PublicKeyBytes,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn verify_aggregate(
        &mut self,
        _message: H256,
        _signature_bytes: SignatureBytes,
        _public_keys: impl IntoIterator<Item = PublicKey>,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn extend(
        &mut self,
        _triples: impl IntoIterator<Item = Triple>,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        Ok(())
    }

    #[inline]
    fn finish(&self) -> Result<()> {
        Ok(())
    }
}

/// Verifies each signature as soon as it is extracted.
///
/// Slower than [`MultiVerifier`] but attributes failures to a specific
/// signature, which batch verification deliberately does not.
pub struct SingleVerifier;

impl Verifier for SingleVerifier {
    const IS_NULL: bool = false;

    #[inline]
    fn reserve(&mut self, _additional: usize) {}

    #[inline]
    fn verify_singular(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_key_bytes: PublicKeyBytes,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        let public_key = public_key_bytes.try_into()?;
        let triple = Triple::new(message, signature_bytes, public_key);
        self.extend(core::iter::once(triple), signature_kind)
    }

    #[inline]
    fn verify_aggregate(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_keys: impl IntoIterator<Item = PublicKey>,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        let public_keys = public_keys.into_iter().collect::<Vec<_>>();

        ensure!(
            Signature::try_from(signature_bytes)?
                .fast_aggregate_verify(message, public_keys.iter()),
            Error::SignatureInvalid(signature_kind),
        );

        Ok(())
    }

    #[inline]
    fn extend(
        &mut self,
        triples: impl IntoIterator<Item = Triple>,
        signature_kind: SignatureKind,
    ) -> Result<()> {
        for triple in triples {
            let Triple {
                message,
                signature_bytes,
                public_key,
            } = triple;

            let signature = Signature::try_from(signature_bytes)?;

            ensure!(
                signature.verify(message, public_key),
                Error::SignatureInvalid(signature_kind),
            );
        }

        Ok(())
    }

    #[inline]
    fn finish(&self) -> Result<()> {
        Ok(())
    }
}

/// Collects signature descriptors and verifies them all at once in
/// [`MultiVerifier::finish`].
///
/// A failed batch reports a single aggregate error without identifying the
/// offending signature. Callers that need attribution must re-verify subsets
/// with [`SingleVerifier`].
#[derive(Default)]
pub struct MultiVerifier {
    triples: Vec<Triple>,
}

impl Verifier for MultiVerifier {
    const IS_NULL: bool = false;

    #[inline]
    fn reserve(&mut self, additional: usize) {
        self.triples.reserve_exact(additional);
    }

    #[inline]
    fn verify_singular(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_key_bytes: PublicKeyBytes,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        let public_key = public_key_bytes.try_into()?;
        self.triples
            .push(Triple::new(message, signature_bytes, public_key));
        Ok(())
    }

    #[inline]
    fn verify_aggregate(
        &mut self,
        message: H256,
        signature_bytes: SignatureBytes,
        public_keys: impl IntoIterator<Item = PublicKey>,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        let public_key = PublicKey::aggregate_nonempty(public_keys)?;
        self.triples
            .push(Triple::new(message, signature_bytes, public_key));
        Ok(())
    }

    #[inline]
    fn extend(
        &mut self,
        triples: impl IntoIterator<Item = Triple>,
        _signature_kind: SignatureKind,
    ) -> Result<()> {
        self.triples.extend(triples);
        Ok(())
    }

    #[inline]
    fn finish(&self) -> Result<()> {
        if self.triples.is_empty() {
            return Ok(());
        }

        let messages = self.triples.iter().map(|triple| triple.message.as_bytes());

        let signatures = self
            .triples
            .par_iter()
            .map(|triple| triple.signature_bytes.try_into())
            .collect::<Result<Vec<_>, _>>()?;

        let public_keys = self.triples.iter().map(|triple| &triple.public_key);

        ensure!(
            Signature::multi_verify(messages, signatures.iter(), public_keys),
            Error::SignatureInvalid(SignatureKind::Multi),
        );

        Ok(())
    }
}

impl From<Vec<Triple>> for MultiVerifier {
    fn from(triples: Vec<Triple>) -> Self {
        Self { triples }
    }
}

#[derive(Constructor)]
pub struct Triple {
    message: H256,
    signature_bytes: SignatureBytes,
    public_key: PublicKey,
}

#[cfg(test)]
mod tests {
    use bls::SecretKey;

    use super::*;

    #[test]
    fn multi_verifier_finish_succeeds_with_0_signatures() -> Result<()> {
        MultiVerifier::default().finish()
    }

    #[test]
    fn multi_verifier_finish_succeeds_with_1_signature() -> Result<()> {
        let secret_key = secret_key();
        let public_key_bytes = secret_key.to_public_key().into();
        let message = H256::default();
        let signature = secret_key.sign(message).into();

        let mut verifier = MultiVerifier::default();
        verifier.verify_singular(message, signature, public_key_bytes, SignatureKind::Block)?;
        verifier.finish()
    }

    #[test]
    fn multi_verifier_finish_fails_as_a_whole_on_corrupt_signature() -> Result<()> {
        let secret_key = secret_key();
        let public_key_bytes = secret_key.to_public_key().into();
        let message = H256::default();
        let good = secret_key.sign(message).into();
        let bad = secret_key.sign(H256::repeat_byte(1)).into();

        let mut verifier = MultiVerifier::default();
        verifier.verify_singular(message, good, public_key_bytes, SignatureKind::Block)?;
        verifier.verify_singular(message, bad, public_key_bytes, SignatureKind::Block)?;

        assert!(verifier.finish().is_err());

        Ok(())
    }

    fn secret_key() -> SecretKey {
        (*b"????????????????????????????????")
            .try_into()
            .expect("bytes encode a valid secret key")
    }
}
