use core::fmt::{Debug, Formatter, Result as FmtResult};

use blst::min_pk::SecretKey as RawSecretKey;

use crate::{Error, PublicKey, Signature, DOMAIN_SEPARATION_TAG};

pub const SIZE: usize = 32;

pub struct SecretKey(RawSecretKey);

// Prevent the key from ending up in logs.
impl Debug for SecretKey {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        formatter.write_str("SecretKey(<redacted>)")
    }
}

impl TryFrom<[u8; SIZE]> for SecretKey {
    type Error = Error;

    #[inline]
    fn try_from(bytes: [u8; SIZE]) -> Result<Self, Self::Error> {
        RawSecretKey::from_bytes(&bytes)
            .map(Self)
            .map_err(|_| Error::InvalidSecretKey)
    }
}

impl SecretKey {
    #[inline]
    #[must_use]
    pub fn to_public_key(&self) -> PublicKey {
        self.0.sk_to_pk().into()
    }

    #[inline]
    #[must_use]
    pub fn sign(&self, message: impl AsRef<[u8]>) -> Signature {
        self.0
            .sign(message.as_ref(), DOMAIN_SEPARATION_TAG, &[])
            .into()
    }
}
