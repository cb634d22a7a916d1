use core::fmt::{Debug, Formatter, Result as FmtResult};

use derive_more::From;

use crate::{impl_ssz_for_fixed_bytes, PublicKey};

pub const SIZE: usize = 48;

/// Compressed public key as it appears in consensus containers.
///
/// Stored in states and blocks without validation.
/// Decompression into a [`PublicKey`] is where validation happens.
#[derive(Clone, Copy, PartialEq, Eq, Hash, From)]
pub struct PublicKeyBytes([u8; SIZE]);

impl Default for PublicKeyBytes {
    fn default() -> Self {
        Self([0; SIZE])
    }
}

impl Debug for PublicKeyBytes {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(formatter, "PublicKeyBytes(0x")?;

        for byte in self.0 {
            write!(formatter, "{byte:02x}")?;
        }

        write!(formatter, ")")
    }
}

impl From<PublicKey> for PublicKeyBytes {
    fn from(public_key: PublicKey) -> Self {
        Self(public_key.as_raw().compress())
    }
}

impl AsRef<[u8]> for PublicKeyBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl PublicKeyBytes {
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIZE] {
        &self.0
    }
}

impl_ssz_for_fixed_bytes!(PublicKeyBytes, SIZE);
