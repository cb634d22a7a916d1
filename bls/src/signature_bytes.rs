use core::fmt::{Debug, Formatter, Result as FmtResult};

use derive_more::From;

use crate::{impl_ssz_for_fixed_bytes, Signature};

pub const SIZE: usize = 96;

#[derive(Clone, Copy, PartialEq, Eq, From)]
pub struct SignatureBytes([u8; SIZE]);

impl Default for SignatureBytes {
    fn default() -> Self {
        Self([0; SIZE])
    }
}

impl Debug for SignatureBytes {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        write!(formatter, "SignatureBytes(0x")?;

        for byte in self.0 {
            write!(formatter, "{byte:02x}")?;
        }

        write!(formatter, ")")
    }
}

impl From<Signature> for SignatureBytes {
    fn from(signature: Signature) -> Self {
        Self(signature.as_raw().compress())
    }
}

impl AsRef<[u8]> for SignatureBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl SignatureBytes {
    /// Returns the compressed encoding of the point at infinity.
    ///
    /// This is distinct from [`SignatureBytes::default`], which is all zeros
    /// and not a valid point encoding at all.
    #[must_use]
    pub fn empty() -> Self {
        let mut bytes = [0; SIZE];
        // The first byte of an empty signature must be 0xc0.
        bytes[0] = 0xc0;
        Self(bytes)
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self == Self::empty()
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIZE] {
        &self.0
    }
}

impl_ssz_for_fixed_bytes!(SignatureBytes, SIZE);
