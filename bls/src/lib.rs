pub use crate::{
    error::Error,
    public_key::PublicKey,
    public_key_bytes::PublicKeyBytes,
    secret_key::SecretKey,
    signature::Signature,
    signature_bytes::SignatureBytes,
};

mod error;
mod public_key;
mod public_key_bytes;
mod secret_key;
mod signature;
mod signature_bytes;

/// <https://github.com/ethereum/consensus-specs/blob/v1.3.0/specs/phase0/beacon-chain.md#bls-signatures>
pub const DOMAIN_SEPARATION_TAG: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_POP_";

// SSZ represents public keys and signatures as opaque fixed-length byte
// vectors. The wrappers around raw `blst` points never touch serialization.
macro_rules! impl_ssz_for_fixed_bytes {
    ($name:ty, $size:expr) => {
        impl ssz::Encode for $name {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                $size
            }

            fn ssz_bytes_len(&self) -> usize {
                $size
            }

            fn ssz_append(&self, buf: &mut Vec<u8>) {
                buf.extend_from_slice(self.as_bytes());
            }
        }

        impl ssz::Decode for $name {
            fn is_ssz_fixed_len() -> bool {
                true
            }

            fn ssz_fixed_len() -> usize {
                $size
            }

            fn from_ssz_bytes(bytes: &[u8]) -> Result<Self, ssz::DecodeError> {
                if bytes.len() != $size {
                    return Err(ssz::DecodeError::InvalidByteLength {
                        len: bytes.len(),
                        expected: $size,
                    });
                }

                let mut fixed = [0; $size];
                fixed.copy_from_slice(bytes);
                Ok(Self::from(fixed))
            }
        }

        impl tree_hash::TreeHash for $name {
            fn tree_hash_type() -> tree_hash::TreeHashType {
                tree_hash::TreeHashType::Vector
            }

            fn tree_hash_packed_encoding(&self) -> tree_hash::PackedEncoding {
                unreachable!("byte vectors are never packed")
            }

            fn tree_hash_packing_factor() -> usize {
                unreachable!("byte vectors are never packed")
            }

            fn tree_hash_root(&self) -> tree_hash::Hash256 {
                tree_hash::merkle_root(self.as_bytes(), ($size + 31) / 32)
            }
        }
    };
}

pub(crate) use impl_ssz_for_fixed_bytes;
