use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("decompressed public key is invalid")]
    InvalidPublicKey,
    #[error("secret key is invalid")]
    InvalidSecretKey,
    #[error("decompressed signature is invalid")]
    InvalidSignature,
    #[error("no public keys to aggregate")]
    NoPublicKeysToAggregate,
}
