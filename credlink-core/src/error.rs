use thiserror::Error;

use crate::codec::CodecError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum CredLinkError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Proof store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid proof reference: {0}")]
    InvalidProofUri(String),
}

pub type Result<T> = std::result::Result<T, CredLinkError>;
