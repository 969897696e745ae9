use bytes::Bytes;
use data_encoding::HEXLOWER;
use thiserror::Error;

/// Content hash identifying a catalog or tag-history object.
///
/// Digests are produced by whatever hash the repository uses; the engine only
/// relies on them being fixed-size, comparable and hashable.
#[derive(PartialEq, Eq, Hash, Debug)]
pub struct CatalogDigest(Bytes);

#[derive(Error, Debug, PartialEq)]
pub enum Error {
    #[error("invalid digest length: {0}")]
    InvalidDigestLen(usize),
}

pub const DIGEST_LEN: usize = 20;

impl CatalogDigest {
    pub fn as_slice(&self) -> &[u8] {
        &self.0[..]
    }
}

impl From<CatalogDigest> for bytes::Bytes {
    fn from(val: CatalogDigest) -> Self {
        val.0
    }
}

impl TryFrom<Vec<u8>> for CatalogDigest {
    type Error = Error;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        if value.len() != DIGEST_LEN {
            Err(Error::InvalidDigestLen(value.len()))
        } else {
            Ok(Self(value.into()))
        }
    }
}

impl TryFrom<bytes::Bytes> for CatalogDigest {
    type Error = Error;

    fn try_from(value: bytes::Bytes) -> Result<Self, Self::Error> {
        if value.len() != DIGEST_LEN {
            Err(Error::InvalidDigestLen(value.len()))
        } else {
            Ok(Self(value))
        }
    }
}

impl From<&[u8; DIGEST_LEN]> for CatalogDigest {
    fn from(value: &[u8; DIGEST_LEN]) -> Self {
        Self(value.to_vec().into())
    }
}

impl Clone for CatalogDigest {
    fn clone(&self) -> Self {
        Self(self.0.to_owned())
    }
}

impl std::fmt::Display for CatalogDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", HEXLOWER.encode(&self.0))
    }
}
