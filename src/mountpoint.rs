use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Location of a catalog within the repository namespace.
///
/// The repository root is the empty mount point. Every other mount point is
/// an absolute, slash-separated path without a trailing slash, for example
/// `/software/x86_64`.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MountPoint(String);

#[derive(Debug, Error, PartialEq)]
pub enum MountPointError {
    #[error("mount point must start with '/': {0:?}")]
    MissingLeadingSlash(String),
    #[error("mount point must not end with '/': {0:?}")]
    TrailingSlash(String),
    #[error("mount point contains an empty component: {0:?}")]
    EmptyComponent(String),
}

impl MountPoint {
    /// The repository root.
    pub fn root() -> Self {
        MountPoint(String::new())
    }

    pub fn new(path: impl Into<String>) -> Result<Self, MountPointError> {
        let path = path.into();
        if path.is_empty() {
            return Ok(MountPoint(path));
        }
        if !path.starts_with('/') {
            return Err(MountPointError::MissingLeadingSlash(path));
        }
        if path.ends_with('/') {
            return Err(MountPointError::TrailingSlash(path));
        }
        if path[1..].split('/').any(str::is_empty) {
            return Err(MountPointError::EmptyComponent(path));
        }
        Ok(MountPoint(path))
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether `self` lies strictly below `other` in the namespace.
    ///
    /// The root is extended by every other mount point; a mount point never
    /// extends itself.
    pub fn is_proper_extension_of(&self, other: &MountPoint) -> bool {
        if self == other {
            return false;
        }
        self.0.starts_with(other.as_str()) && self.0.as_bytes().get(other.0.len()) == Some(&b'/')
    }

    /// The longest proper prefix that is itself a valid mount point, or
    /// `None` for the root.
    pub fn parent(&self) -> Option<MountPoint> {
        if self.is_root() {
            return None;
        }
        match self.0.rfind('/') {
            Some(0) | None => Some(MountPoint::root()),
            Some(idx) => Some(MountPoint(self.0[..idx].to_string())),
        }
    }
}

impl FromStr for MountPoint {
    type Err = MountPointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MountPoint::new(s)
    }
}

impl fmt::Display for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for MountPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
