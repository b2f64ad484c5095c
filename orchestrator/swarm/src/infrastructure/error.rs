// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use thiserror::Error;

/// Failure creating, attaching, using or destroying a shared object.
///
/// Always fatal to the process that hits it; nothing in the swarm retries.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("invalid shared object name '{0}'")]
    InvalidName(String),

    #[error("{0} already exists; another run is using this namespace")]
    InUse(String),

    #[error("failed to create {name}: {source}")]
    Create {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to attach {name}: {source}")]
    Attach {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{name} is {actual} bytes, expected at least {expected}")]
    SizeMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("failed to detach {name}: {source}")]
    Detach {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0} does not exist")]
    NotFound(String),

    #[error("failed to destroy {name}: {source}")]
    Destroy {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{op} on {name} failed: {source}")]
    Sync {
        op: &'static str,
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("agent id {id} is outside a table of {count} records")]
    SlotOutOfRange { id: u32, count: usize },

    #[error("record slot {0} was already published")]
    SlotTaken(u32),
}

impl ResourceError {
    /// Map the `errno` of a failed exclusive create, treating `EEXIST` as
    /// [`ResourceError::InUse`].
    pub(crate) fn from_create(name: &str, source: std::io::Error) -> Self {
        if source.raw_os_error() == Some(libc::EEXIST) {
            Self::InUse(name.to_string())
        } else {
            Self::Create {
                name: name.to_string(),
                source,
            }
        }
    }

    /// Map the `errno` of a failed unlink call, treating `ENOENT` as
    /// [`ResourceError::NotFound`].
    pub(crate) fn from_unlink(name: &str, source: std::io::Error) -> Self {
        if source.raw_os_error() == Some(libc::ENOENT) {
            Self::NotFound(name.to_string())
        } else {
            Self::Destroy {
                name: name.to_string(),
                source,
            }
        }
    }

    pub(crate) fn sync(op: &'static str, name: &str, code: i32) -> Self {
        Self::Sync {
            op,
            name: name.to_string(),
            source: std::io::Error::from_raw_os_error(code),
        }
    }
}

/// Shared objects that failed to tear down.
#[derive(Debug, Error)]
#[error("{} shared object(s) failed to tear down", .failures.len())]
pub struct TeardownError {
    pub failures: Vec<ResourceError>,
}

impl TeardownError {
    /// Collect the failures among `results`, if any.
    pub(crate) fn from_results(
        results: impl IntoIterator<Item = Result<(), ResourceError>>,
    ) -> Result<(), Self> {
        let failures: Vec<_> = results.into_iter().filter_map(Result::err).collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(Self { failures })
        }
    }
}
