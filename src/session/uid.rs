use std::{fmt::Display, num::NonZeroU32};

use thiserror::Error;

/// Server assigned message identifier, stable within one mailbox.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
#[repr(transparent)]
pub struct Uid(NonZeroU32);

impl Uid {
    /// The uid directly following this one, if there is one.
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(Self)
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("{0} is not a valid uid")]
pub struct InvalidUidError(u32);

impl TryFrom<u32> for Uid {
    type Error = InvalidUidError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        NonZeroU32::new(value)
            .map(Self)
            .ok_or(InvalidUidError(value))
    }
}

impl TryFrom<&u32> for Uid {
    type Error = InvalidUidError;

    fn try_from(value: &u32) -> Result<Self, Self::Error> {
        Self::try_from(*value)
    }
}

impl From<Uid> for u32 {
    fn from(value: Uid) -> Self {
        value.0.into()
    }
}

impl Display for Uid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
