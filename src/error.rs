//! Error kinds reported by [`SharedHandle`][crate::SharedHandle].
use alloc::boxed::Box;
use core::fmt;

use thiserror::Error;

/// The two ways an operation on a handle can fail.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The shared counter cell could not be allocated.
    #[error("failed to allocate the shared counter")]
    AllocationFailure,

    /// The handle is empty, so there is no object to access.
    #[error("access through an empty handle")]
    NullAccess,
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Failure of the non-panicking accessors
/// [`try_get`][crate::SharedHandle::try_get] and
/// [`try_get_mut`][crate::SharedHandle::try_get_mut].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryAccessError {
    #[error(transparent)]
    Handle(#[from] Error),

    /// Another alias holds a mutable borrow of the payload.
    #[error("payload is mutably borrowed through an alias")]
    MutablyBorrowed,

    /// Another alias holds a borrow of the payload.
    #[error("payload is borrowed through an alias")]
    Borrowed,
}

/// A failed [`try_adopt`][crate::SharedHandle::try_adopt]. Ownership was
/// never taken, so the object comes back to the caller.
#[derive(Error)]
#[error("{error}")]
pub struct Rejected<T> {
    error: Error,
    value: Box<T>,
}

impl<T> Rejected<T> {
    #[cold]
    pub(crate) fn new(error: Error, value: Box<T>) -> Self {
        Rejected { error, value }
    }

    pub fn error(&self) -> Error {
        self.error
    }

    /// Recover the object that could not be adopted.
    pub fn into_inner(self) -> Box<T> {
        self.value
    }
}

impl<T> From<Rejected<T>> for Error {
    fn from(rejected: Rejected<T>) -> Self {
        rejected.error
    }
}

// No `T: Debug` bound; the payload is usually what the caller wants back,
// not what they want printed.
impl<T> fmt::Debug for Rejected<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{format, string::ToString};

    #[test]
    fn test_display() {
        assert_eq!(
            Error::AllocationFailure.to_string(),
            "failed to allocate the shared counter"
        );
        assert_eq!(Error::NullAccess.to_string(), "access through an empty handle");
    }

    #[test]
    fn test_rejected_gives_value_back() {
        let r = Rejected::new(Error::AllocationFailure, Box::new([1, 2, 3]));
        assert_eq!(r.error(), Error::AllocationFailure);
        assert_eq!(r.to_string(), "failed to allocate the shared counter");
        assert_eq!(format!("{:?}", r), "Rejected { error: AllocationFailure, .. }");
        assert_eq!(*r.into_inner(), [1, 2, 3]);
    }

    #[test]
    fn test_try_access_display() {
        let e: TryAccessError = Error::NullAccess.into();
        assert_eq!(e.to_string(), "access through an empty handle");
        assert_eq!(
            TryAccessError::Borrowed.to_string(),
            "payload is borrowed through an alias"
        );
    }

    #[test]
    fn test_rejected_into_error() {
        let r = Rejected::new(Error::AllocationFailure, Box::new("x"));
        let e: Error = r.into();
        assert_eq!(e, Error::AllocationFailure);
    }
}
