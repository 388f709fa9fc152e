//! `SharedHandle<T>`: a single-threaded refcounted handle with explicit
//! copy-on-write.
//!
//! Unlike `std::rc::Rc`, a handle can be empty, adopts an existing `Box<T>`
//! without moving the object, and keeps the count in a separate allocation.
//! Copying a handle only aliases the object; [`SharedHandle::unshare`] is
//! what makes a private deep copy, and callers invoke it right before
//! mutating when they need exclusivity.
use alloc::boxed::Box;
use core::{
    cell::{Ref, RefMut},
    fmt,
    marker::PhantomData,
    mem,
    ptr::{self, NonNull},
};

use log::trace;

use crate::{
    counter::Counter,
    error::{Error, Rejected, Result, TryAccessError},
};

// The payload and its counter are only ever populated together.
struct Slots<T> {
    payload: NonNull<T>,
    counter: NonNull<Counter>,
}

impl<T> Clone for Slots<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Slots<T> {}

/// A handle that may share ownership of one heap-allocated `T`.
///
/// The count is a plain `Cell`, so handles are neither `Send` nor `Sync`.
pub struct SharedHandle<T> {
    slots: Option<Slots<T>>,
    phantom: PhantomData<T>,
}

impl<T> SharedHandle<T> {
    /// A handle that owns nothing. Does not allocate.
    pub const fn empty() -> Self {
        SharedHandle {
            slots: None,
            phantom: PhantomData,
        }
    }

    /// Box `value` and adopt it.
    pub fn new(value: T) -> Result<Self> {
        Self::adopt(&mut Some(Box::new(value)))
    }

    /// Adopt `value` as the sole owner, reusing its allocation.
    ///
    /// Ownership only moves into the handle once the counter is allocated; on
    /// failure the box is handed back inside the [`Rejected`].
    pub fn try_adopt(value: Box<T>) -> core::result::Result<Self, Rejected<T>> {
        match Counter::allocate() {
            Ok(counter) => Ok(Self::from_parts(value, counter)),
            Err(error) => Err(Rejected::new(error, value)),
        }
    }

    /// Adopt the box in `slot`, leaving `None` behind whatever the outcome.
    ///
    /// If the counter cannot be allocated the object is dropped here, since it
    /// already left the caller. An empty slot gives an empty handle.
    pub fn adopt(slot: &mut Option<Box<T>>) -> Result<Self> {
        match slot.take() {
            Some(value) => Self::try_adopt(value).map_err(Error::from),
            None => Ok(Self::empty()),
        }
    }

    fn from_parts(value: Box<T>, counter: NonNull<Counter>) -> Self {
        let payload = NonNull::from(Box::leak(value));
        trace!("adopted payload at {:p}", payload);
        SharedHandle {
            slots: Some(Slots { payload, counter }),
            phantom: PhantomData,
        }
    }

    /// Move the contents out into a new handle, leaving this one empty. The
    /// count is unchanged; the share just has a new holder.
    pub fn take(&mut self) -> Self {
        SharedHandle {
            slots: self.slots.take(),
            phantom: PhantomData,
        }
    }

    /// Move-assign: drop this handle's share of whatever it held, then take
    /// over `source`'s share and leave `source` empty.
    pub fn assign_from(&mut self, source: &mut Self) {
        *self = source.take();
    }

    /// Number of handles sharing the payload, or 0 for an empty handle.
    pub fn ref_count(&self) -> usize {
        self.counter().map_or(0, Counter::get)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_none()
    }

    /// Returns true if both handles alias the same payload, or are both
    /// empty.
    ///
    /// Aliasing is decided by the shared counter, not the payload address:
    /// boxes of zero-sized types all live at the same address.
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.slots.map(|s| s.counter) == other.slots.map(|s| s.counter)
    }

    /// Shared access to the payload.
    ///
    /// # Panics
    /// If the payload is currently mutably borrowed through any alias. See
    /// [`try_get`][Self::try_get] for a non-panicking variant.
    pub fn get(&self) -> Result<Ref<'_, T>> {
        let (slots, counter) = self.parts().ok_or(Error::NullAccess)?;
        Ok(Self::borrow_payload(slots, counter))
    }

    /// Like [`get`][Self::get], but reports an overlapping mutable borrow
    /// instead of panicking.
    pub fn try_get(&self) -> Result<Ref<'_, T>, TryAccessError> {
        let (slots, counter) = self.parts().ok_or(Error::NullAccess)?;
        let flag = counter
            .borrow_flag()
            .try_borrow()
            .map_err(|_| TryAccessError::MutablyBorrowed)?;
        // Safety: see `borrow_payload`.
        Ok(Ref::map(flag, |_| unsafe { slots.payload.as_ref() }))
    }

    /// Mutable access to the payload. This does not unshare first: changes
    /// are visible through every alias. Use [`make_mut`][Self::make_mut] for
    /// copy-on-write.
    ///
    /// # Panics
    /// If the payload is currently borrowed through any alias. See
    /// [`try_get_mut`][Self::try_get_mut] for a non-panicking variant.
    pub fn get_mut(&self) -> Result<RefMut<'_, T>> {
        let (slots, counter) = self.parts().ok_or(Error::NullAccess)?;
        Ok(RefMut::map(counter.borrow_flag().borrow_mut(), |_| {
            // Safety: as in `borrow_payload`, and the mutable borrow is
            // exclusive across all aliases since they share one borrow flag.
            unsafe { &mut *slots.payload.as_ptr() }
        }))
    }

    /// Like [`get_mut`][Self::get_mut], but reports an overlapping borrow
    /// instead of panicking.
    pub fn try_get_mut(&self) -> Result<RefMut<'_, T>, TryAccessError> {
        let (slots, counter) = self.parts().ok_or(Error::NullAccess)?;
        let flag = counter
            .borrow_flag()
            .try_borrow_mut()
            .map_err(|_| TryAccessError::Borrowed)?;
        // Safety: see `get_mut`.
        Ok(RefMut::map(flag, |_| unsafe { &mut *slots.payload.as_ptr() }))
    }

    /// The payload's address, for pointer-style access.
    pub fn as_ptr(&self) -> Result<NonNull<T>> {
        self.payload().ok_or(Error::NullAccess)
    }

    /// Give back the payload if this is its only owner.
    pub fn try_unwrap(mut self) -> core::result::Result<Box<T>, Self> {
        if self.ref_count() != 1 {
            return Err(self);
        }
        let Some(slots) = self.slots.take() else {
            return Err(self);
        };
        // Safety: sole owner, so nobody else can reach either allocation.
        unsafe {
            Counter::free(slots.counter);
            Ok(Box::from_raw(slots.payload.as_ptr()))
        }
    }

    fn payload(&self) -> Option<NonNull<T>> {
        self.slots.map(|s| s.payload)
    }

    fn counter(&self) -> Option<&Counter> {
        // Safety: the counter outlives every handle that holds a share.
        self.slots.map(|s| unsafe { &*s.counter.as_ptr() })
    }

    fn parts(&self) -> Option<(Slots<T>, &Counter)> {
        let slots = self.slots?;
        Some((slots, self.counter()?))
    }

    /// # Panics
    /// If the payload is currently mutably borrowed through any alias.
    fn borrow_payload(slots: Slots<T>, counter: &Counter) -> Ref<'_, T> {
        Ref::map(counter.borrow_flag().borrow(), |_| {
            // Safety: the payload lives as long as any handle holds a share,
            // and the borrow flag excludes overlapping `get_mut`s.
            unsafe { slots.payload.as_ref() }
        })
    }
}

impl<T: Clone> SharedHandle<T> {
    /// Turn a shared handle into the sole owner of a deep copy of the
    /// payload.
    ///
    /// Returns `false`, changing nothing, when the handle is empty or already
    /// the only owner. Otherwise the original payload loses exactly this
    /// handle's share and `self` ends up with a count of 1.
    ///
    /// # Panics
    /// If the payload is currently mutably borrowed through another alias.
    pub fn unshare(&mut self) -> bool {
        let Some(shared) = self.slots else {
            return false;
        };
        let before = self.ref_count();
        if before == 1 {
            return false;
        }

        // Read through a temporary alias: count + 1.
        let staged = self.clone();
        // Safety: `staged` holds a share of `shared`, so its counter is alive.
        let staged_counter = unsafe { shared.counter.as_ref() };
        let copy = Box::new(T::clone(&Self::borrow_payload(shared, staged_counter)));
        let counter = Counter::allocate_or_abort();

        // Temporary alias goes away: count - 1.
        drop(staged);
        // This handle's own share departs: count - 1.
        drop(mem::replace(self, Self::from_parts(copy, counter)));

        // Safety: `before` was at least 2, so the original is still alive.
        debug_assert_eq!(unsafe { shared.counter.as_ref() }.get(), before - 1);
        trace!("unshared {:p}, {} owners remain", shared.payload, before - 1);
        true
    }

    /// Copy-on-write access: unshare if needed, then borrow mutably.
    pub fn make_mut(&mut self) -> Result<RefMut<'_, T>> {
        self.unshare();
        self.get_mut()
    }
}

impl<T> Clone for SharedHandle<T> {
    fn clone(&self) -> Self {
        if let Some(counter) = self.counter() {
            counter.inc();
        }
        SharedHandle {
            slots: self.slots,
            phantom: PhantomData,
        }
    }

    /// Copy-assign. Already aliasing `source` is a no-op; otherwise the old
    /// share is dropped (freeing the old payload if it was the last one).
    fn clone_from(&mut self, source: &Self) {
        if Self::ptr_eq(self, source) {
            return;
        }
        *self = source.clone();
    }
}

impl<T> Default for SharedHandle<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> Drop for SharedHandle<T> {
    fn drop(&mut self) {
        let Some(slots) = self.slots.take() else {
            return;
        };
        // Safety: we held a share, so the counter is alive.
        let counter = unsafe { slots.counter.as_ref() };
        if counter.dec() != 1 {
            return;
        }
        // last owner was just dropped
        trace!("releasing payload at {:p}", slots.payload);
        unsafe {
            drop(Box::from_raw(slots.payload.as_ptr()));
            Counter::free(slots.counter);
        }
    }
}

impl<T: PartialEq> PartialEq for SharedHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        if Self::ptr_eq(self, other) {
            return true;
        }
        match (self.get(), other.get()) {
            (Ok(a), Ok(b)) => *a == *b,
            _ => false,
        }
    }
}

impl<T: Eq> Eq for SharedHandle<T> {}

impl<T: fmt::Debug> fmt::Debug for SharedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some((slots, counter)) = self.parts() else {
            return f.write_str("(empty)");
        };
        match counter.borrow_flag().try_borrow() {
            Ok(_guard) => {
                // Safety: see `get`.
                fmt::Debug::fmt(unsafe { slots.payload.as_ref() }, f)
            }
            Err(_) => f.write_str("(borrowed)"),
        }
    }
}

impl<T> fmt::Pointer for SharedHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.payload() {
            Some(p) => fmt::Pointer::fmt(&p, f),
            None => fmt::Pointer::fmt(&ptr::null::<T>(), f),
        }
    }
}
