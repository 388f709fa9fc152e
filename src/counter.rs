//! The shared counter cell behind every populated handle.
//!
//! The payload keeps the allocation it was adopted with; the count lives in a
//! separate small allocation that all aliasing handles point at, next to the
//! borrow flag that polices access to the payload.
use alloc::{
    alloc::{alloc, handle_alloc_error},
    boxed::Box,
};
use core::{
    alloc::Layout,
    cell::{Cell, RefCell},
    ptr::{self, NonNull},
};

use log::debug;

use crate::error::{Error, Result};

pub(crate) struct Counter {
    count: Cell<usize>,
    borrow: RefCell<()>,
}

impl Counter {
    const LAYOUT: Layout = Layout::new::<Counter>();

    /// Allocate a counter reading 1, or report `AllocationFailure` if the
    /// allocator comes back empty-handed.
    pub(crate) fn allocate() -> Result<NonNull<Counter>> {
        #[cfg(test)]
        {
            if fault::take() {
                debug!("injected counter allocation failure");
                return Err(Error::AllocationFailure);
            }
        }

        // Safety: `Counter` is not zero-sized.
        let raw = unsafe { alloc(Self::LAYOUT) } as *mut Counter;
        let Some(ptr) = NonNull::new(raw) else {
            debug!("counter allocation of {} bytes failed", Self::LAYOUT.size());
            return Err(Error::AllocationFailure);
        };
        // Safety: freshly allocated with the layout of `Counter`.
        unsafe {
            ptr::write(
                ptr.as_ptr(),
                Counter {
                    count: Cell::new(1),
                    borrow: RefCell::new(()),
                },
            )
        };
        Ok(ptr)
    }

    /// Like `allocate`, but for paths that cannot report failure: running out
    /// of memory goes to the global handler, the same as `Box::new`.
    pub(crate) fn allocate_or_abort() -> NonNull<Counter> {
        match Self::allocate() {
            Ok(ptr) => ptr,
            Err(_) => handle_alloc_error(Self::LAYOUT),
        }
    }

    /// # Safety
    /// `ptr` must come from `allocate` and must not be used afterwards.
    pub(crate) unsafe fn free(ptr: NonNull<Counter>) {
        // `allocate` used the global allocator with `Counter`'s own layout,
        // which is exactly what `Box` expects.
        drop(Box::from_raw(ptr.as_ptr()));
    }

    pub(crate) fn get(&self) -> usize {
        self.count.get()
    }

    /// Returns the count before the increment.
    ///
    /// # Panics
    /// If the count would overflow, which takes leaking handles with
    /// `mem::forget`. The count is left untouched, so the payload is never
    /// freed while still shared. (`no_std` has no `abort()`.)
    pub(crate) fn inc(&self) -> usize {
        let i = self.count.get();
        match i.checked_add(1) {
            Some(n) => self.count.set(n),
            None => panic!("shared count overflow"),
        }
        i
    }

    /// Returns the count before the decrement.
    pub(crate) fn dec(&self) -> usize {
        let i = self.count.get();
        debug_assert_ne!(i, 0, "shared count underflow");
        self.count.set(i - 1);
        i
    }

    pub(crate) fn borrow_flag(&self) -> &RefCell<()> {
        &self.borrow
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate() {
        let p = Counter::allocate().unwrap();
        let c = unsafe { p.as_ref() };
        assert_eq!(c.get(), 1);
        assert_eq!(c.inc(), 1);
        assert_eq!(c.inc(), 2);
        assert_eq!(c.get(), 3);
        assert_eq!(c.dec(), 3);
        assert_eq!(c.get(), 2);
        unsafe { Counter::free(p) };
    }

    #[test]
    #[should_panic(expected = "shared count overflow")]
    fn test_inc_overflow() {
        let p = Counter::allocate().unwrap();
        let c = unsafe { p.as_ref() };
        c.count.set(usize::MAX);
        c.inc();
    }

    #[test]
    fn test_inc_overflow_leaves_count() {
        let p = Counter::allocate().unwrap();
        let c = unsafe { p.as_ref() };
        c.count.set(usize::MAX);
        let r = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| c.inc()));
        assert!(r.is_err());
        assert_eq!(c.get(), usize::MAX);
        unsafe { Counter::free(p) };
    }

    #[test]
    fn test_borrow_flag() {
        let p = Counter::allocate().unwrap();
        let c = unsafe { p.as_ref() };
        {
            let _a = c.borrow_flag().borrow();
            let _b = c.borrow_flag().borrow();
            assert!(c.borrow_flag().try_borrow_mut().is_err());
        }
        assert!(c.borrow_flag().try_borrow_mut().is_ok());
        unsafe { Counter::free(p) };
    }

    #[test]
    fn test_injected_failure() {
        fault::fail_next_allocation();
        assert_eq!(Counter::allocate().err(), Some(Error::AllocationFailure));
        // the switch only fires once
        let p = Counter::allocate().unwrap();
        unsafe { Counter::free(p) };
    }
}
