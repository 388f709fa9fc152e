/*!
A single-threaded reference-counted handle with explicit copy-on-write,
in the spirit of C++'s `shared_ptr`.

[`SharedHandle<T>`] owns at most one heap-allocated `T` and counts how many
handles share it. Copying a handle (`Clone`) only aliases the object and bumps
the count; the object is freed when the last handle goes away. To get a
private copy before mutating, call [`unshare`][SharedHandle::unshare] (or
[`make_mut`][SharedHandle::make_mut], which unshares and then borrows).

```rust
    use cowrc::SharedHandle;

    let a = SharedHandle::new(10)?;
    let mut b = a.clone();
    assert_eq!(a.ref_count(), 2);

    // b becomes the sole owner of an independent copy
    assert!(b.unshare());
    assert_eq!((a.ref_count(), b.ref_count()), (1, 1));

    *b.get_mut()? = 20;
    assert_eq!(*a.get()?, 10);
    # Ok::<(), cowrc::Error>(())
```

# Empty handles

A handle can be empty, e.g. after [`SharedHandle::empty`] or after its
contents were moved out with [`take`][SharedHandle::take]. Accessing an empty
handle fails with [`Error::NullAccess`] rather than panicking:

```
    use cowrc::{Error, SharedHandle};

    let mut a = SharedHandle::new(String::from("moved"))?;
    let b = a.take();
    assert_eq!(a.ref_count(), 0);
    assert_eq!(a.get().err(), Some(Error::NullAccess));
    assert_eq!(*b.get()?, "moved");
    # Ok::<(), Error>(())
```

# Adopting an existing box

[`SharedHandle::try_adopt`] takes over an existing `Box<T>` without moving the
object; the count goes in a separate small allocation. If that allocation
fails, the box is handed back. [`SharedHandle::adopt`] instead takes the box
out of an `Option`, clearing it either way:

```
    use cowrc::SharedHandle;

    let mut slot = Some(Box::new([0u8; 64]));
    let h = SharedHandle::adopt(&mut slot)?;
    assert!(slot.is_none());
    assert_eq!(h.ref_count(), 1);
    # Ok::<(), cowrc::Error>(())
```

# Aliasing

`get_mut` does not unshare: changes made through one handle are visible
through all of its aliases. Overlapping borrows across aliases are refused
with a panic, the same as [`RefCell`][core::cell::RefCell].

```
    use cowrc::SharedHandle;

    let a = SharedHandle::new(vec![1])?;
    let b = a.clone();
    b.get_mut()?.push(2);
    assert_eq!(*a.get()?, [1, 2]);
    # Ok::<(), cowrc::Error>(())
```

## Differences from `std::rc::Rc`

* Handles can be empty, and access is fallible instead of going through
  `Deref`.
* `Clone` never copies the object. Deep copies only happen in `unshare` and
  `make_mut`.
* There are no weak pointers.
* Running out of memory while adopting is reported as
  [`Error::AllocationFailure`].
*/
#![no_std]
#[cfg(test)]
extern crate std;

extern crate alloc;

mod counter;
pub mod error;
pub mod handle;

pub use self::error::{Error, Rejected, Result, TryAccessError};
pub use self::handle::SharedHandle;
