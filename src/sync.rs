// Atomics and cells used by the ring, swapped for loom's model-checked
// versions under `--cfg loom`.

#[cfg(loom)]
pub(crate) use loom::cell::UnsafeCell;
#[cfg(loom)]
pub(crate) use loom::hint::spin_loop;
#[cfg(loom)]
pub(crate) use loom::sync::atomic::{AtomicUsize, Ordering};

#[cfg(not(loom))]
pub(crate) use std::hint::spin_loop;
#[cfg(not(loom))]
pub(crate) use std::sync::atomic::{AtomicUsize, Ordering};

/// `std::cell::UnsafeCell` behind loom's closure-based access API.
#[cfg(not(loom))]
#[derive(Debug)]
pub(crate) struct UnsafeCell<T>(std::cell::UnsafeCell<T>);

#[cfg(not(loom))]
impl<T> UnsafeCell<T> {
   #[inline]
   pub(crate) const fn new(data: T) -> Self {
      Self(std::cell::UnsafeCell::new(data))
   }

   #[inline]
   pub(crate) fn with<R>(&self, f: impl FnOnce(*const T) -> R) -> R {
      f(self.0.get())
   }

   #[inline]
   pub(crate) fn with_mut<R>(&self, f: impl FnOnce(*mut T) -> R) -> R {
      f(self.0.get())
   }
}
