//! Process-shared placement of a [`BoundedConcurrentQueue`].
//!
//! A [`SharedRegion`] is an anonymous `MAP_SHARED` mapping. Create it, place
//! a queue in it with [`SharedRegion::init_queue`], then `fork`: parent and
//! child see the same slots at the same address.

use crate::trace::{debug, warn};
use crate::BoundedConcurrentQueue;
use nix::errno::Errno;
use nix::sys::mman::{self, MapFlags, ProtFlags};
use std::{alloc::LayoutError, ffi::c_void, num::NonZeroUsize, ptr::NonNull};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShmError {
   #[error("shared region must not be empty")]
   EmptyRegion,
   #[error("shared region too small: need {need} bytes, got {got}")]
   TooSmall { need: usize, got: usize },
   #[error("shared memory must be aligned to {align} bytes")]
   Misaligned { align: usize },
   #[error("queue layout overflows: {0}")]
   Layout(#[from] LayoutError),
   #[error("mmap failed: {0}")]
   Map(#[from] Errno),
}

/// Anonymous shared mapping, unmapped on drop.
#[derive(Debug)]
pub struct SharedRegion {
   ptr: NonNull<c_void>,
   len: usize,
}

unsafe impl Send for SharedRegion {}
unsafe impl Sync for SharedRegion {}

impl SharedRegion {
   /// Map `len` zeroed, readable and writable bytes shared across `fork`.
   pub fn new(len: usize) -> Result<Self, ShmError> {
      let length = NonZeroUsize::new(len).ok_or(ShmError::EmptyRegion)?;
      let ptr = unsafe {
         mman::mmap_anonymous(
            None,
            length,
            ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            MapFlags::MAP_SHARED,
         )?
      };
      debug!(len, "shared region mapped");
      Ok(Self { ptr, len })
   }

   /// A region exactly large enough for one `BoundedConcurrentQueue<T, N>`.
   pub fn for_queue<T: Copy + Send, const N: usize>() -> Result<Self, ShmError> {
      Self::new(BoundedConcurrentQueue::<T, N>::shared_size()?)
   }

   #[allow(clippy::len_without_is_empty)]
   pub fn len(&self) -> usize {
      self.len
   }

   pub fn as_mut_ptr(&self) -> *mut u8 {
      self.ptr.as_ptr().cast()
   }

   /// Build an empty queue at the start of the region.
   ///
   /// The `&mut` borrow guarantees no earlier queue reference from this
   /// region is still alive in this process. Page alignment of the mapping
   /// covers the queue's alignment.
   pub fn init_queue<T: Copy + Send, const N: usize>(
      &mut self,
   ) -> Result<&BoundedConcurrentQueue<T, N>, ShmError> {
      // the mapping outlives the returned borrow of `self`
      let queue = unsafe { BoundedConcurrentQueue::<T, N>::init_in_shared(self.as_mut_ptr(), self.len)? };
      Ok(&*queue)
   }
}

impl Drop for SharedRegion {
   fn drop(&mut self) {
      if let Err(_e) = unsafe { mman::munmap(self.ptr, self.len) } {
         warn!(error = %_e, len = self.len, "munmap failed");
      }
   }
}
