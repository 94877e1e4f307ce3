//! Bounded lock-free multi-producer / multi-consumer ring buffer.
//!
//! [`BoundedConcurrentQueue`] keeps `N + 1` slots for a usable capacity of
//! `N`; the spare slot separates "full" from "empty". Producers and consumers
//! coordinate only through two CAS-advanced position counters and a sequence
//! stamp per slot. Nothing blocks: `push` on a full queue and `pop` on an
//! empty one simply report failure and leave retry policy to the caller.

pub mod mpmc;
#[cfg(not(loom))]
pub mod shm;
mod sync;
pub mod trace;

pub use mpmc::BoundedConcurrentQueue;
pub use mpmc::Inspector;
#[cfg(not(loom))]
pub use shm::{SharedRegion, ShmError};

/// Common interface for the bounded queues in this crate.
///
/// Full and empty are ordinary outcomes, never errors.
pub trait ConcurrentQueue<T: Copy + Send>: Send + Sync {
   /// Append `item`; `false` when the queue is full (nothing is stored).
   fn push(&self, item: T) -> bool;
   /// Remove the oldest published item; `None` when there is none.
   fn pop(&self) -> Option<T>;

   /// Out-parameter form of [`pop`](Self::pop): `out` is only written on success.
   fn pop_into(&self, out: &mut T) -> bool {
      match self.pop() {
         Some(v) => {
            *out = v;
            true
         }
         None => false,
      }
   }

   /// Point-in-time emptiness; may be stale as soon as it returns.
   fn is_empty(&self) -> bool;
   /// Point-in-time number of occupied slots, always within `0..=capacity()`.
   fn effective_size(&self) -> usize;
   /// Usable capacity (one less than the number of physical slots).
   fn capacity(&self) -> usize;
}
