// Lock-free bounded multi-producer / multi-consumer ring buffer.
//
// `N + 1` physical slots for `N` usable ones: the spare slot keeps
// `read == write` meaning "empty" and `next(write) == read` meaning "full".
// Positions are stamps `lap * ONE_LAP + index`; the lap bits make CAS on the
// positions ABA-proof and let each slot's own stamp say which position it is
// ready for (Vyukov / crossbeam `ArrayQueue` scheme).
//
// A producer reserves a slot by CAS on `write_pos` and only then makes the
// value visible by bumping the slot stamp with Release. A consumer trusts a
// slot only once its stamp reads `pos + 1` with Acquire, and hands it back to
// the next lap after the copy-out. A value is therefore never observed before
// it is fully written, nor overwritten while still being read.

use crate::sync::{spin_loop, AtomicUsize, Ordering, UnsafeCell};
use crate::trace::{debug, trace};
use crate::ConcurrentQueue;
use crossbeam::utils::CachePadded;
use std::{fmt, mem::MaybeUninit, ptr::NonNull};

/// Largest accepted capacity; keeps plenty of stamp bits for the lap counter.
pub const MAX_CAPACITY: usize = 1 << 30;

/*──────────────────────────────────────────────────────────────────────────*/
/*  Slot                                                                    */
/*──────────────────────────────────────────────────────────────────────────*/

pub(crate) struct Slot<T> {
   // position this slot is ready for: `pos` = writable, `pos + 1` = readable
   stamp: AtomicUsize,
   value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
   fn new(stamp: usize) -> Self {
      Self {
         stamp: AtomicUsize::new(stamp),
         value: UnsafeCell::new(MaybeUninit::uninit()),
      }
   }
}

/*──────────────────────────────────────────────────────────────────────────*/
/*  Ring header                                                             */
/*──────────────────────────────────────────────────────────────────────────*/

/// Fixed-capacity lock-free MPMC queue holding at most `N` values of `T`.
///
/// `T: Copy` is the element contract: plain fixed-size values with no
/// destructor and no owned resources. Types that do not satisfy it, and
/// `N == 0`, are rejected at compile time.
///
/// Every operation is non-blocking. Contending callers retry their CAS, so
/// the queue is lock-free but not wait-free; a `false`/`None` result is
/// final for that call and the caller picks the backoff policy.
///
/// Unlike a bare two-index ring, value visibility is tied to slot ownership
/// through per-slot stamps. The price is that `push` may report full while a
/// consumer is still copying out of the slot it needs, and `pop` may report
/// empty while a producer that already reserved the head slot is still
/// storing into it.
///
/// ```
/// use mpmc_ring::BoundedConcurrentQueue;
///
/// let q = BoundedConcurrentQueue::<u32, 2>::new();
/// assert!(q.push(1) && q.push(2));
/// assert!(!q.push(3));
/// assert_eq!(q.pop(), Some(1));
/// assert_eq!(q.effective_size(), 1);
/// ```
///
/// Element types that own resources do not build:
///
/// ```compile_fail
/// use mpmc_ring::BoundedConcurrentQueue;
///
/// let _q = BoundedConcurrentQueue::<String, 4>::new();
/// ```
///
/// Neither does a zero capacity:
///
/// ```compile_fail
/// use mpmc_ring::BoundedConcurrentQueue;
///
/// let _q = BoundedConcurrentQueue::<u8, 0>::new();
/// ```
pub struct BoundedConcurrentQueue<T: Copy, const N: usize> {
   read_pos: CachePadded<AtomicUsize>,
   write_pos: CachePadded<AtomicUsize>,
   buffer: NonNull<Slot<T>>, // N + 1 slots
   owns_buffer: bool,
}

unsafe impl<T: Copy + Send, const N: usize> Send for BoundedConcurrentQueue<T, N> {}
unsafe impl<T: Copy + Send, const N: usize> Sync for BoundedConcurrentQueue<T, N> {}

impl<T: Copy, const N: usize> BoundedConcurrentQueue<T, N> {
   /// Physical slots, including the sentinel.
   pub(crate) const SLOTS: usize = N + 1;
   const ONE_LAP: usize = (N + 1).next_power_of_two();

   /// Allocate an empty queue on the heap.
   pub fn new() -> Self {
      const { assert!(N > 0, "capacity must be > 0") };
      const { assert!(N <= MAX_CAPACITY, "capacity exceeds MAX_CAPACITY") };

      let slots: Box<[Slot<T>]> = (0..Self::SLOTS).map(Slot::new).collect();
      let buffer = NonNull::from(Box::leak(slots)).cast::<Slot<T>>();
      debug!(capacity = N, slots = Self::SLOTS, "queue allocated");

      Self {
         read_pos: CachePadded::new(AtomicUsize::new(0)),
         write_pos: CachePadded::new(AtomicUsize::new(0)),
         buffer,
         owns_buffer: true,
      }
   }

   #[inline]
   pub(crate) const fn index_of(pos: usize) -> usize {
      pos & (Self::ONE_LAP - 1)
   }

   /// Position following `pos`, moving to index 0 of the next lap after the last slot.
   #[inline]
   pub(crate) const fn advance(pos: usize) -> usize {
      if Self::index_of(pos) + 1 < Self::SLOTS {
         pos.wrapping_add(1)
      } else {
         (pos & !(Self::ONE_LAP - 1)).wrapping_add(Self::ONE_LAP)
      }
   }

   #[inline]
   fn slot(&self, index: usize) -> &Slot<T> {
      debug_assert!(index < Self::SLOTS);
      // index always comes from `index_of` on a valid position
      unsafe { &*self.buffer.as_ptr().add(index) }
   }

   /*────────────────────────────── operations ──────────────────────────────*/

   /// Append `value`. Returns `false`, leaving the queue untouched, when
   /// `N` values are already stored.
   pub fn push(&self, value: T) -> bool {
      let mut tail = self.write_pos.load(Ordering::Relaxed);
      loop {
         let index = Self::index_of(tail);
         let next = Self::advance(tail);
         let slot = self.slot(index);
         let stamp = slot.stamp.load(Ordering::Acquire);

         if stamp == tail {
            // Slot free for this lap; the Acquire above orders this load after
            // the consumer that released it advanced `read_pos`.
            let head = self.read_pos.load(Ordering::Acquire);
            if Self::index_of(next) == Self::index_of(head) {
               trace!(write = index, read = Self::index_of(head), "push rejected: full");
               return false;
            }

            match self.write_pos.compare_exchange_weak(
               tail,
               next,
               Ordering::SeqCst,
               Ordering::Relaxed,
            ) {
               Ok(_) => {
                  slot.value.with_mut(|p| unsafe { p.write(MaybeUninit::new(value)) });
                  slot.stamp.store(tail.wrapping_add(1), Ordering::Release);
                  return true;
               }
               Err(current) => {
                  trace!(write = index, "push lost CAS race");
                  tail = current;
                  spin_loop();
               }
            }
         } else if stamp.wrapping_add(Self::ONE_LAP) == tail.wrapping_add(1) {
            // Previous lap's value is still being copied out.
            trace!(write = index, "push rejected: slot not yet released");
            return false;
         } else {
            // Another producer moved `write_pos` past our snapshot.
            spin_loop();
            tail = self.write_pos.load(Ordering::Relaxed);
         }
      }
   }

   /// Remove the oldest published value, or `None` when there is none.
   pub fn pop(&self) -> Option<T> {
      let mut head = self.read_pos.load(Ordering::Relaxed);
      loop {
         let index = Self::index_of(head);
         let slot = self.slot(index);
         let stamp = slot.stamp.load(Ordering::Acquire);

         if stamp == head.wrapping_add(1) {
            match self.read_pos.compare_exchange_weak(
               head,
               Self::advance(head),
               Ordering::SeqCst,
               Ordering::Relaxed,
            ) {
               Ok(_) => {
                  let value = slot.value.with(|p| unsafe { p.read().assume_init() });
                  slot.stamp.store(head.wrapping_add(Self::ONE_LAP), Ordering::Release);
                  return Some(value);
               }
               Err(current) => {
                  trace!(read = index, "pop lost CAS race");
                  head = current;
                  spin_loop();
               }
            }
         } else if stamp == head {
            // Nothing published at the head: empty, or a producer is mid-store.
            trace!(read = index, "pop rejected: empty");
            return None;
         } else if stamp.wrapping_add(Self::ONE_LAP) == head.wrapping_add(1) {
            // The previous lap's consumer has advanced `read_pos` but not yet
            // released this slot, so nothing newer can be published here.
            trace!(read = index, "pop rejected: slot not yet released");
            return None;
         } else {
            // Another consumer moved `read_pos` past our snapshot.
            spin_loop();
            head = self.read_pos.load(Ordering::Relaxed);
         }
      }
   }

   /// Out-parameter form of [`pop`](Self::pop); `out` is untouched on failure.
   pub fn pop_into(&self, out: &mut T) -> bool {
      match self.pop() {
         Some(v) => {
            *out = v;
            true
         }
         None => false,
      }
   }

   /// `true` iff the read and write positions coincide at the instant of the call.
   pub fn is_empty(&self) -> bool {
      let head = self.read_pos.load(Ordering::SeqCst);
      let tail = self.write_pos.load(Ordering::SeqCst);
      Self::index_of(head) == Self::index_of(tail)
   }

   /// Forward distance from the read to the write position, wrapping at
   /// `N + 1`. Always within `0..=N`.
   pub fn effective_size(&self) -> usize {
      let (read, write) = self.positions();
      Self::distance(read, write)
   }

   #[inline]
   const fn distance(read: usize, write: usize) -> usize {
      if write >= read {
         write - read
      } else {
         Self::SLOTS - read + write
      }
   }

   /// Usable capacity `N`.
   pub const fn capacity(&self) -> usize {
      N
   }

   /// Physical slot count `N + 1`.
   pub const fn slot_count(&self) -> usize {
      Self::SLOTS
   }

   /// Consistent `(read, write)` slot indices: `write_pos` is re-read until
   /// it did not move around the `read_pos` load.
   pub(crate) fn positions(&self) -> (usize, usize) {
      loop {
         let tail = self.write_pos.load(Ordering::SeqCst);
         let head = self.read_pos.load(Ordering::SeqCst);
         if self.write_pos.load(Ordering::SeqCst) == tail {
            return (Self::index_of(head), Self::index_of(tail));
         }
         spin_loop();
      }
   }

   /// Copy of the value in slot `index`.
   ///
   /// # Safety
   /// The slot must hold a published value and no producer may be writing
   /// to it for the duration of the call.
   pub(crate) unsafe fn read_slot(&self, index: usize) -> T {
      self.slot(index).value.with(|p| p.read().assume_init())
   }
}

/*──────────────  shared-memory in-place constructor  ──────────────────────*/

#[cfg(not(loom))]
impl<T: Copy, const N: usize> BoundedConcurrentQueue<T, N> {
   fn shared_layout() -> Result<(std::alloc::Layout, usize), crate::ShmError> {
      let header = std::alloc::Layout::new::<Self>();
      let slots = std::alloc::Layout::array::<Slot<T>>(Self::SLOTS)?;
      let (layout, offset) = header.extend(slots)?;
      Ok((layout.pad_to_align(), offset))
   }

   /// Bytes required for the header followed by the `N + 1` slots.
   pub fn shared_size() -> Result<usize, crate::ShmError> {
      Self::shared_layout().map(|(layout, _)| layout.size())
   }

   /// Build an empty queue in place at `mem`, slots directly after the header.
   ///
   /// # Safety
   /// `mem` must point to `len` writable bytes that stay mapped, at the same
   /// address in every process using the queue, for as long as the returned
   /// reference is used. No other reference into that memory may be live.
   pub unsafe fn init_in_shared<'a>(
      mem: *mut u8,
      len: usize,
   ) -> Result<&'a mut Self, crate::ShmError> {
      const { assert!(N > 0, "capacity must be > 0") };
      const { assert!(N <= MAX_CAPACITY, "capacity exceeds MAX_CAPACITY") };

      let (layout, offset) = Self::shared_layout()?;
      if mem.is_null() || (mem as usize) % layout.align() != 0 {
         return Err(crate::ShmError::Misaligned { align: layout.align() });
      }
      if len < layout.size() {
         return Err(crate::ShmError::TooSmall { need: layout.size(), got: len });
      }

      let slots = mem.add(offset).cast::<Slot<T>>();
      for i in 0..Self::SLOTS {
         slots.add(i).write(Slot::new(i));
      }

      let header = mem.cast::<Self>();
      header.write(Self {
         read_pos: CachePadded::new(AtomicUsize::new(0)),
         write_pos: CachePadded::new(AtomicUsize::new(0)),
         buffer: NonNull::new_unchecked(slots),
         owns_buffer: false,
      });
      debug!(capacity = N, bytes = layout.size(), "queue placed in shared memory");

      Ok(&mut *header)
   }
}

/*────────────────────────────── trait glue ────────────────────────────────*/

impl<T: Copy + Send, const N: usize> ConcurrentQueue<T> for BoundedConcurrentQueue<T, N> {
   #[inline]
   fn push(&self, item: T) -> bool {
      BoundedConcurrentQueue::push(self, item)
   }

   #[inline]
   fn pop(&self) -> Option<T> {
      BoundedConcurrentQueue::pop(self)
   }

   #[inline]
   fn is_empty(&self) -> bool {
      BoundedConcurrentQueue::is_empty(self)
   }

   #[inline]
   fn effective_size(&self) -> usize {
      BoundedConcurrentQueue::effective_size(self)
   }

   #[inline]
   fn capacity(&self) -> usize {
      N
   }
}

impl<T: Copy, const N: usize> Default for BoundedConcurrentQueue<T, N> {
   fn default() -> Self {
      Self::new()
   }
}

impl<T: Copy, const N: usize> Drop for BoundedConcurrentQueue<T, N> {
   fn drop(&mut self) {
      // `T: Copy`, so only the slot array itself needs freeing.
      if self.owns_buffer {
         unsafe {
            let slice = std::ptr::slice_from_raw_parts_mut(self.buffer.as_ptr(), Self::SLOTS);
            drop(Box::from_raw(slice));
         }
      }
   }
}

impl<T: Copy, const N: usize> fmt::Debug for BoundedConcurrentQueue<T, N> {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      let (read, write) = self.positions();
      f.debug_struct("BoundedConcurrentQueue")
         .field("capacity", &N)
         .field("read_pos", &read)
         .field("write_pos", &write)
         .field("effective_size", &Self::distance(read, write))
         .field("owns_buffer", &self.owns_buffer)
         .finish()
   }
}
