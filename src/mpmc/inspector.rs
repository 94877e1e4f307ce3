// Diagnostic walk over the occupied slots of a queue.

use super::BoundedConcurrentQueue;
use crate::trace::debug;

/// Single-threaded view of a queue's occupied slots, for tests and debugging.
///
/// Holding an `Inspector` requires `&mut` access to the queue, so no `push`
/// or `pop` can run on it from this process while the walk is in progress.
/// A queue placed in shared memory can still be mutated by *other*
/// processes; inspecting it then is a logic error and may observe
/// half-written slots. Never use this on a concurrent code path.
pub struct Inspector<'a, T: Copy, const N: usize> {
   queue: &'a mut BoundedConcurrentQueue<T, N>,
}

impl<'a, T: Copy, const N: usize> Inspector<'a, T, N> {
   pub fn new(queue: &'a mut BoundedConcurrentQueue<T, N>) -> Self {
      Self { queue }
   }

   /// `(read, write)` slot indices.
   pub fn positions(&self) -> (usize, usize) {
      self.queue.positions()
   }

   /// Call `visit(index, &value)` for every occupied physical slot, in
   /// ascending index order. An empty queue visits nothing.
   pub fn visit<F>(&self, mut visit: F)
   where
      F: FnMut(usize, &T),
   {
      let (read, write) = self.positions();
      debug!(read, write, "inspecting occupied slots");

      for index in 0..BoundedConcurrentQueue::<T, N>::SLOTS {
         let occupied = if write >= read {
            index >= read && index < write
         } else {
            index >= read || index < write
         };
         if occupied {
            // exclusive borrow: every slot between read and write is published
            let value = unsafe { self.queue.read_slot(index) };
            visit(index, &value);
         }
      }
   }

   /// Occupied slots as `(index, value)` pairs, ascending by index.
   pub fn occupied(&self) -> Vec<(usize, T)> {
      let mut out = Vec::with_capacity(self.queue.effective_size());
      self.visit(|i, v| out.push((i, *v)));
      out
   }
}

#[cfg(all(test, not(loom)))]
mod tests {
   use super::*;
   use std::collections::HashSet;

   #[test]
   fn empty_queue_visits_nothing() {
      let mut q = BoundedConcurrentQueue::<i32, 3>::new();
      let mut calls = 0;
      Inspector::new(&mut q).visit(|_, _| calls += 1);
      assert_eq!(calls, 0);

      // empty again, but with both positions parked mid-ring
      q.push(1);
      q.push(2);
      q.pop();
      q.pop();
      assert_eq!(Inspector::new(&mut q).positions(), (2, 2));
      assert!(Inspector::new(&mut q).occupied().is_empty());
   }

   #[test]
   fn contiguous_range() {
      let mut q = BoundedConcurrentQueue::<i32, 4>::new();
      for v in [10, 20, 30] {
         assert!(q.push(v));
      }
      assert_eq!(q.pop(), Some(10));
      assert_eq!(Inspector::new(&mut q).occupied(), vec![(1, 20), (2, 30)]);
   }

   #[test]
   fn wrapped_range_sees_unique_values() {
      let mut q = BoundedConcurrentQueue::<i32, 3>::new();
      for v in 0..3 {
         assert!(q.push(v));
      }
      q.pop();
      q.pop();
      assert!(q.push(999));
      assert!(q.push(9999));

      let mut seen = HashSet::new();
      Inspector::new(&mut q).visit(|i, v| {
         assert!(seen.insert(*v), "duplicate value {v} at slot {i}");
      });
      assert_eq!(seen.len(), 3);
      assert_eq!(
         Inspector::new(&mut q).occupied(),
         vec![(0, 9999), (2, 2), (3, 999)]
      );
   }
}
