// Model-checked interleavings. Run with:
//    RUSTFLAGS="--cfg loom" cargo test --release --test loom_tests
#![cfg(loom)]

use loom::sync::Arc;
use loom::thread;
use mpmc_ring::BoundedConcurrentQueue;

#[test]
fn loom_spsc_in_order() {
   loom::model(|| {
      let queue = Arc::new(BoundedConcurrentQueue::<i32, 2>::new());
      let q_send = queue.clone();

      let producer = thread::spawn(move || {
         for i in 0..2 {
            while !q_send.push(i) {
               thread::yield_now();
            }
         }
      });

      let mut received = vec![];
      while received.len() < 2 {
         match queue.pop() {
            Some(v) => received.push(v),
            None => thread::yield_now(),
         }
      }

      producer.join().unwrap();
      assert_eq!(received, vec![0, 1]);
      assert!(queue.is_empty());
   });
}

#[test]
fn loom_two_producers_fill_capacity() {
   loom::model(|| {
      let queue = Arc::new(BoundedConcurrentQueue::<i32, 2>::new());

      let handles: Vec<_> = (0..2)
         .map(|i| {
            let q = queue.clone();
            thread::spawn(move || q.push(i))
         })
         .collect();
      for h in handles {
         assert!(h.join().unwrap(), "capacity 2 fits both pushes");
      }

      assert_eq!(queue.effective_size(), 2);
      assert!(!queue.push(9));
      let mut got = vec![queue.pop().unwrap(), queue.pop().unwrap()];
      got.sort_unstable();
      assert_eq!(got, vec![0, 1]);
   });
}

#[test]
fn loom_two_consumers_split_values() {
   loom::model(|| {
      let queue = Arc::new(BoundedConcurrentQueue::<i32, 2>::new());
      assert!(queue.push(10));
      assert!(queue.push(20));

      let handles: Vec<_> = (0..2)
         .map(|_| {
            let q = queue.clone();
            thread::spawn(move || q.pop())
         })
         .collect();
      let mut got: Vec<i32> = handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect();
      got.sort_unstable();

      assert_eq!(got, vec![10, 20]);
      assert!(queue.is_empty());
      assert_eq!(queue.effective_size(), 0);
   });
}

#[test]
fn loom_wraparound_push_pop_race() {
   loom::model(|| {
      // capacity 1: every second push reuses a slot from the previous lap
      let queue = Arc::new(BoundedConcurrentQueue::<usize, 1>::new());
      assert!(queue.push(1));
      let q_pop = queue.clone();

      let consumer = thread::spawn(move || q_pop.pop());
      let pushed = queue.push(2);

      let popped = consumer.join().unwrap();
      assert_eq!(popped, Some(1));
      assert!(queue.effective_size() <= 1);
      if pushed {
         assert_eq!(queue.pop(), Some(2));
      }
      assert_eq!(queue.pop(), None);
   });
}

#[test]
fn loom_mixed_push_pop() {
   loom::model(|| {
      let queue = Arc::new(BoundedConcurrentQueue::<usize, 2>::new());
      let q1 = queue.clone();
      let q2 = queue.clone();

      let h1 = thread::spawn(move || q1.push(1));
      let h2 = thread::spawn(move || q2.pop());
      let pushed_main = queue.push(2);

      let pushed_1 = h1.join().unwrap();
      let popped = h2.join().unwrap();

      let pushed = usize::from(pushed_1) + usize::from(pushed_main);
      let removed = usize::from(popped.is_some());
      assert_eq!(queue.effective_size(), pushed - removed);
      if let Some(v) = popped {
         assert!(v == 1 || v == 2);
      }
   });
}
