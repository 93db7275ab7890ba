use std::{mem, ops::Deref, sync::Arc};

use machine_learning::{Example, ExamplePool};
use parking_lot::{Condvar, Mutex};

/// A ring slot, occupied while `example` is set.
struct Slot {
    example: Option<Arc<Example>>,
    /// Consumers that still have to finish with the example.
    pending: usize,
}

struct RingState {
    slots: Vec<Slot>,
    /// The sequence number the next pushed example gets.
    head: u64,
    closed: bool,
    pool: ExamplePool,
}

/// A bounded single producer, multiple consumer example queue.
///
/// Every consumer sees every example exactly once and in order. An example goes
/// back to the pool once the last consumer drops its `Lease`, and the producer
/// blocks while the slot it needs is still held by a lagging consumer.
pub struct ExampleRing {
    state: Mutex<RingState>,
    changed: Condvar,
    consumers: usize,
    /// Swapped into a dropped `Lease` so it can hand its example back.
    blank: Arc<Example>,
}

impl ExampleRing {
    /// Creates a new `ExampleRing`.
    ///
    /// # Args
    /// * `capacity` - The amount of examples in flight, at least 1.
    /// * `consumers` - The amount of consumers every example waits for, at least 1.
    pub fn new(capacity: usize, consumers: usize) -> Self {
        let slots = (0..capacity.max(1))
            .map(|_| Slot {
                example: None,
                pending: 0,
            })
            .collect();

        Self {
            state: Mutex::new(RingState {
                slots,
                head: 0,
                closed: false,
                pool: ExamplePool::new(),
            }),
            changed: Condvar::new(),
            consumers: consumers.max(1),
            blank: Arc::new(Example::new()),
        }
    }

    /// Takes a cleared example out of the ring's pool for the producer to fill.
    pub fn acquire(&self) -> Example {
        self.state.lock().pool.acquire()
    }

    /// Publishes `ex` to every consumer, waiting for its slot to free up.
    ///
    /// # Returns
    /// The example's sequence number.
    pub fn push(&self, ex: Example) -> u64 {
        let mut state = self.state.lock();
        let capacity = state.slots.len() as u64;

        loop {
            let at = (state.head % capacity) as usize;
            if state.slots[at].example.is_none() {
                break;
            }
            self.changed.wait(&mut state);
        }

        let seq = state.head;
        let at = (seq % capacity) as usize;
        state.slots[at] = Slot {
            example: Some(Arc::new(ex)),
            pending: self.consumers,
        };
        state.head += 1;

        self.changed.notify_all();
        seq
    }

    /// Marks the end of the stream, consumers drain what's left and stop.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.changed.notify_all();
    }

    /// Waits for the example following `cursor` and advances it.
    ///
    /// # Returns
    /// `None` once the ring is closed and the consumer saw every example.
    pub fn next(&self, cursor: &mut u64) -> Option<Lease<'_>> {
        let mut state = self.state.lock();

        while *cursor >= state.head {
            if state.closed {
                return None;
            }
            self.changed.wait(&mut state);
        }

        let seq = *cursor;
        let at = (seq % state.slots.len() as u64) as usize;
        let example = state.slots[at].example.clone()?;
        *cursor += 1;

        Some(Lease {
            ring: self,
            seq,
            example,
        })
    }

    /// Examples sitting in the pool.
    pub fn pooled(&self) -> usize {
        self.state.lock().pool.len()
    }

    fn finish(&self, seq: u64, example: Arc<Example>) {
        drop(example);

        let mut guard = self.state.lock();
        let state = &mut *guard;
        let at = (seq % state.slots.len() as u64) as usize;
        let slot = &mut state.slots[at];
        slot.pending -= 1;

        if slot.pending > 0 {
            return;
        }

        if let Some(example) = slot.example.take()
            && let Ok(example) = Arc::try_unwrap(example)
        {
            state.pool.release(example);
        }

        self.changed.notify_all();
    }
}

/// A consumer's hold on one example of the ring.
pub struct Lease<'a> {
    ring: &'a ExampleRing,
    seq: u64,
    example: Arc<Example>,
}

impl Lease<'_> {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl Deref for Lease<'_> {
    type Target = Example;

    fn deref(&self) -> &Example {
        &self.example
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        let example = mem::replace(&mut self.example, Arc::clone(&self.ring.blank));
        self.ring.finish(self.seq, example);
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use machine_learning::Label;

    use super::*;

    fn labeled(label: f32) -> Example {
        let mut ex = Example::new();
        ex.label = Label::simple(label);
        ex
    }

    #[test]
    fn every_consumer_sees_every_example_once() {
        const CONSUMERS: usize = 3;
        const EXAMPLES: usize = 200;

        let ring = ExampleRing::new(4, CONSUMERS);

        let seen: Vec<Vec<f32>> = thread::scope(|s| {
            let handles: Vec<_> = (0..CONSUMERS)
                .map(|_| {
                    s.spawn(|| {
                        let mut cursor = 0;
                        let mut seen = Vec::new();
                        while let Some(lease) = ring.next(&mut cursor) {
                            seen.push(lease.label.scalar().unwrap());
                        }
                        seen
                    })
                })
                .collect();

            for i in 0..EXAMPLES {
                let mut ex = ring.acquire();
                ex.label = Label::simple(i as f32);
                ring.push(ex);
            }
            ring.close();

            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let expected: Vec<f32> = (0..EXAMPLES).map(|i| i as f32).collect();
        for consumer in seen {
            assert_eq!(consumer, expected);
        }

        // Examples are recycled, at most one per slot plus the one being filled exist.
        assert!(ring.pooled() <= 5);
        assert!(ring.pooled() > 0);
    }

    #[test]
    fn producer_waits_for_the_slowest_consumer() {
        let ring = ExampleRing::new(1, 2);
        ring.push(labeled(1.));

        let mut fast = 0;
        let mut slow = 0;

        let first = ring.next(&mut fast).unwrap();
        let held = ring.next(&mut slow).unwrap();
        drop(first);

        thread::scope(|s| {
            let producer = s.spawn(|| ring.push(labeled(2.)));

            thread::sleep(std::time::Duration::from_millis(50));
            assert!(!producer.is_finished());

            drop(held);
            assert_eq!(producer.join().unwrap(), 1);
        });

        assert_eq!(ring.next(&mut fast).unwrap().label.scalar(), Some(2.));
    }

    #[test]
    fn dropped_leases_recycle_the_example() {
        let ring = ExampleRing::new(1, 2);
        ring.push(labeled(1.));

        let (mut a, mut b) = (0, 0);
        let first = ring.next(&mut a).unwrap();
        let second = ring.next(&mut b).unwrap();
        assert_eq!(first.seq(), second.seq());

        drop(first);
        assert_eq!(ring.pooled(), 0);
        assert_eq!(second.label.scalar(), Some(1.));

        drop(second);
        assert_eq!(ring.pooled(), 1);
        assert_eq!(ring.blank.label.scalar(), None);
    }

    #[test]
    fn closed_ring_drains() {
        let ring = ExampleRing::new(2, 1);
        ring.push(labeled(1.));
        ring.close();

        let mut cursor = 0;
        assert!(ring.next(&mut cursor).is_some());
        assert!(ring.next(&mut cursor).is_none());
    }
}
