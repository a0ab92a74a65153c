//! Lockstep coordination between mining threads

use parking_lot::{Condvar, Mutex};

/// Result of a call to [`RoundBarrier::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierWait {
    /// Every participant arrived and the barrier opened for the next batch.
    Released,
    /// The barrier was cancelled. Every later call returns immediately.
    Cancelled,
}

impl BarrierWait {
    #[inline]
    pub fn is_cancelled(self) -> bool {
        self == BarrierWait::Cancelled
    }
}

#[derive(Debug, Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
    cancelled: bool,
}

/// Reusable n-of-n rendezvous point which can be cancelled.
///
/// Nodes meet here after every batch of mining ticks, so all nodes perform
/// the same number of mining attempts between two synchronization points no
/// matter how the OS schedules their threads. Cancelling wakes every waiting
/// participant, which lets the first node that observes the end of a round
/// release its peers instead of leaving them blocked forever.
#[derive(Debug)]
pub struct RoundBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
    cvar: Condvar,
}

impl RoundBarrier {
    /// ## Panics
    /// Panics if `parties` is zero.
    pub fn new(parties: usize) -> Self {
        assert!(parties > 0, "a barrier needs at least one participant");

        Self {
            parties,
            state: Mutex::new(BarrierState::default()),
            cvar: Condvar::new(),
        }
    }

    #[inline]
    pub fn parties(&self) -> usize {
        self.parties
    }

    /// Blocks until all participants have arrived or the barrier is
    /// cancelled.
    pub fn wait(&self) -> BarrierWait {
        let mut state = self.state.lock();
        if state.cancelled {
            return BarrierWait::Cancelled;
        }

        state.arrived += 1;
        assert!(
            state.arrived <= self.parties,
            "{} threads arrived at a barrier for {} participants",
            state.arrived,
            self.parties
        );

        if state.arrived == self.parties {
            state.arrived = 0;
            state.generation = state.generation.wrapping_add(1);
            self.cvar.notify_all();
            return BarrierWait::Released;
        }

        let generation = state.generation;
        while state.generation == generation && !state.cancelled {
            self.cvar.wait(&mut state);
        }

        if state.generation != generation {
            BarrierWait::Released
        } else {
            BarrierWait::Cancelled
        }
    }

    /// Releases every waiting participant and makes all future waits return
    /// [`BarrierWait::Cancelled`].
    pub fn cancel(&self) {
        let mut state = self.state.lock();
        state.cancelled = true;
        self.cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        thread,
        time::Duration,
    };

    use super::{BarrierWait, RoundBarrier};

    #[test]
    fn single_participant_never_blocks() {
        let barrier = RoundBarrier::new(1);

        for _ in 0..3 {
            assert_eq!(barrier.wait(), BarrierWait::Released);
        }
    }

    #[test]
    fn participants_move_in_lockstep() {
        const THREADS: usize = 4;
        const CYCLES: usize = 50;

        let barrier = Arc::new(RoundBarrier::new(THREADS));
        let counter = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                let counter = Arc::clone(&counter);
                thread::spawn(move || {
                    for cycle in 0..CYCLES {
                        counter.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(barrier.wait(), BarrierWait::Released);
                        // Nobody starts the next cycle before everyone
                        // finished this one.
                        assert!(
                            counter.load(Ordering::SeqCst) >= (cycle + 1) * THREADS
                        );
                        assert_eq!(barrier.wait(), BarrierWait::Released);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), THREADS * CYCLES);
    }

    #[test]
    fn cancel_releases_waiting_threads() {
        let barrier = Arc::new(RoundBarrier::new(3));

        let waiters: Vec<_> = (0..2)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || barrier.wait())
            })
            .collect();

        thread::sleep(Duration::from_millis(20));
        barrier.cancel();

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), BarrierWait::Cancelled);
        }
        assert!(barrier.is_cancelled());
        assert!(barrier.wait().is_cancelled());
    }
}
