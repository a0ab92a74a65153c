//! Stale (orphan) block accounting for honest networks

use std::{fmt::Display, sync::Arc};

use log::debug;
use parking_lot::Mutex;

use crate::{network::StopSignal, outcome::Reporter};

/// Record reported at the end of a stale block round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleOutcome {
    /// Length of the longest chain when the round ended.
    pub chain_length: u64,
    /// Blocks which did not extend the longest known chain.
    pub stale_blocks: u64,
}

impl Display for StaleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "length={}, stale={}", self.chain_length, self.stale_blocks)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct StaleState {
    longest: u64,
    stale: u64,
}

/// Tracks the longest chain of a round in which every node is honest. The
/// round ends once that chain reaches `target_length`.
pub struct StaleBlockManager {
    state: Mutex<StaleState>,
    target_length: u64,
    stop: Arc<StopSignal>,
    reporter: Arc<dyn Reporter<StaleOutcome>>,
}

impl std::fmt::Debug for StaleBlockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaleBlockManager")
            .field("state", &self.state.try_lock().map(|state| *state))
            .field("target_length", &self.target_length)
            .finish_non_exhaustive()
    }
}

impl StaleBlockManager {
    pub fn new(
        target_length: u64,
        stop: Arc<StopSignal>,
        reporter: Arc<dyn Reporter<StaleOutcome>>,
    ) -> Self {
        Self {
            state: Mutex::new(StaleState::default()),
            target_length,
            stop,
            reporter,
        }
    }

    #[inline]
    pub fn target_length(&self) -> u64 {
        self.target_length
    }

    /// Clears all counters.
    pub fn begin_round(&self) {
        *self.state.lock() = StaleState::default();
    }

    /// Records a newly mined chain of `length` blocks.
    pub fn register_chain(&self, length: u64) {
        let mut state = self.state.lock();
        if self.stop.is_stopped() {
            return;
        }

        if length <= state.longest {
            state.stale += 1;
        } else {
            state.longest = length;
        }

        if state.longest >= self.target_length {
            let record = StaleOutcome {
                chain_length: state.longest,
                stale_blocks: state.stale,
            };
            debug!("round over: {}", record);

            self.reporter.report(record);
            self.stop.stop();
            *state = StaleState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::{StaleBlockManager, StaleOutcome};
    use crate::{network::StopSignal, outcome::Reporter};

    #[derive(Default)]
    struct Recorder(Mutex<Vec<StaleOutcome>>);

    impl Reporter<StaleOutcome> for Recorder {
        fn report(&self, record: StaleOutcome) {
            self.0.lock().push(record);
        }
    }

    #[test]
    fn reports_once_target_is_reached() {
        let recorder = Arc::new(Recorder::default());
        let stop = Arc::new(StopSignal::default());
        let manager = StaleBlockManager::new(3, Arc::clone(&stop), recorder.clone());

        for length in [1, 1, 2, 2, 2] {
            manager.register_chain(length);
        }
        assert!(!stop.is_stopped());

        manager.register_chain(3);
        manager.register_chain(4);

        assert!(stop.is_stopped());
        assert_eq!(
            *recorder.0.lock(),
            vec![StaleOutcome { chain_length: 3, stale_blocks: 3 }]
        );
    }
}
