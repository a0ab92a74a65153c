//! Success/failure detection for double-spend rounds
//!
//! The [`OutcomeManager`] follows the best trusted and attacker chain of the
//! running round. After every update it checks whether the attack succeeded
//! or can be declared failed. The first decision of a round is reported
//! exactly once, after which the network is told to stop and all counters
//! return to zero.

use std::{
    fmt::Display,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use log::debug;
use parking_lot::Mutex;

use crate::network::StopSignal;

/// Receives one record per finished round.
pub trait Reporter<R>: Send + Sync {
    fn report(&self, record: R);
}

/// Result of a double-spend round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    Success,
    Failure,
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "SUCCESS"),
            Self::Failure => write!(f, "FAILURE"),
        }
    }
}

/// Record reported at the end of a double-spend round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundOutcome {
    pub outcome: Outcome,
    pub attacker_length: u64,
    pub trusted_length: u64,
    pub attacker_stale: u64,
    pub trusted_stale: u64,
}

impl Display for RoundOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, attacker={}, trusted={}, attacker stale={}, trusted stale={}",
            self.outcome,
            self.attacker_length,
            self.trusted_length,
            self.attacker_stale,
            self.trusted_stale
        )
    }
}

/// Criterion under which a round counts as a successful attack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SuccessRule {
    /// The attacker chain is longer than a trusted chain which already holds
    /// the required confirmations.
    Race,
    /// Every trusted node has switched to the double-spend chain.
    Consensus,
    /// Either of the above.
    #[default]
    RaceOrConsensus,
}

/// Limits which end a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Largest trusted lead the attacker may still recover from. `None` if
    /// the attacker can always catch up.
    pub max_lead: Option<u64>,
    /// Longest chain after which the round is abandoned.
    pub max_length: u64,
    /// Number of trusted nodes which must be convinced under
    /// [`SuccessRule::Consensus`].
    pub trusted_nodes: u64,
    pub rule: SuccessRule,
}

/// Counters of the running round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoundState {
    pub trusted: u64,
    pub attacker: u64,
    pub trusted_stale: u64,
    pub attacker_stale: u64,
    pub convinced: u64,
}

impl RoundState {
    /// Returns the outcome these counters lead to, if any. Success takes
    /// precedence when both criteria hold at once.
    pub fn decide(
        &self,
        confirmations: u64,
        thresholds: &Thresholds,
    ) -> Option<Outcome> {
        let race = self.trusted >= confirmations && self.attacker > self.trusted;
        let consensus = self.convinced >= thresholds.trusted_nodes;
        let success = match thresholds.rule {
            SuccessRule::Race => race,
            SuccessRule::Consensus => consensus,
            SuccessRule::RaceOrConsensus => race || consensus,
        };
        if success {
            return Some(Outcome::Success);
        }

        let lead = self.trusted.saturating_sub(self.attacker);
        let hopeless = thresholds.max_lead.map_or(false, |max| lead > max);
        let too_long = self.trusted.max(self.attacker) > thresholds.max_length;
        if hopeless || too_long {
            return Some(Outcome::Failure);
        }

        None
    }
}

/// Shared tracker of a double-spend round's progress.
pub struct OutcomeManager {
    state: Mutex<RoundState>,
    thresholds: Thresholds,
    confirmations: AtomicU64,
    stop: Arc<StopSignal>,
    reporter: Arc<dyn Reporter<RoundOutcome>>,
}

impl std::fmt::Debug for OutcomeManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeManager")
            .field("state", &self.state.try_lock().map(|state| *state))
            .field("thresholds", &self.thresholds)
            .field("confirmations", &self.confirmations())
            .finish_non_exhaustive()
    }
}

impl OutcomeManager {
    pub fn new(
        thresholds: Thresholds,
        stop: Arc<StopSignal>,
        reporter: Arc<dyn Reporter<RoundOutcome>>,
    ) -> Self {
        Self {
            state: Mutex::new(RoundState::default()),
            thresholds,
            confirmations: AtomicU64::new(0),
            stop,
            reporter,
        }
    }

    #[inline]
    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Confirmations required by the running round.
    #[inline]
    pub fn confirmations(&self) -> u64 {
        self.confirmations.load(Ordering::Acquire)
    }

    /// Prepares the manager for a round requiring `confirmations`.
    pub fn begin_round(&self, confirmations: u64) {
        let mut state = self.state.lock();
        *state = RoundState::default();
        self.confirmations.store(confirmations, Ordering::Release);
    }

    /// Snapshot of the running round's counters.
    pub fn state(&self) -> RoundState {
        *self.state.lock()
    }

    /// Records a trusted chain of `length` blocks. Lengths which do not
    /// exceed the best known trusted chain count as stale blocks.
    pub fn register_trusted_chain(&self, length: u64) {
        self.update(|state| {
            if length <= state.trusted {
                state.trusted_stale += 1;
            } else {
                state.trusted = length;
            }
        });
    }

    /// Records an attacker chain of `length` blocks. Lengths which do not
    /// exceed the best known attacker chain count as stale blocks.
    pub fn register_attacker_chain(&self, length: u64) {
        self.update(|state| {
            if length <= state.attacker {
                state.attacker_stale += 1;
            } else {
                state.attacker = length;
            }
        });
    }

    /// A trusted node switched onto the double-spend chain.
    pub fn add_convinced(&self) {
        self.update(|state| state.convinced += 1);
    }

    /// A trusted node switched back off the double-spend chain.
    pub fn remove_convinced(&self) {
        self.update(|state| {
            assert!(state.convinced > 0, "convinced node count underflow");
            state.convinced -= 1;
        });
    }

    fn update<F>(&self, apply: F)
    where
        F: FnOnce(&mut RoundState),
    {
        let mut state = self.state.lock();
        // Late events of a decided round
        if self.stop.is_stopped() {
            return;
        }

        apply(&mut state);

        if let Some(outcome) = state.decide(self.confirmations(), &self.thresholds)
        {
            let record = RoundOutcome {
                outcome,
                attacker_length: state.attacker,
                trusted_length: state.trusted,
                attacker_stale: state.attacker_stale,
                trusted_stale: state.trusted_stale,
            };
            debug!("round over: {}", record);

            self.reporter.report(record);
            self.stop.stop();
            *state = RoundState::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use proptest::prelude::*;

    use super::{
        Outcome, OutcomeManager, Reporter, RoundOutcome, RoundState,
        SuccessRule, Thresholds,
    };
    use crate::network::StopSignal;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<RoundOutcome>>);

    impl Reporter<RoundOutcome> for Recorder {
        fn report(&self, record: RoundOutcome) {
            self.0.lock().push(record);
        }
    }

    fn thresholds(max_lead: Option<u64>) -> Thresholds {
        Thresholds {
            max_lead,
            max_length: 1000,
            trusted_nodes: 4,
            rule: SuccessRule::RaceOrConsensus,
        }
    }

    fn manager(
        max_lead: Option<u64>,
    ) -> (OutcomeManager, Arc<Recorder>, Arc<StopSignal>) {
        let recorder = Arc::new(Recorder::default());
        let stop = Arc::new(StopSignal::default());
        let manager = OutcomeManager::new(
            thresholds(max_lead),
            Arc::clone(&stop),
            recorder.clone(),
        );

        (manager, recorder, stop)
    }

    #[test]
    fn attacker_overtaking_confirmed_chain_succeeds() {
        let (manager, recorder, stop) = manager(Some(5));
        manager.begin_round(3);

        for length in 1..=3 {
            manager.register_trusted_chain(length);
        }
        for length in 1..=3 {
            manager.register_attacker_chain(length);
        }
        assert!(recorder.0.lock().is_empty());

        manager.register_attacker_chain(4);

        assert_eq!(
            *recorder.0.lock(),
            vec![RoundOutcome {
                outcome: Outcome::Success,
                attacker_length: 4,
                trusted_length: 3,
                attacker_stale: 0,
                trusted_stale: 0,
            }]
        );
        assert!(stop.is_stopped());
    }

    #[test]
    fn excessive_trusted_lead_fails() {
        let (manager, recorder, _) = manager(Some(5));
        manager.begin_round(6);

        for length in 1..=3 {
            manager.register_attacker_chain(length);
        }
        for length in 1..=10 {
            manager.register_trusted_chain(length);
        }

        let reports = recorder.0.lock();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].outcome, Outcome::Failure);
        assert_eq!(reports[0].attacker_length, 3);
        // The lead first exceeds 5 at length 9; later events are ignored.
        assert_eq!(reports[0].trusted_length, 9);
    }

    #[test]
    fn state_is_cleared_after_report() {
        let (manager, _, stop) = manager(None);
        manager.begin_round(1);

        manager.register_trusted_chain(1);
        manager.register_trusted_chain(1);
        manager.register_attacker_chain(2);

        assert!(stop.is_stopped());
        assert_eq!(manager.state(), RoundState::default());

        manager.register_attacker_chain(7);
        assert_eq!(manager.state(), RoundState::default());
    }

    #[test]
    fn convincing_every_trusted_node_succeeds() {
        let (manager, recorder, _) = manager(None);
        manager.begin_round(6);

        manager.register_trusted_chain(1);
        for _ in 0..3 {
            manager.add_convinced();
        }
        manager.remove_convinced();
        manager.add_convinced();
        assert!(recorder.0.lock().is_empty());

        manager.add_convinced();
        assert_eq!(recorder.0.lock()[0].outcome, Outcome::Success);
    }

    #[test]
    fn shorter_registrations_count_as_stale() {
        let (manager, _, _) = manager(None);
        manager.begin_round(100);

        manager.register_trusted_chain(2);
        manager.register_trusted_chain(1);
        manager.register_trusted_chain(2);
        manager.register_attacker_chain(1);
        manager.register_attacker_chain(1);

        let state = manager.state();
        assert_eq!((state.trusted, state.trusted_stale), (2, 2));
        assert_eq!((state.attacker, state.attacker_stale), (1, 1));
    }

    #[test]
    fn race_rule_ignores_convinced_nodes() {
        let mut limits = thresholds(None);
        limits.rule = SuccessRule::Race;
        let state = RoundState { convinced: 4, trusted: 1, ..Default::default() };

        assert_eq!(state.decide(6, &limits), None);

        limits.rule = SuccessRule::Consensus;
        assert_eq!(state.decide(6, &limits), Some(Outcome::Success));
    }

    proptest! {
        #[test]
        fn decision_follows_thresholds(
            trusted in 0u64..40,
            attacker in 0u64..40,
            confirmations in 0u64..10,
            max_lead in 0u64..10,
        ) {
            let limits = Thresholds { max_length: 30, ..thresholds(Some(max_lead)) };
            let state = RoundState { trusted, attacker, ..Default::default() };

            let success = trusted >= confirmations && attacker > trusted;
            let failure = trusted.saturating_sub(attacker) > max_lead
                || trusted.max(attacker) > 30;
            let expected = if success {
                Some(Outcome::Success)
            } else if failure {
                Some(Outcome::Failure)
            } else {
                None
            };

            prop_assert_eq!(state.decide(confirmations, &limits), expected);
        }
    }
}
