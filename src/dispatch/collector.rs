use super::outcome::JobOutcome;

/// What happened to an outcome handed to [`ResultCollector::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Recorded,
    /// The index already had a terminal outcome; the new one was dropped.
    Duplicate,
    OutOfRange,
    /// A retryable intermediate outcome; only terminal outcomes are kept.
    NotTerminal,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectError {
    #[error("{} of {} chunks have no terminal outcome", .missing.len(), .total)]
    Incomplete { total: usize, missing: Vec<usize> },
}

/// Terminal outcomes for every chunk, in chunk order.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedOutcomes {
    pub outcomes: Vec<JobOutcome>,
    /// Indices of chunks that ended without audio, ascending.
    pub failed: Vec<usize>,
}

impl CollectedOutcomes {
    fn from_ordered(outcomes: Vec<JobOutcome>) -> Self {
        let failed = outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| o.chunk_index)
            .collect();
        Self { outcomes, failed }
    }

    pub fn succeeded_count(&self) -> usize {
        self.outcomes.len() - self.failed.len()
    }
}

/// Order-restoring fan-in buffer: one slot per chunk index.
///
/// Outcomes may arrive in any order. The first terminal outcome for an index
/// wins; later ones are logged and ignored.
#[derive(Debug)]
pub struct ResultCollector {
    slots: Vec<Option<JobOutcome>>,
    remaining: usize,
}

impl ResultCollector {
    pub fn new(total: usize) -> Self {
        Self {
            slots: vec![None; total],
            remaining: total,
        }
    }

    pub fn total(&self) -> usize {
        self.slots.len()
    }

    pub fn apply(&mut self, outcome: JobOutcome) -> Applied {
        let index = outcome.chunk_index;
        if !outcome.is_terminal() {
            log::debug!("ignoring non-terminal outcome for chunk {index}");
            return Applied::NotTerminal;
        }

        let Some(slot) = self.slots.get_mut(index) else {
            log::warn!(
                "anomalous outcome for chunk {index}: only {} chunks exist",
                self.slots.len()
            );
            return Applied::OutOfRange;
        };

        if slot.is_some() {
            log::warn!("anomalous duplicate outcome for chunk {index}; keeping the first");
            return Applied::Duplicate;
        }

        *slot = Some(outcome);
        self.remaining -= 1;
        Applied::Recorded
    }

    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }

    pub fn missing(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn finish(self) -> Result<CollectedOutcomes, CollectError> {
        if !self.is_complete() {
            return Err(CollectError::Incomplete {
                total: self.slots.len(),
                missing: self.missing(),
            });
        }
        Ok(CollectedOutcomes::from_ordered(
            self.slots.into_iter().flatten().collect(),
        ))
    }

    /// Finish, recording every index still without an outcome as cancelled.
    pub fn finish_or_cancel(mut self) -> CollectedOutcomes {
        for index in self.missing() {
            log::warn!("chunk {index} never reached a terminal state; marking it cancelled");
            self.slots[index] = Some(JobOutcome::cancelled(index, 0));
        }
        CollectedOutcomes::from_ordered(self.slots.into_iter().flatten().collect())
    }
}

/// Gather an unordered set of outcomes for `total` chunks into chunk order.
pub fn collect(
    total: usize,
    outcomes: impl IntoIterator<Item = JobOutcome>,
) -> Result<CollectedOutcomes, CollectError> {
    let mut collector = ResultCollector::new(total);
    for outcome in outcomes {
        collector.apply(outcome);
    }
    collector.finish()
}

#[cfg(test)]
mod tests {
    use super::{collect, Applied, CollectError, ResultCollector};
    use crate::dispatch::outcome::{FailureReason, JobOutcome, JobStatus};
    use crate::synthesis::{AudioArtifact, SynthesisError};

    fn ok(index: usize) -> JobOutcome {
        JobOutcome::succeeded(index, AudioArtifact::new(format!("c{index}.wav")), 1)
    }

    fn failed(index: usize) -> JobOutcome {
        JobOutcome::failed(
            index,
            FailureReason::Rejected(SynthesisError::permanent("bad")),
            1,
        )
    }

    #[test]
    fn restores_order_from_any_arrival_order() {
        let collected = collect(4, vec![ok(3), failed(1), ok(0), ok(2)]).unwrap();
        let order: Vec<usize> = collected.outcomes.iter().map(|o| o.chunk_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
        assert_eq!(collected.failed, vec![1]);
        assert_eq!(collected.succeeded_count(), 3);
    }

    #[test]
    fn first_terminal_outcome_wins() {
        let mut collector = ResultCollector::new(2);
        assert_eq!(collector.apply(ok(0)), Applied::Recorded);
        assert_eq!(collector.apply(failed(0)), Applied::Duplicate);
        assert_eq!(collector.apply(ok(1)), Applied::Recorded);

        let collected = collector.finish().unwrap();
        assert!(collected.outcomes[0].is_success());
        assert!(collected.failed.is_empty());
    }

    #[test]
    fn ignores_out_of_range_and_intermediate_outcomes() {
        let mut collector = ResultCollector::new(1);
        assert_eq!(collector.apply(ok(5)), Applied::OutOfRange);

        let retrying = JobOutcome {
            chunk_index: 0,
            status: JobStatus::FailedTransient(SynthesisError::transient("busy")),
            attempt_count: 1,
        };
        assert_eq!(collector.apply(retrying), Applied::NotTerminal);
        assert!(!collector.is_complete());
        assert_eq!(collector.missing(), vec![0]);
    }

    #[test]
    fn finish_reports_gaps() {
        let err = collect(3, vec![ok(0)]).unwrap_err();
        assert_eq!(
            err,
            CollectError::Incomplete {
                total: 3,
                missing: vec![1, 2]
            }
        );
    }

    #[test]
    fn finish_or_cancel_fills_gaps() {
        let mut collector = ResultCollector::new(3);
        collector.apply(ok(2));
        let collected = collector.finish_or_cancel();
        assert_eq!(collected.failed, vec![0, 1]);
        assert_eq!(
            collected.outcomes[0].failure(),
            Some(&FailureReason::Cancelled)
        );
    }

    #[test]
    fn empty_run_is_complete() {
        let collected = collect(0, Vec::new()).unwrap();
        assert!(collected.outcomes.is_empty());
    }
}
