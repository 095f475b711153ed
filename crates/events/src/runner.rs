//! Projection runner utilities (read model builders).
//!
//! Provides deterministic replay and cursor tracking without making storage
//! assumptions. Ledger sequence numbers are gapless, so once a runner has a
//! cursor it also refuses envelopes that skip ahead: a jump means events were
//! missed and the read model would silently drift.

use medledger_core::LedgerId;
use thiserror::Error;

use crate::{EventEnvelope, Projection};

/// Tracks projection progress for a single ledger.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ProjectionCursor {
    ledger_id: LedgerId,
    last_sequence_number: u64,
}

impl ProjectionCursor {
    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence_number
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("envelope from ledger {found}, projection follows {expected}")]
    LedgerMismatch { expected: LedgerId, found: LedgerId },

    #[error("sequence number {found} is not after {last}")]
    NonMonotonicSequence { last: u64, found: u64 },

    #[error("sequence gap: expected {expected}, found {found}")]
    Gap { expected: u64, found: u64 },
}

/// Runs envelopes through a projection and tracks progress.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    cursor: Option<ProjectionCursor>,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            cursor: None,
        }
    }

    /// Create a runner pinned to a specific ledger.
    pub fn new_for_ledger(ledger_id: LedgerId, projection: P) -> Self {
        Self {
            projection,
            cursor: Some(ProjectionCursor {
                ledger_id,
                last_sequence_number: 0,
            }),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn into_projection(self) -> P {
        self.projection
    }

    /// Current cursor for this projection (if any envelopes were applied or it was pinned).
    pub fn cursor(&self) -> Option<ProjectionCursor> {
        self.cursor
    }

    /// Apply a single envelope, enforcing ledger consistency and monotonic sequencing.
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Ev>) -> Result<(), ProjectionError> {
        let found_ledger = envelope.ledger_id();
        let found_seq = envelope.sequence_number();

        match self.cursor {
            None => {
                self.projection.apply(envelope);
                self.cursor = Some(ProjectionCursor {
                    ledger_id: found_ledger,
                    last_sequence_number: found_seq,
                });
                Ok(())
            }
            Some(mut c) => {
                if c.ledger_id != found_ledger {
                    return Err(ProjectionError::LedgerMismatch {
                        expected: c.ledger_id,
                        found: found_ledger,
                    });
                }
                if found_seq <= c.last_sequence_number {
                    return Err(ProjectionError::NonMonotonicSequence {
                        last: c.last_sequence_number,
                        found: found_seq,
                    });
                }
                let expected = c.last_sequence_number.saturating_add(1);
                if found_seq != expected {
                    return Err(ProjectionError::Gap {
                        expected,
                        found: found_seq,
                    });
                }

                self.projection.apply(envelope);
                c.last_sequence_number = found_seq;
                self.cursor = Some(c);
                Ok(())
            }
        }
    }

    /// Like `apply`, but silently skips envelopes at or below the cursor.
    ///
    /// Use this for live bus subscriptions, where redelivery is expected.
    pub fn apply_idempotent(
        &mut self,
        envelope: &EventEnvelope<P::Ev>,
    ) -> Result<bool, ProjectionError> {
        if let Some(c) = self.cursor {
            if c.ledger_id == envelope.ledger_id()
                && envelope.sequence_number() <= c.last_sequence_number
            {
                return Ok(false);
            }
        }
        self.apply(envelope).map(|()| true)
    }

    /// Apply many envelopes in order.
    pub fn run<'a>(
        &mut self,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(), ProjectionError>
    where
        P::Ev: 'a,
    {
        for env in envelopes {
            self.apply(env)?;
        }
        Ok(())
    }

    /// Rebuild a projection from scratch by replaying the full event history.
    pub fn rebuild_from_scratch<'a>(
        factory: impl FnOnce() -> P,
        envelopes: impl IntoIterator<Item = &'a EventEnvelope<P::Ev>>,
    ) -> Result<(P, Option<ProjectionCursor>), ProjectionError>
    where
        P::Ev: 'a,
    {
        let mut runner = ProjectionRunner::new(factory());
        runner.run(envelopes)?;
        Ok((runner.projection, runner.cursor))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::Event;

    #[derive(Debug, Clone)]
    struct Tick;

    impl Event for Tick {
        fn event_type(&self) -> &'static str {
            "test.tick"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            Utc.timestamp_opt(0, 0).unwrap()
        }
    }

    #[derive(Debug, Default)]
    struct Counter(u64);

    impl Projection for Counter {
        type Ev = Tick;

        fn apply(&mut self, _envelope: &EventEnvelope<Tick>) {
            self.0 += 1;
        }
    }

    fn env(ledger_id: LedgerId, seq: u64) -> EventEnvelope<Tick> {
        EventEnvelope::new(Uuid::now_v7(), ledger_id, "test.tick", seq, Tick.occurred_at(), Tick)
    }

    #[test]
    fn rejects_out_of_order_and_foreign_ledgers() {
        let ledger = LedgerId::new();
        let mut runner = ProjectionRunner::new_for_ledger(ledger, Counter::default());

        runner.apply(&env(ledger, 1)).unwrap();
        runner.apply(&env(ledger, 2)).unwrap();
        assert_eq!(
            runner.apply(&env(ledger, 2)),
            Err(ProjectionError::NonMonotonicSequence { last: 2, found: 2 })
        );
        assert!(matches!(
            runner.apply(&env(LedgerId::new(), 3)),
            Err(ProjectionError::LedgerMismatch { .. })
        ));
        assert_eq!(runner.projection().0, 2);
    }

    #[test]
    fn pinned_runner_refuses_gaps() {
        let ledger = LedgerId::new();
        let mut runner = ProjectionRunner::new_for_ledger(ledger, Counter::default());

        assert_eq!(
            runner.apply(&env(ledger, 2)),
            Err(ProjectionError::Gap { expected: 1, found: 2 })
        );
        runner.apply(&env(ledger, 1)).unwrap();
        assert_eq!(
            runner.apply_idempotent(&env(ledger, 3)),
            Err(ProjectionError::Gap { expected: 2, found: 3 })
        );
        assert_eq!(runner.projection().0, 1);
    }

    #[test]
    fn idempotent_apply_skips_redelivery() {
        let ledger = LedgerId::new();
        let mut runner = ProjectionRunner::new(Counter::default());

        assert!(runner.apply_idempotent(&env(ledger, 1)).unwrap());
        assert!(!runner.apply_idempotent(&env(ledger, 1)).unwrap());
        assert!(runner.apply_idempotent(&env(ledger, 2)).unwrap());
        assert_eq!(runner.cursor().unwrap().last_sequence_number(), 2);
        assert_eq!(runner.into_projection().0, 2);
    }
}
