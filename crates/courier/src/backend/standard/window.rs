// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, Instant};

use crate::backend::Outcome;

const SLOTS: u32 = 10;

const MIN_SAMPLING_DURATION: Duration = Duration::from_secs(1);

/// Success and failure counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Tally {
    pub successes: u32,
    pub failures: u32,
}

impl Tally {
    pub fn throughput(self) -> u32 {
        self.successes.saturating_add(self.failures)
    }

    #[expect(clippy::cast_possible_truncation, reason = "a rate in [0, 1] fits in f32")]
    pub fn failure_rate(self) -> f32 {
        match self.throughput() {
            0 => 0.0,
            throughput => (f64::from(self.failures) / f64::from(throughput)) as f32,
        }
    }

    fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Success => self.successes = self.successes.saturating_add(1),
            Outcome::Failure => self.failures = self.failures.saturating_add(1),
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            successes: self.successes.saturating_add(other.successes),
            failures: self.failures.saturating_add(other.failures),
        }
    }
}

/// Outcomes of the sampling period, counted in a fixed ring of equally wide time slots.
///
/// Time is cut into slots counted from `origin`. Slot `n` lives at index `n % SLOTS` and is
/// cleared when a later slot claims the same index, so the ring never grows. A tally only
/// sums the slots of the last `SLOTS` periods.
#[derive(Debug)]
pub(crate) struct OutcomeWindow {
    origin: Instant,
    slot_width: Duration,
    slots: [Slot; SLOTS as usize],
}

#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    epoch: u64,
    tally: Tally,
}

impl OutcomeWindow {
    pub fn new(sampling_duration: Duration, origin: Instant) -> Self {
        let sampling_duration = sampling_duration.max(MIN_SAMPLING_DURATION);

        Self {
            origin,
            slot_width: sampling_duration / SLOTS,
            slots: [Slot::default(); SLOTS as usize],
        }
    }

    pub fn record(&mut self, outcome: Outcome, now: Instant) {
        let epoch = self.epoch(now);
        let slot = &mut self.slots[slot_index(epoch)];

        if slot.epoch != epoch {
            *slot = Slot {
                epoch,
                tally: Tally::default(),
            };
        }

        slot.tally.add(outcome);
    }

    pub fn tally(&self, now: Instant) -> Tally {
        let current = self.epoch(now);

        self.slots
            .iter()
            .filter(|slot| current.saturating_sub(slot.epoch) < u64::from(SLOTS))
            .fold(Tally::default(), |total, slot| total.merge(slot.tally))
    }

    fn epoch(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.origin);
        u64::try_from(elapsed.as_nanos() / self.slot_width.as_nanos()).unwrap_or(u64::MAX)
    }
}

#[expect(clippy::cast_possible_truncation, reason = "the remainder is below SLOTS")]
fn slot_index(epoch: u64) -> usize {
    (epoch % u64::from(SLOTS)) as usize
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_sampling_duration_is_clamped() {
        let window = OutcomeWindow::new(Duration::from_millis(200), Instant::now());

        assert_eq!(window.slot_width, Duration::from_millis(100));
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "Test")]
    fn failure_rate_of_nothing_is_zero() {
        assert_eq!(Tally::default().failure_rate(), 0.0);
        assert_eq!(
            Tally {
                successes: 3,
                failures: 1
            }
            .failure_rate(),
            0.25
        );
    }

    #[test]
    fn records_in_one_slot_share_it() {
        let origin = Instant::now();
        let mut window = OutcomeWindow::new(Duration::from_secs(10), origin);

        window.record(Outcome::Success, origin);
        window.record(Outcome::Failure, origin + Duration::from_millis(500));
        window.record(Outcome::Failure, origin + Duration::from_secs(2));

        assert_eq!(window.slots.iter().filter(|slot| slot.tally.throughput() > 0).count(), 2);
        assert_eq!(
            window.tally(origin + Duration::from_secs(2)),
            Tally {
                successes: 1,
                failures: 2
            }
        );
    }

    #[test]
    fn slots_older_than_the_sampling_period_are_not_counted() {
        let origin = Instant::now();
        let mut window = OutcomeWindow::new(Duration::from_secs(10), origin);

        window.record(Outcome::Failure, origin);
        window.record(Outcome::Failure, origin + Duration::from_secs(5));

        assert_eq!(window.tally(origin + Duration::from_secs(9)).failures, 2);
        assert_eq!(window.tally(origin + Duration::from_secs(10)).failures, 1);
        assert_eq!(window.tally(origin + Duration::from_secs(16)).throughput(), 0);
    }

    #[test]
    fn reused_slot_drops_its_old_counts() {
        let origin = Instant::now();
        let mut window = OutcomeWindow::new(Duration::from_secs(10), origin);

        window.record(Outcome::Failure, origin);
        window.record(Outcome::Success, origin + Duration::from_secs(10));

        assert_eq!(window.slots[0].epoch, 10);
        assert_eq!(
            window.tally(origin + Duration::from_secs(10)),
            Tally {
                successes: 1,
                failures: 0
            }
        );
    }
}
