// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tick::Clock;

use super::probe::SingleProbe;
use super::window::{OutcomeWindow, Tally};
use crate::BreakerPolicy;
use crate::backend::{Admission, BreakerStats, CircuitBreaker, CircuitState, ERR_POISONED_LOCK, ExecutionMode, Outcome};

/// A circuit breaker driven by the failure rate over a sliding time window.
///
/// The circuit starts closed. When the recent failure rate and throughput cross the
/// policy thresholds it opens and rejects calls for the break duration. The first call
/// after that runs as a probe: its success closes the circuit, its failure opens it again.
/// Outcomes of calls admitted before the circuit opened never decide a half-open circuit.
///
/// Operators can force the circuit open or disable the breaker. Both hold until
/// [`reset`](CircuitBreaker::reset).
#[derive(Debug)]
pub struct StandardCircuitBreaker {
    tag: String,
    state: Mutex<State>,
    options: Options,
    clock: Clock,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
}

#[derive(Debug, Clone)]
struct Options {
    failure_threshold: f32,
    min_throughput: u32,
    sampling_duration: Duration,
    break_duration: Duration,
}

impl Options {
    fn window(&self, now: Instant) -> OutcomeWindow {
        OutcomeWindow::new(self.sampling_duration, now)
    }

    fn trips(&self, tally: Tally) -> bool {
        tally.throughput() >= self.min_throughput && tally.failure_rate() >= self.failure_threshold
    }
}

#[derive(Debug)]
enum State {
    Closed { window: OutcomeWindow },
    Open { open_until: Instant },
    HalfOpen { probe: SingleProbe },
    ForcedOpen,
    Disabled,
}

enum Transition {
    None,
    Opened(Tally),
    Reopened,
    Closed,
}

impl StandardCircuitBreaker {
    /// Creates a closed breaker for `tag`.
    pub fn new(tag: impl Into<String>, policy: &BreakerPolicy, clock: Clock) -> Self {
        let options = Options {
            failure_threshold: policy.failure_threshold,
            min_throughput: policy.min_throughput,
            sampling_duration: policy.sampling(),
            break_duration: policy.break_for(),
        };

        Self {
            tag: tag.into(),
            state: Mutex::new(State::Closed {
                window: options.window(clock.instant()),
            }),
            options,
            clock,
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    fn replace_state(&self, state: State) {
        let circuit_state = state.circuit_state();
        *self.state.lock().expect(ERR_POISONED_LOCK) = state;

        tracing::event!(
            name: "courier.circuit_breaker.overridden",
            tracing::Level::WARN,
            message = "circuit breaker state overridden",
            circuit_breaker.tag = self.tag.as_str(),
            circuit_breaker.state = circuit_state.as_str(),
        );
    }
}

impl CircuitBreaker for StandardCircuitBreaker {
    fn tag(&self) -> &str {
        &self.tag
    }

    fn enter(&self) -> Admission {
        let now = self.clock.instant();

        let (admission, circuit_state) = {
            let mut state = self.state.lock().expect(ERR_POISONED_LOCK);
            let admission = state.enter(now, &self.options);
            (admission, state.circuit_state())
        };

        if admission == Admission::Rejected {
            self.rejections.fetch_add(1, Ordering::Relaxed);
            tracing::event!(
                name: "courier.circuit_breaker.rejected",
                tracing::Level::WARN,
                message = "circuit breaker rejected call",
                circuit_breaker.tag = self.tag.as_str(),
                circuit_breaker.state = circuit_state.as_str(),
            );
        }

        admission
    }

    fn exit(&self, outcome: Outcome, mode: ExecutionMode) {
        let now = self.clock.instant();

        let transition = {
            let mut state = self.state.lock().expect(ERR_POISONED_LOCK);
            if matches!(*state, State::Disabled) {
                return;
            }
            state.exit(outcome, mode, now, &self.options)
        };

        match outcome {
            Outcome::Success => self.successes.fetch_add(1, Ordering::Relaxed),
            Outcome::Failure => self.failures.fetch_add(1, Ordering::Relaxed),
        };

        if mode == ExecutionMode::Probe {
            tracing::event!(
                name: "courier.circuit_breaker.probe",
                tracing::Level::INFO,
                message = "circuit breaker probe finished",
                circuit_breaker.tag = self.tag.as_str(),
                circuit_breaker.probe.result = outcome.as_str(),
            );
        }

        match transition {
            Transition::None => {}
            Transition::Opened(tally) => {
                tracing::event!(
                    name: "courier.circuit_breaker.opened",
                    tracing::Level::WARN,
                    message = "circuit breaker opened",
                    circuit_breaker.tag = self.tag.as_str(),
                    circuit_breaker.state = CircuitState::Open.as_str(),
                    circuit_breaker.failure_rate = tally.failure_rate(),
                    circuit_breaker.throughput = tally.throughput(),
                    circuit_breaker.break_duration_ms = u64::try_from(self.options.break_duration.as_millis()).unwrap_or(u64::MAX),
                );
            }
            Transition::Reopened => {
                tracing::event!(
                    name: "courier.circuit_breaker.reopened",
                    tracing::Level::WARN,
                    message = "circuit breaker reopened",
                    circuit_breaker.tag = self.tag.as_str(),
                    circuit_breaker.state = CircuitState::Open.as_str(),
                );
            }
            Transition::Closed => {
                tracing::event!(
                    name: "courier.circuit_breaker.closed",
                    tracing::Level::INFO,
                    message = "circuit breaker closed",
                    circuit_breaker.tag = self.tag.as_str(),
                    circuit_breaker.state = CircuitState::Closed.as_str(),
                );
            }
        }
    }

    fn stats(&self) -> BreakerStats {
        BreakerStats {
            state: self.state.lock().expect(ERR_POISONED_LOCK).circuit_state(),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }

    fn force_open(&self) {
        self.replace_state(State::ForcedOpen);
    }

    fn disable(&self) {
        self.replace_state(State::Disabled);
    }

    fn reset(&self) {
        self.replace_state(State::Closed {
            window: self.options.window(self.clock.instant()),
        });
        self.successes.store(0, Ordering::Relaxed);
        self.failures.store(0, Ordering::Relaxed);
        self.rejections.store(0, Ordering::Relaxed);
    }
}

impl State {
    fn circuit_state(&self) -> CircuitState {
        match self {
            Self::Closed { .. } => CircuitState::Closed,
            Self::Open { .. } => CircuitState::Open,
            Self::HalfOpen { .. } => CircuitState::HalfOpen,
            Self::ForcedOpen => CircuitState::ForcedOpen,
            Self::Disabled => CircuitState::Disabled,
        }
    }

    fn enter(&mut self, now: Instant, options: &Options) -> Admission {
        match self {
            Self::Closed { .. } | Self::Disabled => Admission::Accepted(ExecutionMode::Normal),
            Self::Open { open_until } if now >= *open_until => {
                let mut probe = SingleProbe::new(options.break_duration);
                let allowed = probe.allow(now);
                *self = Self::HalfOpen { probe };
                admit_probe(allowed)
            }
            Self::Open { .. } | Self::ForcedOpen => Admission::Rejected,
            Self::HalfOpen { probe } => admit_probe(probe.allow(now)),
        }
    }

    fn exit(&mut self, outcome: Outcome, mode: ExecutionMode, now: Instant, options: &Options) -> Transition {
        match self {
            Self::Closed { window } => {
                window.record(outcome, now);
                let tally = window.tally(now);

                if options.trips(tally) {
                    *self = Self::Open {
                        open_until: now + options.break_duration,
                    };
                    Transition::Opened(tally)
                } else {
                    Transition::None
                }
            }
            // The state changed between enter and exit of a concurrent call.
            Self::Open { .. } | Self::ForcedOpen | Self::Disabled => Transition::None,
            // Only the probe decides; a call admitted while closed may finish late.
            Self::HalfOpen { .. } if mode == ExecutionMode::Normal => Transition::None,
            Self::HalfOpen { .. } => match outcome {
                Outcome::Success => {
                    *self = Self::Closed {
                        window: options.window(now),
                    };
                    Transition::Closed
                }
                Outcome::Failure => {
                    *self = Self::Open {
                        open_until: now + options.break_duration,
                    };
                    Transition::Reopened
                }
            },
        }
    }
}

fn admit_probe(allowed: bool) -> Admission {
    if allowed {
        Admission::Accepted(ExecutionMode::Probe)
    } else {
        Admission::Rejected
    }
}
