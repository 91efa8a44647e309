// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tick::Clock;

use crate::ResilienceOptions;
use crate::health::{HealthInfo, HealthMetrics, Outcome};

/// The state of a circuit breaker.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CircuitState {
    /// Calls flow through and outcomes are sampled.
    Closed,
    /// Calls are rejected without running.
    Open,
    /// A single probe call decides whether the circuit closes again.
    HalfOpen,
}

impl CircuitState {
    /// Stable name used in telemetry.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl Display for CircuitState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point-in-time view of a circuit breaker.
///
/// While the circuit is open or half-open, `throughput` and `failure_rate` describe the
/// window that opened it.
#[derive(Debug, Copy, Clone, PartialEq)]
#[non_exhaustive]
pub struct CircuitSnapshot {
    /// Current state.
    pub state: CircuitState,
    /// Calls counted in the sampling window.
    pub throughput: u32,
    /// Share of those calls that failed.
    pub failure_rate: f64,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Admission {
    /// `half_opened` carries how long the circuit was open when this call moved it to half-open.
    Accepted { probe: bool, half_opened: Option<Duration> },
    Rejected { retry_after: Duration },
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Transition {
    Unchanged,
    Opened(HealthInfo),
    Reopened,
    Closed { open_for: Duration },
}

/// The breaker state machine, shared by every call through one policy.
#[derive(Debug)]
pub(crate) struct Breaker {
    state: Mutex<State>,
    settings: Settings,
    clock: Clock,
}

#[derive(Debug, Clone)]
struct Settings {
    break_duration: Duration,
    sampling_duration: Duration,
    failure_threshold: f64,
    minimum_throughput: u32,
}

impl Settings {
    fn health(&self) -> HealthMetrics {
        HealthMetrics::new(self.sampling_duration, self.failure_threshold, self.minimum_throughput)
    }
}

#[derive(Debug)]
enum State {
    Closed { health: HealthMetrics },
    Open { open_until: Instant, trip: Trip },
    HalfOpen { probe_until: Option<Instant>, trip: Trip },
}

/// What opened the circuit, kept until it closes again.
#[derive(Debug, Clone, Copy)]
struct Trip {
    opened_at: Instant,
    health: HealthInfo,
}

impl Breaker {
    pub fn new(options: &ResilienceOptions, clock: Clock) -> Self {
        let settings = Settings {
            break_duration: options.break_duration,
            sampling_duration: options.effective_sampling_duration(),
            failure_threshold: options.failure_threshold,
            minimum_throughput: options.minimum_throughput,
        };

        Self {
            state: Mutex::new(State::Closed {
                health: settings.health(),
            }),
            settings,
            clock,
        }
    }

    pub fn enter(&self) -> Admission {
        let now = self.clock.instant();
        self.state.lock().enter(now, &self.settings)
    }

    /// Records the outcome of an admitted call. `None` means the call ended in a way the breaker
    /// does not count.
    pub fn exit(&self, outcome: Option<Outcome>, probe: bool) -> Transition {
        let now = self.clock.instant();
        self.state.lock().exit(outcome, probe, now, &self.settings)
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let now = self.clock.instant();
        let mut state = self.state.lock();

        match &mut *state {
            State::Closed { health } => {
                let info = health.health_info(now);
                CircuitSnapshot {
                    state: CircuitState::Closed,
                    throughput: info.throughput(),
                    failure_rate: info.failure_rate(),
                }
            }
            State::Open { open_until, trip } => CircuitSnapshot {
                state: if now >= *open_until {
                    CircuitState::HalfOpen
                } else {
                    CircuitState::Open
                },
                throughput: trip.health.throughput(),
                failure_rate: trip.health.failure_rate(),
            },
            State::HalfOpen { trip, .. } => CircuitSnapshot {
                state: CircuitState::HalfOpen,
                throughput: trip.health.throughput(),
                failure_rate: trip.health.failure_rate(),
            },
        }
    }
}

impl State {
    fn enter(&mut self, now: Instant, settings: &Settings) -> Admission {
        match self {
            Self::Closed { .. } => Admission::Accepted {
                probe: false,
                half_opened: None,
            },
            Self::Open { open_until, trip } => {
                if now < *open_until {
                    return Admission::Rejected {
                        retry_after: open_until.saturating_duration_since(now),
                    };
                }

                let trip = *trip;
                *self = Self::HalfOpen {
                    probe_until: Some(now + settings.break_duration),
                    trip,
                };
                Admission::Accepted {
                    probe: true,
                    half_opened: Some(now.saturating_duration_since(trip.opened_at)),
                }
            }
            Self::HalfOpen { probe_until, .. } => {
                // A probe is still running.
                if let Some(until) = *probe_until
                    && now < until
                {
                    return Admission::Rejected {
                        retry_after: until.saturating_duration_since(now),
                    };
                }

                // Either the slot is free or the previous probe was abandoned.
                *probe_until = Some(now + settings.break_duration);
                Admission::Accepted {
                    probe: true,
                    half_opened: None,
                }
            }
        }
    }

    fn exit(&mut self, outcome: Option<Outcome>, probe: bool, now: Instant, settings: &Settings) -> Transition {
        match self {
            Self::Closed { health } => {
                let Some(outcome) = outcome else {
                    return Transition::Unchanged;
                };

                health.record(outcome, now);
                let info = health.health_info(now);

                if info.is_unhealthy() {
                    *self = Self::Open {
                        open_until: now + settings.break_duration,
                        trip: Trip { opened_at: now, health: info },
                    };
                    Transition::Opened(info)
                } else {
                    Transition::Unchanged
                }
            }
            // Calls admitted before the circuit opened finish here; they no longer matter.
            Self::Open { .. } => Transition::Unchanged,
            Self::HalfOpen { probe_until, trip } => {
                if !probe {
                    return Transition::Unchanged;
                }

                match outcome {
                    Some(Outcome::Success) => {
                        let open_for = now.saturating_duration_since(trip.opened_at);
                        *self = Self::Closed {
                            health: settings.health(),
                        };
                        Transition::Closed { open_for }
                    }
                    Some(Outcome::Failure) => {
                        *self = Self::Open {
                            open_until: now + settings.break_duration,
                            trip: *trip,
                        };
                        Transition::Reopened
                    }
                    None => {
                        *probe_until = None;
                        Transition::Unchanged
                    }
                }
            }
        }
    }
}
