use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// What a single poll attempt observed.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome<T> {
    /// The job finished; carries the final report.
    Completed(T),
    /// The service answered with a non-terminal status.
    Pending(String),
    /// No usable answer (transport failure, error status, unreadable body).
    Miss(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollState<T> {
    Waiting { attempts: u32 },
    Completed { attempts: u32, report: T },
    TimedOut { attempts: u32 },
}

impl<T> PollState<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Waiting { .. })
    }
}

/// Bounded poll loop: every attempt, whatever its outcome, uses up one unit
/// of the budget. Only `Completed` ends the loop early.
#[derive(Debug)]
pub struct PollLoop {
    policy: PollPolicy,
    attempts: u32,
}

impl PollLoop {
    pub fn new(policy: PollPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn advance<T>(&mut self, outcome: AttemptOutcome<T>) -> PollState<T> {
        self.attempts += 1;
        match outcome {
            AttemptOutcome::Completed(report) => PollState::Completed {
                attempts: self.attempts,
                report,
            },
            AttemptOutcome::Pending(_) | AttemptOutcome::Miss(_)
                if self.attempts >= self.policy.max_attempts =>
            {
                PollState::TimedOut {
                    attempts: self.attempts,
                }
            }
            _ => PollState::Waiting {
                attempts: self.attempts,
            },
        }
    }

    /// Drives the loop to a terminal state, sleeping `policy.interval` before
    /// every attempt. `attempt` receives the 1-based attempt number.
    pub fn run<T, S, F>(mut self, mut sleep: S, mut attempt: F) -> PollState<T>
    where
        S: FnMut(Duration),
        F: FnMut(u32) -> AttemptOutcome<T>,
    {
        loop {
            if self.attempts >= self.policy.max_attempts {
                return PollState::TimedOut {
                    attempts: self.attempts,
                };
            }
            sleep(self.policy.interval);
            let outcome = attempt(self.attempts + 1);
            let state = self.advance(outcome);
            if state.is_terminal() {
                return state;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(5),
            max_attempts,
        }
    }

    #[test]
    fn default_policy_is_thirty_attempts_two_seconds_apart() {
        let policy = PollPolicy::default();
        assert_eq!(policy.max_attempts, 30);
        assert_eq!(policy.interval, Duration::from_secs(2));
    }

    #[test]
    fn completes_on_first_completed_outcome() {
        let mut sleeps = Vec::new();
        let state = PollLoop::new(policy(30)).run(
            |d| sleeps.push(d),
            |n| {
                if n == 3 {
                    AttemptOutcome::Completed("done")
                } else {
                    AttemptOutcome::Pending("queued".to_string())
                }
            },
        );
        assert_eq!(
            state,
            PollState::Completed {
                attempts: 3,
                report: "done"
            }
        );
        assert_eq!(sleeps, vec![Duration::from_millis(5); 3]);
    }

    #[test]
    fn misses_consume_attempts_without_aborting() {
        let state = PollLoop::new(policy(5)).run(
            |_| {},
            |n| match n {
                1 | 2 => AttemptOutcome::Miss("connection reset".to_string()),
                3 => AttemptOutcome::Pending("in-progress".to_string()),
                _ => AttemptOutcome::Completed(n),
            },
        );
        assert_eq!(
            state,
            PollState::Completed {
                attempts: 4,
                report: 4
            }
        );
    }

    #[test]
    fn exhausting_the_budget_times_out() {
        let mut calls = 0;
        let mut sleeps = 0;
        let state: PollState<()> = PollLoop::new(policy(30)).run(
            |_| sleeps += 1,
            |_| {
                calls += 1;
                AttemptOutcome::Pending("queued".to_string())
            },
        );
        assert_eq!(state, PollState::TimedOut { attempts: 30 });
        assert_eq!(calls, 30);
        assert_eq!(sleeps, 30);
    }

    #[test]
    fn completion_on_last_attempt_still_counts() {
        let state = PollLoop::new(policy(2)).run(
            |_| {},
            |n| {
                if n == 2 {
                    AttemptOutcome::Completed(())
                } else {
                    AttemptOutcome::Miss("timeout".to_string())
                }
            },
        );
        assert_eq!(
            state,
            PollState::Completed {
                attempts: 2,
                report: ()
            }
        );
    }

    #[test]
    fn zero_budget_never_polls() {
        let state: PollState<()> = PollLoop::new(policy(0)).run(
            |_| panic!("should not sleep"),
            |_| panic!("should not poll"),
        );
        assert_eq!(state, PollState::TimedOut { attempts: 0 });
    }

    #[test]
    fn advance_reports_waiting_until_budget_is_spent() {
        let mut poll = PollLoop::new(policy(2));
        let first: PollState<()> = poll.advance(AttemptOutcome::Pending("queued".into()));
        assert_eq!(first, PollState::Waiting { attempts: 1 });
        let second: PollState<()> = poll.advance(AttemptOutcome::Miss("503".into()));
        assert_eq!(second, PollState::TimedOut { attempts: 2 });
        assert_eq!(poll.attempts(), 2);
    }
}
