use std::collections::VecDeque;
use std::fmt;
use std::ops::ControlFlow;
use std::time::Duration;

use parking_lot::Mutex;
use quanta::Clock;
use quanta::Instant;
use serde::Serialize;
use tracing::debug;
use tracing::trace;

use crate::Error;
use crate::LimiterConfig;
use crate::Overflow;
use crate::Reason;

/// The outcome of a [`Limiter::attempt`] that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// A slot was recorded; the caller may run its operation.
    Admitted,
    /// The window was full and the limiter uses [`Overflow::Drop`].
    Dropped { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Self::Admitted)
    }
}

/// A point-in-time summary of a [`Limiter`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Status {
    pub capacity: usize,
    pub used: usize,
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub overflow: Overflow,
    pub total_attempts: u64,
    pub dropped: u64,
    pub errored: u64,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} used per {} (overflow: {}); attempts: {}, dropped: {}, errored: {}",
            self.used,
            self.capacity,
            humantime::format_duration(self.window),
            self.overflow,
            self.total_attempts,
            self.dropped,
            self.errored,
        )
    }
}

/// Admission timestamps (nanos from the limiter's anchor) and lifetime counters.
#[derive(Debug, Default)]
struct Window {
    admissions: VecDeque<u64>,
    total_attempts: u64,
    dropped: u64,
    errored: u64,
}

impl Window {
    /// Drops every admission strictly older than `now - window_ns`.
    ///
    /// Admissions are ordered, so this is a prefix trim.
    fn evict(&mut self, now: u64, window_ns: u64) {
        let cutoff = now.saturating_sub(window_ns);
        while self.admissions.front().is_some_and(|&stamp| stamp < cutoff) {
            self.admissions.pop_front();
        }
    }
}

/// A sliding window log limiter.
///
/// Every admission is stored as a timestamp. At most `capacity` timestamps may
/// lie within the trailing `window`; the oldest is released once it is more
/// than `window` old. An admission exactly `window` old still counts.
#[derive(Debug)]
pub struct Limiter {
    capacity: usize,
    window: Duration,
    window_ns: u64,
    overflow: Overflow,
    state: Mutex<Window>,
    clock: Clock,
    anchor: Instant,
}

impl Limiter {
    /// Creates a new `Limiter` driven by the system clock.
    ///
    /// # Arguments
    ///
    /// * `capacity` - The maximum number of admissions within any window.
    /// * `window` - The length of the rolling window.
    /// * `overflow` - What to do with attempts that arrive while the window is full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if `capacity` is zero or
    /// `window` is zero.
    pub fn new(capacity: usize, window: Duration, overflow: Overflow) -> Result<Self, Error> {
        Self::with_clock(capacity, window, overflow, Clock::new())
    }

    /// Creates a new `Limiter` reading time from `clock`.
    ///
    /// Pass a `quanta::Clock::mock()` clock to control time explicitly.
    pub fn with_clock(
        capacity: usize,
        window: Duration,
        overflow: Overflow,
        clock: Clock,
    ) -> Result<Self, Error> {
        if capacity == 0 {
            return Err(Error::InvalidConfiguration(
                "capacity must be non-zero".to_string(),
            ));
        }
        if window.is_zero() {
            return Err(Error::InvalidConfiguration(
                "window must be non-zero".to_string(),
            ));
        }
        let window_ns = u64::try_from(window.as_nanos()).map_err(|_| {
            Error::InvalidConfiguration(format!("window of {window:?} is too large"))
        })?;
        let anchor = clock.now();
        Ok(Self {
            capacity,
            window,
            window_ns,
            overflow,
            state: Mutex::new(Window::default()),
            clock,
            anchor,
        })
    }

    pub fn from_config(config: &LimiterConfig) -> Result<Self, Error> {
        Self::new(config.capacity, config.window, config.overflow)
    }

    pub fn per_second(capacity: usize, overflow: Overflow) -> Result<Self, Error> {
        Self::new(capacity, Duration::from_secs(1), overflow)
    }

    pub fn per_minute(capacity: usize, overflow: Overflow) -> Result<Self, Error> {
        Self::new(capacity, Duration::from_secs(60), overflow)
    }

    pub fn per_hour(capacity: usize, overflow: Overflow) -> Result<Self, Error> {
        Self::new(capacity, Duration::from_secs(60 * 60), overflow)
    }

    /// Attempts to admit one operation, applying the overflow policy if the
    /// window is full.
    ///
    /// Every call is counted in [`total_attempts`](Self::total_attempts).
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateLimitExceeded`] if the window is full and the
    /// limiter uses [`Overflow::Error`].
    pub fn attempt(&self) -> Result<Admission, Error> {
        let mut state = self.state.lock();
        let now = self.now();
        state.total_attempts += 1;

        let ControlFlow::Break(Reason::Overloaded { retry_after }) = self.admit(&mut state, now)
        else {
            trace!(
                used = state.admissions.len(),
                capacity = self.capacity,
                "attempt admitted"
            );
            return Ok(Admission::Admitted);
        };

        match self.overflow {
            Overflow::Drop => {
                state.dropped += 1;
                drop(state);
                debug!(capacity = self.capacity, ?retry_after, "attempt dropped");
                Ok(Admission::Dropped { retry_after })
            }
            Overflow::Error => {
                state.errored += 1;
                drop(state);
                debug!(capacity = self.capacity, ?retry_after, "attempt rejected");
                Err(Error::RateLimitExceeded {
                    capacity: self.capacity,
                    window: self.window,
                    retry_after,
                })
            }
        }
    }

    /// Records an admission if the window has room, without applying the
    /// overflow policy or touching the lifetime counters.
    pub fn try_admit(&self) -> ControlFlow<Reason> {
        let mut state = self.state.lock();
        let now = self.now();
        self.admit(&mut state, now)
    }

    /// Reports whether the window is currently full.
    ///
    /// This does not reserve a slot; use [`attempt`](Self::attempt) to check
    /// and record in one step.
    pub fn is_at_capacity(&self) -> bool {
        self.used_capacity() >= self.capacity
    }

    /// The number of admissions inside the current window.
    pub fn used_capacity(&self) -> usize {
        let mut state = self.state.lock();
        let now = self.now();
        state.evict(now, self.window_ns);
        state.admissions.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn overflow(&self) -> Overflow {
        self.overflow
    }

    pub fn total_attempts(&self) -> u64 {
        self.state.lock().total_attempts
    }

    pub fn dropped_count(&self) -> u64 {
        self.state.lock().dropped
    }

    pub fn errored_count(&self) -> u64 {
        self.state.lock().errored
    }

    pub fn status(&self) -> Status {
        let mut state = self.state.lock();
        let now = self.now();
        state.evict(now, self.window_ns);
        Status {
            capacity: self.capacity,
            used: state.admissions.len(),
            window: self.window,
            overflow: self.overflow,
            total_attempts: state.total_attempts,
            dropped: state.dropped,
            errored: state.errored,
        }
    }

    fn now(&self) -> u64 {
        let elapsed = self.clock.now().duration_since(self.anchor).as_nanos();
        u64::try_from(elapsed).unwrap_or(u64::MAX)
    }

    fn admit(&self, state: &mut Window, now: u64) -> ControlFlow<Reason> {
        state.evict(now, self.window_ns);

        if state.admissions.len() >= self.capacity {
            return ControlFlow::Break(Reason::Overloaded {
                retry_after: self.retry_after(state, now),
            });
        }

        // Keep the log ordered even if the clock steps backwards.
        let stamp = state.admissions.back().map_or(now, |&last| last.max(now));
        state.admissions.push_back(stamp);
        ControlFlow::Continue(())
    }

    /// Time until the oldest admission falls out of the window.
    fn retry_after(&self, state: &Window, now: u64) -> Duration {
        let released = state.admissions.front().map_or(now, |&oldest| {
            oldest.saturating_add(self.window_ns).saturating_add(1)
        });
        Duration::from_nanos(released.saturating_sub(now))
    }
}

impl fmt::Display for Limiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.status(), f)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use more_asserts::assert_le;
    use quanta::Mock;

    use super::*;

    fn mocked(capacity: usize, window: Duration, overflow: Overflow) -> (Limiter, Arc<Mock>) {
        let (clock, mock) = Clock::mock();
        let limiter = Limiter::with_clock(capacity, window, overflow, clock).unwrap();
        (limiter, mock)
    }

    #[test]
    fn it_refills_after_the_window_passes() {
        let (rl, mock) = mocked(5, Duration::from_secs(60), Overflow::Drop);

        for _ in 0..5 {
            assert_eq!(rl.attempt().unwrap(), Admission::Admitted);
        }
        assert!(rl.is_at_capacity());

        mock.increment(Duration::from_secs(61));

        assert_eq!(rl.attempt().unwrap(), Admission::Admitted);
        assert_eq!(rl.used_capacity(), 1);
    }

    #[test]
    fn it_keeps_admissions_on_the_window_boundary() {
        let (rl, mock) = mocked(5, Duration::from_secs(60), Overflow::Drop);

        for _ in 0..5 {
            let _ = rl.attempt();
        }

        mock.increment(Duration::from_secs(60));
        assert_eq!(rl.used_capacity(), 5);
        assert!(!rl.attempt().unwrap().is_admitted());

        mock.increment(Duration::from_nanos(1));
        assert_eq!(rl.used_capacity(), 0);
        assert!(rl.attempt().unwrap().is_admitted());
    }

    #[test]
    fn it_counts_only_admissions_inside_the_window() {
        let (rl, mock) = mocked(10, Duration::from_secs(30), Overflow::Drop);

        // Admissions at t = 0s, 10s, 20s, 30s
        for _ in 0..4 {
            assert!(rl.attempt().unwrap().is_admitted());
            mock.increment(Duration::from_secs(10));
        }

        // t = 40s: the window is [10s, 40s]
        assert_eq!(rl.used_capacity(), 3);

        // t = 45s: the window is [15s, 45s]
        mock.increment(Duration::from_secs(5));
        assert_eq!(rl.used_capacity(), 2);

        // t = 61s: everything has expired
        mock.increment(Duration::from_secs(16));
        assert_eq!(rl.used_capacity(), 0);
    }

    #[test]
    fn it_preserves_sub_second_windows() {
        let (rl, mock) = mocked(1, Duration::from_millis(1500), Overflow::Drop);

        assert!(rl.attempt().unwrap().is_admitted());

        mock.increment(Duration::from_millis(1500));
        assert!(!rl.attempt().unwrap().is_admitted());

        mock.increment(Duration::from_nanos(1));
        assert!(rl.attempt().unwrap().is_admitted());
    }

    #[test]
    fn it_drops_overflow_and_counts_it() {
        let (rl, _mock) = mocked(5, Duration::from_secs(60), Overflow::Drop);

        let admitted = (0..8)
            .filter(|_| rl.attempt().unwrap().is_admitted())
            .count();

        assert_eq!(admitted, 5);
        assert_eq!(rl.total_attempts(), 8);
        assert_eq!(rl.dropped_count(), 3);
        assert_eq!(rl.errored_count(), 0);
    }

    #[test]
    fn it_errors_on_overflow() {
        let (rl, _mock) = mocked(3, Duration::from_secs(60), Overflow::Error);

        for _ in 0..3 {
            assert_eq!(rl.attempt().unwrap(), Admission::Admitted);
        }

        match rl.attempt() {
            Err(Error::RateLimitExceeded {
                capacity,
                window,
                retry_after,
            }) => {
                assert_eq!(capacity, 3);
                assert_eq!(window, Duration::from_secs(60));
                assert_eq!(retry_after, Duration::from_secs(60) + Duration::from_nanos(1));
            }
            other => panic!("expected a rate limit error, got {other:?}"),
        }

        assert_eq!(rl.total_attempts(), 4);
        assert_eq!(rl.errored_count(), 1);
        assert_eq!(rl.dropped_count(), 0);
    }

    #[test]
    fn it_hints_when_the_oldest_admission_leaves() {
        let (rl, mock) = mocked(2, Duration::from_secs(10), Overflow::Drop);

        assert!(rl.try_admit().is_continue());
        mock.increment(Duration::from_secs(4));
        assert!(rl.try_admit().is_continue());
        mock.increment(Duration::from_secs(1));

        assert_eq!(
            rl.try_admit(),
            ControlFlow::Break(Reason::Overloaded {
                retry_after: Duration::from_secs(5) + Duration::from_nanos(1)
            })
        );

        // try_admit bypasses the overflow policy and the counters
        assert_eq!(rl.total_attempts(), 0);
        assert_eq!(rl.dropped_count(), 0);
    }

    #[test]
    fn it_does_not_reserve_on_query() {
        let (rl, _mock) = mocked(1, Duration::from_secs(1), Overflow::Error);

        for _ in 0..10 {
            assert!(!rl.is_at_capacity());
            assert_eq!(rl.used_capacity(), 0);
        }
        assert!(rl.attempt().is_ok());
        assert!(rl.is_at_capacity());
    }

    #[test]
    fn it_keeps_timestamps_ordered_when_time_steps_back() {
        let (rl, mock) = mocked(3, Duration::from_secs(60), Overflow::Drop);

        mock.increment(Duration::from_secs(10));
        assert!(rl.attempt().unwrap().is_admitted());
        mock.decrement(Duration::from_secs(5));
        assert!(rl.attempt().unwrap().is_admitted());

        let state = rl.state.lock();
        let stamps: Vec<_> = state.admissions.iter().copied().collect();
        assert!(stamps.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn it_keeps_sliding_far_from_the_anchor() {
        let (rl, mock) = mocked(1, Duration::from_secs(60), Overflow::Drop);

        mock.increment(Duration::from_nanos(u64::MAX / 2));
        assert!(rl.attempt().unwrap().is_admitted());
        assert!(!rl.attempt().unwrap().is_admitted());

        mock.increment(Duration::from_secs(61));
        assert!(rl.attempt().unwrap().is_admitted());
        assert_eq!(rl.used_capacity(), 1);
    }

    #[test]
    fn it_never_exceeds_capacity_in_any_window() {
        let window = Duration::from_millis(100);
        let (rl, mock) = mocked(4, window, Overflow::Drop);

        // A bursty but deterministic arrival pattern
        let mut seed: u64 = 0x2545_f491;
        let mut elapsed = Duration::ZERO;
        let mut admitted = Vec::new();
        for _ in 0..2_000 {
            seed = seed
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            let step = Duration::from_millis((seed >> 33) % 40);
            mock.increment(step);
            elapsed += step;
            if rl.attempt().unwrap().is_admitted() {
                admitted.push(elapsed);
            }
        }

        for (i, &end) in admitted.iter().enumerate() {
            let start = end.saturating_sub(window);
            let in_window = admitted[..=i].iter().filter(|&&t| t >= start).count();
            assert_le!(in_window, 4);
        }
        assert_eq!(
            rl.total_attempts(),
            admitted.len() as u64 + rl.dropped_count()
        );
    }

    #[test]
    fn it_admits_exactly_capacity_under_concurrency() {
        let capacity = 100;
        let rl = Arc::new(Limiter::new(capacity, Duration::from_secs(60), Overflow::Drop).unwrap());

        let mut handles = vec![];
        for _ in 0..capacity + 20 {
            let rl_clone = Arc::clone(&rl);
            handles.push(thread::spawn(move || rl_clone.attempt()));
        }

        let success_count = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| matches!(r, Ok(Admission::Admitted)))
            .count();

        assert_eq!(success_count, capacity);
        assert_eq!(rl.dropped_count(), 20);
    }

    #[test]
    fn it_rejects_invalid_configuration() {
        assert!(matches!(
            Limiter::new(0, Duration::from_secs(1), Overflow::Drop),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            Limiter::new(1, Duration::ZERO, Overflow::Drop),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            "bogus"
                .parse::<Overflow>()
                .and_then(|overflow| Limiter::per_second(1, overflow)),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn it_summarises_status() {
        let (rl, _mock) = mocked(2, Duration::from_secs(60), Overflow::Drop);
        for _ in 0..3 {
            let _ = rl.attempt();
        }

        let status = rl.status();
        assert_eq!(status.used, 2);
        assert_eq!(status.dropped, 1);
        assert_eq!(
            rl.to_string(),
            "2/2 used per 1m (overflow: drop); attempts: 3, dropped: 1, errored: 0"
        );

        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["window"], "1m");
        assert_eq!(json["overflow"], "drop");
    }

    #[test]
    fn it_builds_from_unit_helpers() {
        assert_eq!(
            Limiter::per_second(1, Overflow::Drop).unwrap().window(),
            Duration::from_secs(1)
        );
        assert_eq!(
            Limiter::per_hour(1, Overflow::Error).unwrap().window(),
            Duration::from_secs(3600)
        );
    }
}
