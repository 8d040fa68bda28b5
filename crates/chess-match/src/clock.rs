//! Per-side countdown clocks.
//!
//! The clock never reads time itself: callers pass `now` from a
//! [`TimeSource`], read at the moment of use.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::game::Side;

/// Source of monotonic time.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Instant;
}

/// The real monotonic clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl TimeSource for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Time that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualTime {
    now: Arc<Mutex<Instant>>,
}

impl Default for ManualTime {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualTime {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl TimeSource for ManualTime {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Countdown state for both sides.
///
/// Remaining time is stored in milliseconds, clamped at zero. Without a
/// limit the clock is unlimited and never expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clock {
    remaining_ms: Option<[i64; 2]>,
    running: Option<Side>,
    last_tick: Option<Instant>,
}

impl Clock {
    pub fn new(limit: Option<Duration>) -> Self {
        let remaining_ms = limit.map(|l| {
            let ms = i64::try_from(l.as_millis()).unwrap_or(i64::MAX);
            [ms, ms]
        });
        Self {
            remaining_ms,
            running: None,
            last_tick: None,
        }
    }

    /// A limited clock with explicit remaining times, e.g. from a saved game.
    pub fn with_remaining(white_ms: i64, black_ms: i64) -> Self {
        Self {
            remaining_ms: Some([white_ms.max(0), black_ms.max(0)]),
            running: None,
            last_tick: None,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.remaining_ms.is_none()
    }

    pub fn running(&self) -> Option<Side> {
        self.running
    }

    /// Make `side` the running side from `now` on. Time already used by
    /// the previous side must be charged with [`Clock::tick`] first.
    pub fn start(&mut self, side: Side, now: Instant) {
        self.running = Some(side);
        self.last_tick = Some(now);
    }

    /// Stop both clocks without charging anyone.
    pub fn pause(&mut self) {
        self.running = None;
        self.last_tick = None;
    }

    /// Charge the running side for the time since the last tick.
    ///
    /// Calling it again with the same `now` charges nothing; a `now` earlier
    /// than the last tick is treated as no elapsed time. Only whole
    /// milliseconds are charged and the remainder carries over to the next
    /// tick.
    pub fn tick(&mut self, now: Instant) {
        let (Some(side), Some(last)) = (self.running, self.last_tick) else {
            return;
        };
        let elapsed = elapsed_ms(last, now);
        if elapsed == 0 {
            return;
        }
        if let Some(remaining) = self.remaining_ms.as_mut() {
            let slot = &mut remaining[side.index()];
            *slot = slot.saturating_sub(elapsed).max(0);
        }
        let charged = Duration::from_millis(u64::try_from(elapsed).unwrap_or(u64::MAX));
        self.last_tick = Some(last.checked_add(charged).unwrap_or(now));
    }

    pub fn is_expired(&self, side: Side) -> bool {
        match self.remaining_ms {
            Some(remaining) => remaining[side.index()] <= 0,
            None => false,
        }
    }

    /// Stored remaining time for `side`; `None` when unlimited.
    pub fn remaining_ms(&self, side: Side) -> Option<i64> {
        self.remaining_ms.map(|r| r[side.index()])
    }

    /// Remaining time for `side` as of `now`, including the running side's
    /// untracked time, without mutating the clock.
    pub fn remaining_at(&self, side: Side, now: Instant) -> Option<Duration> {
        let stored = self.remaining_ms(side)?;
        let pending = match (self.running, self.last_tick) {
            (Some(running), Some(last)) if running == side => elapsed_ms(last, now),
            _ => 0,
        };
        let ms = stored.saturating_sub(pending).max(0);
        Some(Duration::from_millis(ms as u64))
    }
}

fn elapsed_ms(from: Instant, to: Instant) -> i64 {
    let elapsed = to.saturating_duration_since(from).as_millis();
    i64::try_from(elapsed).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn limited(secs: u64) -> Clock {
        Clock::new(Some(Duration::from_secs(secs)))
    }

    #[test]
    fn test_tick_charges_running_side_only() {
        let t0 = Instant::now();
        let mut clock = limited(60);
        clock.start(Side::White, t0);

        clock.tick(t0 + Duration::from_millis(1500));

        assert_eq!(clock.remaining_ms(Side::White), Some(58_500));
        assert_eq!(clock.remaining_ms(Side::Black), Some(60_000));
    }

    #[test]
    fn test_tick_is_idempotent_for_same_now() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(2);
        let mut clock = limited(10);
        clock.start(Side::Black, t0);

        clock.tick(t1);
        clock.tick(t1);

        assert_eq!(clock.remaining_ms(Side::Black), Some(8_000));
    }

    #[test]
    fn test_sub_millisecond_ticks_accumulate() {
        let t0 = Instant::now();
        let mut clock = limited(60);
        clock.start(Side::White, t0);

        let mut now = t0;
        for _ in 0..1000 {
            now += Duration::from_micros(999);
            clock.tick(now);
        }

        assert_eq!(clock.remaining_ms(Side::White), Some(59_001));
    }

    #[test]
    fn test_frame_rate_ticks_charge_true_elapsed() {
        let t0 = Instant::now();
        let mut clock = limited(60);
        clock.start(Side::White, t0);

        let mut now = t0;
        for _ in 0..600 {
            now += Duration::from_micros(16_667);
            clock.tick(now);
        }

        assert_eq!(clock.remaining_ms(Side::White), Some(50_000));
        assert_eq!(
            clock.remaining_at(Side::White, now),
            Some(Duration::from_millis(50_000))
        );
    }

    #[test]
    fn test_expiry_clamps_at_zero() {
        let t0 = Instant::now();
        let mut clock = limited(1);
        clock.start(Side::White, t0);

        clock.tick(t0 + Duration::from_secs(5));

        assert!(clock.is_expired(Side::White));
        assert!(!clock.is_expired(Side::Black));
        assert_eq!(clock.remaining_ms(Side::White), Some(0));
    }

    #[test]
    fn test_unlimited_never_expires() {
        let t0 = Instant::now();
        let mut clock = Clock::new(None);
        clock.start(Side::White, t0);
        clock.tick(t0 + Duration::from_secs(100_000));

        assert!(clock.is_unlimited());
        assert!(!clock.is_expired(Side::White));
        assert_eq!(clock.remaining_at(Side::White, t0), None);
    }

    #[test]
    fn test_pause_stops_charging() {
        let t0 = Instant::now();
        let mut clock = limited(10);
        clock.start(Side::White, t0);
        clock.pause();

        clock.tick(t0 + Duration::from_secs(3));

        assert_eq!(clock.remaining_ms(Side::White), Some(10_000));
        assert_eq!(clock.running(), None);
    }

    #[test]
    fn test_remaining_at_includes_pending_time() {
        let t0 = Instant::now();
        let mut clock = limited(10);
        clock.start(Side::White, t0);

        let now = t0 + Duration::from_millis(2500);
        assert_eq!(
            clock.remaining_at(Side::White, now),
            Some(Duration::from_millis(7500))
        );
        assert_eq!(
            clock.remaining_at(Side::Black, now),
            Some(Duration::from_secs(10))
        );
        assert_eq!(clock.remaining_ms(Side::White), Some(10_000));
    }

    #[test]
    fn test_manual_time_clones_share_instant() {
        let time = ManualTime::new();
        let other = time.clone();
        let before = time.now();

        other.advance(Duration::from_millis(250));

        assert_eq!(time.now() - before, Duration::from_millis(250));
    }

    proptest! {
        #[test]
        fn prop_running_side_never_increases(steps in prop::collection::vec(0u64..5_000, 1..40)) {
            let t0 = Instant::now();
            let mut clock = limited(30);
            clock.start(Side::Black, t0);
            let mut now = t0;
            let mut previous = clock.remaining_ms(Side::Black);

            for step in steps {
                now += Duration::from_millis(step);
                clock.tick(now);
                let current = clock.remaining_ms(Side::Black);
                prop_assert!(current <= previous);
                prop_assert!(current >= Some(0));
                prop_assert_eq!(clock.remaining_ms(Side::White), Some(30_000));
                previous = current;
            }
        }

        #[test]
        fn prop_total_charge_matches_elapsed(steps in prop::collection::vec(0u64..1_000, 1..20)) {
            let t0 = Instant::now();
            let mut clock = limited(3_600);
            clock.start(Side::White, t0);
            let mut now = t0;

            for step in &steps {
                now += Duration::from_millis(*step);
                clock.tick(now);
            }

            let total: u64 = steps.iter().sum();
            prop_assert_eq!(clock.remaining_ms(Side::White), Some(3_600_000 - total as i64));
        }
    }
}
