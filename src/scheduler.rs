//! The timer & event scheduler: derives the next periodic and
//! triggered-update deadlines and tells the router core how long it may
//! safely block waiting for socket readiness.
//!
//! There are no independent timer threads here — every deadline is a plain
//! [`Instant`] recomputed against the monotonic clock at each loop head,
//! since a single cooperative loop replaces any notion of parallel
//! background timers.

use std::time::{Duration, Instant};

use rand::Rng;

use crate::config::TimerConfig;

/// Mutable scheduling state: when the next periodic broadcast is due, and
/// whether/when a triggered broadcast may go out.
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    periodic_deadline: Instant,
    trigger_earliest: Instant,
    triggered_pending: bool,
}

impl Scheduler {
    /// Start a fresh scheduler: the first periodic broadcast is jittered
    /// from `now`, and a triggered update may fire immediately once owed.
    pub fn new(now: Instant, timers: &TimerConfig, rng: &mut impl Rng) -> Scheduler {
        Scheduler {
            periodic_deadline: now + jittered_period(timers, rng),
            trigger_earliest: now,
            triggered_pending: false,
        }
    }

    /// Record that the table changed and a triggered update is owed. Safe to
    /// call repeatedly; multiple changes coalesce into one pending flag.
    pub fn mark_triggered(&mut self) {
        self.triggered_pending = true;
    }

    pub fn triggered_pending(&self) -> bool {
        self.triggered_pending
    }

    pub fn should_fire_periodic(&self, now: Instant) -> bool {
        now >= self.periodic_deadline
    }

    pub fn should_fire_triggered(&self, now: Instant) -> bool {
        self.triggered_pending && now >= self.trigger_earliest
    }

    /// Push the periodic deadline out by one jittered period, called right
    /// after a periodic broadcast fires.
    pub fn reschedule_periodic(&mut self, now: Instant, timers: &TimerConfig, rng: &mut impl Rng) {
        self.periodic_deadline = now + jittered_period(timers, rng);
    }

    /// Clear the pending flag and open a new rate-limit window, called right
    /// after a triggered broadcast fires.
    pub fn reschedule_trigger(&mut self, now: Instant, timers: &TimerConfig, rng: &mut impl Rng) {
        self.triggered_pending = false;
        self.trigger_earliest = now + trigger_window(timers, rng);
    }

    /// The longest the router core may block waiting for socket readiness
    /// before it must re-check the timers: the minimum of the time left
    /// until the periodic deadline, and (only if a triggered update is
    /// owed) the time left until the trigger may fire. Never negative.
    pub fn wait_duration(&self, now: Instant) -> Duration {
        let mut wait = self.periodic_deadline.saturating_duration_since(now);
        if self.triggered_pending {
            wait = wait.min(self.trigger_earliest.saturating_duration_since(now));
        }
        wait
    }
}

fn jittered_period(timers: &TimerConfig, rng: &mut impl Rng) -> Duration {
    let jitter = if timers.periodic_jitter > 0.0 {
        rng.gen_range(-timers.periodic_jitter..=timers.periodic_jitter)
    } else {
        0.0
    };
    secs(timers.periodic_base + jitter)
}

fn trigger_window(timers: &TimerConfig, rng: &mut impl Rng) -> Duration {
    secs(rng.gen_range(timers.trigger_min..=timers.trigger_max))
}

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn timers() -> TimerConfig {
        TimerConfig {
            periodic_base: 10.0,
            periodic_jitter: 2.0,
            route_timeout: 20.0,
            garbage_timeout: 40.0,
            trigger_min: 1.0,
            trigger_max: 5.0,
        }
    }

    #[test]
    fn periodic_deadline_is_within_jitter_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let now = Instant::now();
        let s = Scheduler::new(now, &timers(), &mut rng);
        let delta = s.periodic_deadline.duration_since(now).as_secs_f64();
        assert!((8.0..=12.0).contains(&delta), "delta={delta}");
    }

    #[test]
    fn wait_duration_ignores_trigger_when_nothing_pending() {
        let mut rng = StdRng::seed_from_u64(2);
        let now = Instant::now();
        let mut s = Scheduler::new(now, &timers(), &mut rng);
        // force a near trigger_earliest that would otherwise dominate
        s.trigger_earliest = now;
        let wait = s.wait_duration(now);
        assert!(wait.as_secs_f64() > 1.0);
    }

    #[test]
    fn wait_duration_considers_trigger_once_pending() {
        let mut rng = StdRng::seed_from_u64(3);
        let now = Instant::now();
        let mut s = Scheduler::new(now, &timers(), &mut rng);
        s.mark_triggered();
        s.trigger_earliest = now + Duration::from_millis(500);
        let wait = s.wait_duration(now);
        assert!(wait <= Duration::from_millis(500));
    }

    #[test]
    fn trigger_rate_limit_window_is_within_bounds() {
        let mut rng = StdRng::seed_from_u64(4);
        let now = Instant::now();
        let mut s = Scheduler::new(now, &timers(), &mut rng);
        s.mark_triggered();
        s.reschedule_trigger(now, &timers(), &mut rng);
        assert!(!s.triggered_pending());
        let delta = s.trigger_earliest.duration_since(now).as_secs_f64();
        assert!((1.0..=5.0).contains(&delta), "delta={delta}");
    }

    #[test]
    fn wait_duration_never_negative() {
        let mut rng = StdRng::seed_from_u64(5);
        let now = Instant::now();
        let mut s = Scheduler::new(now, &timers(), &mut rng);
        s.periodic_deadline = now - Duration::from_secs(1);
        s.mark_triggered();
        s.trigger_earliest = now - Duration::from_secs(1);
        assert_eq!(s.wait_duration(now), Duration::ZERO);
    }
}
