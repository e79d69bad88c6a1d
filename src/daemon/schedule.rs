use std::time::{Duration, Instant};

use chrono::Utc;

/// Wall clock in epoch seconds, the unit every stored stamp uses.
pub fn now_epoch() -> i64 {
    Utc::now().timestamp()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Drop expired entries and redraw countdowns.
    Sweep,
    /// Silent inbox poll.
    Poll,
    /// Forget notification click targets older than an hour.
    Forget,
}

#[derive(Debug, Clone)]
struct Timer {
    tick: Tick,
    every: Duration,
    next: Instant,
}

/// Three independent interval timers driven from one loop.
#[derive(Debug, Clone)]
pub struct Schedule {
    timers: Vec<Timer>,
    running: bool,
}

impl Schedule {
    pub fn new(sweep_every: Duration, poll_every: Duration, forget_every: Duration) -> Self {
        let now = Instant::now();
        let timer = |tick, every: Duration| Timer {
            tick,
            every: every.max(Duration::from_millis(100)),
            next: now,
        };
        Self {
            timers: vec![
                timer(Tick::Sweep, sweep_every),
                timer(Tick::Poll, poll_every),
                timer(Tick::Forget, forget_every),
            ],
            running: false,
        }
    }

    /// One-second sweeps, hourly cleanup, polls every `poll_secs`.
    pub fn standard(poll_secs: u64) -> Self {
        Self::new(
            Duration::from_secs(1),
            Duration::from_secs(poll_secs.max(1)),
            Duration::from_secs(3600),
        )
    }

    /// Arms every timer so that each fires on the first `due` call.
    pub fn start(&mut self, now: Instant) {
        for t in &mut self.timers {
            t.next = now;
        }
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Ticks that are due at `now`, rescheduling each one. Missed periods
    /// collapse into a single tick.
    pub fn due(&mut self, now: Instant) -> Vec<Tick> {
        if !self.running {
            return Vec::new();
        }
        let mut out = Vec::new();
        for t in &mut self.timers {
            if now >= t.next {
                out.push(t.tick);
                t.next += t.every;
                if t.next <= now {
                    t.next = now + t.every;
                }
            }
        }
        out
    }

    /// Time until the nearest timer fires.
    pub fn until_next(&self, now: Instant) -> Duration {
        self.timers
            .iter()
            .map(|t| t.next.saturating_duration_since(now))
            .min()
            .unwrap_or(Duration::from_secs(1))
    }

    /// Makes the next `due` fire `tick` immediately.
    pub fn trigger(&mut self, tick: Tick, now: Instant) {
        if let Some(t) = self.timers.iter_mut().find(|t| t.tick == tick) {
            t.next = now;
        }
    }
}
