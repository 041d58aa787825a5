use std::{
    thread,
    time::{Duration, Instant},
};

/// The millisecond time base cooperative drivers are scheduled against.
///
/// Drivers never sleep on their own; they record "not before T" and compare it to
/// [Clock::now_ms] on the next pass of the event loop. The only blocking call is
/// [Clock::wait_ms], used for short settle delays mandated by the hardware.
pub trait Clock {
    /// Milliseconds since an arbitrary epoch. Wraps after ~49 days.
    fn now_ms(&self) -> u32;

    /// Blocks for at least `ms` milliseconds.
    fn wait_ms(&self, ms: u32);
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }

    fn wait_ms(&self, ms: u32) {
        (**self).wait_ms(ms)
    }
}

/// Returns true once `now` has reached `when`, tolerating wrap of the 32-bit counter.
#[inline]
pub fn is_due(when: u32, now: u32) -> bool {
    now.wrapping_sub(when) as i32 >= 0
}

/// [Clock] backed by the host's monotonic clock.
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ms(&self) -> u32 {
        self.epoch.elapsed().as_millis() as u32
    }

    fn wait_ms(&self, ms: u32) {
        let start = Instant::now();
        let duration = Duration::from_millis(ms.into());
        while start.elapsed() < duration {
            // Sleeps are only as fine as the scheduler tick, settle delays want better than that.
            thread::yield_now();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn due_across_wrap() {
        assert!(is_due(10, 10));
        assert!(is_due(10, 11));
        assert!(!is_due(11, 10));
        assert!(is_due(u32::MAX - 1, 3));
        assert!(!is_due(3, u32::MAX - 1));
    }

    #[test]
    fn monotonic_wait() {
        let clock = MonotonicClock::new();
        let before = clock.now_ms();
        clock.wait_ms(2);
        assert!(clock.now_ms().wrapping_sub(before) >= 2);
    }
}
