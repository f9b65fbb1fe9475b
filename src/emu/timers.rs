pub const TIMER_HZ: f64 = 60.0;
/// Length of one timer tick in milliseconds.
pub const TIMER_PERIOD_MS: f64 = 1000.0 / TIMER_HZ;

/// Delay and sound timers, decremented at 60Hz of host-supplied elapsed time.
#[derive(Debug, Clone)]
pub struct Timers {
    pub delay: u8,
    pub sound: u8,
    countdown_ms: f64,
}

impl Timers {
    /// Feeds elapsed wall-clock time; decrements both timers once per elapsed tick.
    ///
    /// NaN and negative values count as no time. An infinite value drains both timers.
    pub fn advance(&mut self, elapsed_ms: f64) {
        if elapsed_ms == f64::INFINITY {
            self.tick(u8::MAX);
            self.countdown_ms = TIMER_PERIOD_MS;
            return;
        }
        if elapsed_ms.is_nan() || elapsed_ms <= 0.0 {
            return;
        }

        self.countdown_ms -= elapsed_ms;
        if self.countdown_ms > 0.0 {
            return;
        }

        let overdue_ms = -self.countdown_ms;
        let ticks = (overdue_ms / TIMER_PERIOD_MS).floor() + 1.0;
        self.countdown_ms = TIMER_PERIOD_MS - overdue_ms.rem_euclid(TIMER_PERIOD_MS);
        self.tick(ticks.min(f64::from(u8::MAX)) as u8);
    }

    /// Decrements both timers by `ticks`, stopping at zero.
    fn tick(&mut self, ticks: u8) {
        self.delay = self.delay.saturating_sub(ticks);
        self.sound = self.sound.saturating_sub(ticks);
    }

    pub fn is_tone_active(&self) -> bool {
        self.sound > 0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl Default for Timers {
    fn default() -> Self {
        Self {
            delay: 0,
            sound: 0,
            countdown_ms: TIMER_PERIOD_MS,
        }
    }
}
