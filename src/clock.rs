//! Ticker: a fixed-period interval timer driven by host time.
//!
//! The host (a browser animation frame, a worklet message, a test) calls
//! [`Ticker::poll`] with its current time in milliseconds; the ticker
//! reports how many periods have elapsed since the last poll.

/// Ticks dropped past this many behind; a stalled host resumes on the beat
/// instead of firing a burst of catch-up steps.
pub const MAX_CATCH_UP_TICKS: u32 = 8;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Ticker {
    period_ms: f64,
    next_deadline_ms: Option<f64>,
}

impl Ticker {
    pub fn new() -> Self {
        Ticker::default()
    }

    /// Arm the ticker; the first tick is due one period after `now_ms`.
    pub fn start(&mut self, now_ms: f64, period_ms: f64) {
        self.period_ms = period_ms;
        self.next_deadline_ms = Some(now_ms + period_ms);
    }

    pub fn stop(&mut self) {
        self.next_deadline_ms = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_deadline_ms.is_some()
    }

    /// Period fixed at the last `start`.
    pub fn period_ms(&self) -> f64 {
        self.period_ms
    }

    /// Number of ticks due at `now_ms`.
    pub fn poll(&mut self, now_ms: f64) -> u32 {
        let Some(mut deadline) = self.next_deadline_ms else {
            return 0;
        };

        let mut due = 0;
        while deadline <= now_ms {
            due += 1;
            deadline += self.period_ms;
            if due == MAX_CATCH_UP_TICKS && deadline <= now_ms {
                let skipped = ((now_ms - deadline) / self.period_ms).floor() as u64 + 1;
                tracing::warn!(skipped, "scheduler overrun, dropping ticks");
                deadline = now_ms + self.period_ms;
                break;
            }
        }

        self.next_deadline_ms = Some(deadline);
        due
    }
}
