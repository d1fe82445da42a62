//! Parameter automation: a value that is set at a time and then ramps
//! linearly toward a target, the way a WebAudio `AudioParam` behaves for
//! `setValueAtTime` followed by `linearRampToValueAtTime`.

/// One scheduled change on a [`ParamTimeline`].
#[derive(Debug, Clone, Copy, PartialEq)]
enum ParamEvent {
    SetValue { time: f64, value: f64 },
    LinearRamp { time: f64, value: f64 },
}

impl ParamEvent {
    fn time(&self) -> f64 {
        match *self {
            ParamEvent::SetValue { time, .. } | ParamEvent::LinearRamp { time, .. } => time,
        }
    }

    fn value(&self) -> f64 {
        match *self {
            ParamEvent::SetValue { value, .. } | ParamEvent::LinearRamp { value, .. } => value,
        }
    }
}

/// A time-ordered list of value changes, evaluated at absolute context time
/// in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTimeline {
    default_value: f64,
    events: Vec<ParamEvent>,
}

impl ParamTimeline {
    pub fn new(default_value: f64) -> Self {
        ParamTimeline {
            default_value,
            events: Vec::new(),
        }
    }

    /// Jump to `value` at `time`.
    pub fn set_value_at_time(&mut self, value: f64, time: f64) -> &mut Self {
        self.insert(ParamEvent::SetValue { time, value });
        self
    }

    /// Ramp linearly from the previous event's value to `value`, arriving at `time`.
    pub fn linear_ramp_to_value_at_time(&mut self, value: f64, time: f64) -> &mut Self {
        self.insert(ParamEvent::LinearRamp { time, value });
        self
    }

    fn insert(&mut self, event: ParamEvent) {
        let idx = self
            .events
            .iter()
            .position(|e| e.time() > event.time())
            .unwrap_or(self.events.len());
        self.events.insert(idx, event);
    }

    /// Does the value change over time at all?
    pub fn is_constant(&self) -> bool {
        !self
            .events
            .iter()
            .any(|e| matches!(e, ParamEvent::LinearRamp { .. }))
    }

    /// Evaluate the parameter at `time`.
    pub fn value_at(&self, time: f64) -> f64 {
        let mut current = self.default_value;
        let mut current_time = f64::NEG_INFINITY;

        for event in &self.events {
            if event.time() <= time {
                current = event.value();
                current_time = event.time();
                continue;
            }
            // First event still in the future: interpolate if it is a ramp.
            if let ParamEvent::LinearRamp { time: end, value } = *event {
                if current_time.is_finite() && end > current_time {
                    let t = (time - current_time) / (end - current_time);
                    return current + (value - current) * t;
                }
            }
            return current;
        }

        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_before_any_event() {
        let mut p = ParamTimeline::new(350.0);
        p.set_value_at_time(2000.0, 1.0);
        assert_eq!(p.value_at(0.5), 350.0);
        assert_eq!(p.value_at(1.0), 2000.0);
    }

    #[test]
    fn linear_ramp_interpolates() {
        let mut p = ParamTimeline::new(0.0);
        p.set_value_at_time(2000.0, 3.0)
            .linear_ramp_to_value_at_time(200.0, 3.5);

        assert_eq!(p.value_at(3.0), 2000.0);
        assert!((p.value_at(3.25) - 1100.0).abs() < 1e-9);
        assert_eq!(p.value_at(3.5), 200.0);
        assert_eq!(p.value_at(10.0), 200.0, "holds the ramp target afterwards");
        assert!(!p.is_constant());
    }

    #[test]
    fn events_sorted_by_time() {
        let mut p = ParamTimeline::new(1.0);
        p.set_value_at_time(5.0, 2.0);
        p.set_value_at_time(3.0, 1.0);
        assert_eq!(p.value_at(1.5), 3.0);
        assert_eq!(p.value_at(2.5), 5.0);
        assert!(p.is_constant());
    }
}
