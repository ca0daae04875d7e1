//! Poll-count hysteresis

/// Polls elapsed since the last actuation.
///
/// One counter serves both directions: it advances on every poll and only
/// returns to zero when a core actually changes state, so a long quiet
/// stretch lets the next qualifying poll act immediately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HysteresisState {
    cycle_count: u32,
}

impl HysteresisState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance one poll
    pub fn tick(&mut self) -> u32 {
        self.cycle_count = self.cycle_count.saturating_add(1);
        self.cycle_count
    }

    /// Whether `required` polls have elapsed
    pub fn ready(&self, required: u32) -> bool {
        self.cycle_count >= required
    }

    /// Restart after an actuation
    pub fn reset(&mut self) {
        self.cycle_count = 0;
    }

    pub fn cycle_count(&self) -> u32 {
        self.cycle_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_and_reset() {
        let mut state = HysteresisState::new();
        assert!(!state.ready(1));

        state.tick();
        state.tick();
        assert!(state.ready(2));
        assert!(!state.ready(3));

        state.reset();
        assert_eq!(state.cycle_count(), 0);
    }

    #[test]
    fn test_saturates() {
        let mut state = HysteresisState { cycle_count: u32::MAX };
        assert_eq!(state.tick(), u32::MAX);
    }
}
