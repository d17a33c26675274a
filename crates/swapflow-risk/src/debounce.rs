//! Trailing debounce for the high price impact flag.
//!
//! A new raw value is surfaced only after it has held for the whole window,
//! so the flag does not flicker while quotes stream in.

#[derive(Debug, Clone)]
pub struct HighImpactDebouncer {
    window_ms: u64,
    surfaced: bool,
    /// Raw value waiting to be surfaced and when it was first seen.
    pending: Option<(bool, u64)>,
}

impl HighImpactDebouncer {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            surfaced: false,
            pending: None,
        }
    }

    /// Record the raw flag at `now_ms`.
    ///
    /// Repeating the pending value keeps its original timestamp.
    pub fn update_at(&mut self, raw: bool, now_ms: u64) {
        match self.pending {
            Some((value, _)) if value == raw => {}
            _ if raw == self.surfaced => self.pending = None,
            _ => self.pending = Some((raw, now_ms)),
        }
    }

    /// Surfaced flag at `now_ms`.
    pub fn value_at(&mut self, now_ms: u64) -> bool {
        if let Some((value, since_ms)) = self.pending {
            if now_ms.saturating_sub(since_ms) >= self.window_ms {
                self.surfaced = value;
                self.pending = None;
            }
        }
        self.surfaced
    }

    /// Drop any pending value and lower the flag.
    pub fn reset(&mut self) {
        self.surfaced = false;
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_surfaces_after_window() {
        let mut debouncer = HighImpactDebouncer::new(1000);
        debouncer.update_at(true, 0);

        assert!(!debouncer.value_at(999));
        assert!(debouncer.value_at(1000));
    }

    #[test]
    fn test_flicker_is_suppressed() {
        let mut debouncer = HighImpactDebouncer::new(1000);
        debouncer.update_at(true, 0);
        debouncer.update_at(false, 300);
        debouncer.update_at(true, 600);

        assert!(!debouncer.value_at(1200));
        assert!(debouncer.value_at(1600));
    }

    #[test]
    fn test_repeated_value_keeps_timestamp() {
        let mut debouncer = HighImpactDebouncer::new(1000);
        debouncer.update_at(true, 0);
        debouncer.update_at(true, 800);

        assert!(debouncer.value_at(1000));
    }

    #[test]
    fn test_lowering_also_debounced() {
        let mut debouncer = HighImpactDebouncer::new(1000);
        debouncer.update_at(true, 0);
        assert!(debouncer.value_at(1000));

        debouncer.update_at(false, 1500);
        assert!(debouncer.value_at(2000));
        assert!(!debouncer.value_at(2500));
    }

    #[test]
    fn test_reset() {
        let mut debouncer = HighImpactDebouncer::new(1000);
        debouncer.update_at(true, 0);
        assert!(debouncer.value_at(1000));

        debouncer.reset();
        assert!(!debouncer.value_at(5000));
    }
}
