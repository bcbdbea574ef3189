//! Percentage progress logging for long block applications

use tracing::info;

#[derive(Debug)]
pub struct ProgressLogger {
    label: String,
    total: usize,
    step: usize,
    applied: usize,
}

impl ProgressLogger {
    /// Log every `step_percent` of `total` items (at least every item)
    pub fn new(total: usize, step_percent: u8, label: impl Into<String>) -> Self {
        let percent = usize::from(step_percent.clamp(1, 100));
        Self {
            label: label.into(),
            total,
            step: (total * percent / 100).max(1),
            applied: 0,
        }
    }

    /// Record one applied item. Returns the percentage when a line was logged.
    pub fn apply_next(&mut self) -> Option<u8> {
        if self.applied >= self.total {
            return None;
        }
        self.applied += 1;

        if self.applied % self.step == 0 || self.applied == self.total {
            let percent = (self.applied * 100 / self.total) as u8;
            info!("{}: {} %", self.label, percent);
            return Some(percent);
        }
        None
    }

    pub fn applied(&self) -> usize {
        self.applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logs_at_each_step() {
        let mut progress = ProgressLogger::new(10, 20, "Genesis block loading");
        let logged: Vec<u8> = (0..10).filter_map(|_| progress.apply_next()).collect();
        assert_eq!(logged, vec![20, 40, 60, 80, 100]);
    }

    #[test]
    fn test_small_totals_log_every_item_and_finish_at_100() {
        let mut progress = ProgressLogger::new(3, 10, "Genesis block loading");
        let logged: Vec<u8> = (0..5).filter_map(|_| progress.apply_next()).collect();
        assert_eq!(logged, vec![33, 66, 100]);
        assert_eq!(progress.applied(), 3);
    }
}
