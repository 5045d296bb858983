//! Checkpoint Policy
//!
//! Decides after which epochs the weights are written. With a validation
//! split the model is saved whenever validation accuracy strictly beats the
//! best seen so far; without one it is saved once, after the final epoch.

/// Tracks the best validation accuracy of a run
#[derive(Debug, Clone, Default)]
pub struct BestCheckpoint {
    best: Option<f64>,
    best_epoch: Option<usize>,
}

impl BestCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the validation accuracy of `epoch` (1-based); returns whether to save
    pub fn observe(&mut self, epoch: usize, accuracy: f64) -> bool {
        let improved = match self.best {
            None => true,
            Some(best) => accuracy > best,
        };

        if improved {
            self.best = Some(accuracy);
            self.best_epoch = Some(epoch);
        }
        improved
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }
}

/// Whether to save after `epoch` (1-based) when there is no validation split
pub fn save_without_validation(epoch: usize, total_epochs: usize) -> bool {
    epoch == total_epochs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saves_only_on_strict_improvement() {
        let mut policy = BestCheckpoint::new();
        let saved: Vec<usize> = [0.5, 0.7, 0.6, 0.9]
            .iter()
            .enumerate()
            .filter_map(|(i, &acc)| policy.observe(i + 1, acc).then_some(i + 1))
            .collect();

        assert_eq!(saved, vec![1, 2, 4]);
        assert_eq!(policy.best(), Some(0.9));
        assert_eq!(policy.best_epoch(), Some(4));
    }

    #[test]
    fn test_ties_do_not_save() {
        let mut policy = BestCheckpoint::new();
        assert!(policy.observe(1, 0.0));
        assert!(!policy.observe(2, 0.0));
        assert_eq!(policy.best_epoch(), Some(1));
    }

    #[test]
    fn test_without_validation_saves_after_last_epoch() {
        let saved: Vec<usize> = (1..=3).filter(|&e| save_without_validation(e, 3)).collect();
        assert_eq!(saved, vec![3]);
    }
}
