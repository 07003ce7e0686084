//! Adaptive learning-rate controller
//!
//! Watches one metric per epoch (higher is better). When the metric has not
//! improved for `patience` consecutive epochs the learning rate is multiplied
//! by the decay factor and the wait counter restarts. Once every drop has
//! been used, the next plateau ends training.

use serde::{Deserialize, Serialize};

/// What the controller decided after an epoch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LrDecision {
    /// Keep training at the current rate
    Continue,
    /// Plateau reached, the rate was lowered to `lr`
    Decayed { lr: f64 },
    /// Plateau reached with no drops left
    Stop,
}

/// Plateau-driven learning-rate decay with a fixed number of drops
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveLrController {
    lr: f64,
    best: f64,
    wait: usize,
    patience: usize,
    drops_remaining: usize,
    decay: f64,
    stopped: bool,
}

impl AdaptiveLrController {
    pub fn new(initial_lr: f64, patience: usize, drops: usize, decay: f64) -> Self {
        Self {
            lr: initial_lr,
            best: f64::NEG_INFINITY,
            wait: 0,
            patience: patience.max(1),
            drops_remaining: drops,
            decay,
            stopped: false,
        }
    }

    /// Record the metric of a finished epoch
    pub fn step(&mut self, metric: f64) -> LrDecision {
        if self.stopped {
            return LrDecision::Stop;
        }

        if metric > self.best {
            self.best = metric;
            self.wait = 0;
            return LrDecision::Continue;
        }

        self.wait += 1;
        if self.wait < self.patience {
            return LrDecision::Continue;
        }

        self.wait = 0;
        if self.drops_remaining == 0 {
            self.stopped = true;
            return LrDecision::Stop;
        }

        self.drops_remaining -= 1;
        self.lr *= self.decay;
        LrDecision::Decayed { lr: self.lr }
    }

    pub fn learning_rate(&self) -> f64 {
        self.lr
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn drops_remaining(&self) -> usize {
        self.drops_remaining
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_improving_metric_never_decays() {
        let mut alr = AdaptiveLrController::new(0.1, 2, 3, 0.5);
        for i in 0..20 {
            assert_eq!(alr.step(i as f64), LrDecision::Continue);
        }
        assert_eq!(alr.learning_rate(), 0.1);
    }

    #[test]
    fn test_single_decay_per_plateau() {
        let mut alr = AdaptiveLrController::new(0.1, 3, 4, 0.5);
        assert_eq!(alr.step(0.5), LrDecision::Continue);

        // Flat for exactly `patience` epochs
        assert_eq!(alr.step(0.5), LrDecision::Continue);
        assert_eq!(alr.step(0.4), LrDecision::Continue);
        assert_eq!(alr.step(0.5), LrDecision::Decayed { lr: 0.05 });

        // The wait restarts after a decay
        assert_eq!(alr.step(0.5), LrDecision::Continue);
        assert_eq!(alr.step(0.5), LrDecision::Continue);
        assert_eq!(alr.learning_rate(), 0.05);
        assert_eq!(alr.drops_remaining(), 3);
    }

    #[test]
    fn test_improvement_resets_wait() {
        let mut alr = AdaptiveLrController::new(1.0, 2, 1, 0.5);
        alr.step(0.1);
        alr.step(0.1);
        alr.step(0.2);
        assert_eq!(alr.step(0.2), LrDecision::Continue);
        assert_eq!(alr.step(0.2), LrDecision::Decayed { lr: 0.5 });
    }

    #[test]
    fn test_stops_after_drops_exhausted() {
        let mut alr = AdaptiveLrController::new(1.0, 1, 2, 0.5);
        assert_eq!(alr.step(0.9), LrDecision::Continue);
        assert_eq!(alr.step(0.9), LrDecision::Decayed { lr: 0.5 });
        assert_eq!(alr.step(0.9), LrDecision::Decayed { lr: 0.25 });
        assert_eq!(alr.step(0.9), LrDecision::Stop);
        assert!(alr.is_stopped());

        // Stop is sticky
        assert_eq!(alr.step(1.0), LrDecision::Stop);
        assert_eq!(alr.learning_rate(), 0.25);
    }

    #[test]
    fn test_zero_drops_stops_on_first_plateau() {
        let mut alr = AdaptiveLrController::new(1e-3, 2, 0, 0.5);
        alr.step(0.3);
        assert_eq!(alr.step(0.2), LrDecision::Continue);
        assert_eq!(alr.step(0.2), LrDecision::Stop);
    }
}
