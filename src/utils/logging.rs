//! Logging Module
//!
//! Structured logging built on `tracing`. The binary installs a subscriber
//! once; library code only emits events.

use std::time::Instant;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: LogLevel,
    /// Whether to include target (module path)
    pub include_target: bool,
    /// Whether to include thread IDs
    pub include_thread_ids: bool,
    /// Whether to use ANSI colors
    pub ansi_colors: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            include_target: false,
            include_thread_ids: false,
            ansi_colors: true,
        }
    }
}

impl LogConfig {
    /// Verbose logging for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }
}

/// Log level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Parse a level name, falling back to `Info`
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trace" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Install the global subscriber
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))
}

/// Progress logger for long-running passes (feature extraction, image loading)
pub struct ProgressLogger {
    operation: String,
    total: usize,
    current: usize,
    log_interval: usize,
    start_time: Instant,
}

impl ProgressLogger {
    pub fn new(operation: &str, total: usize) -> Self {
        Self {
            operation: operation.to_string(),
            total,
            current: 0,
            log_interval: (total / 10).max(1),
            start_time: Instant::now(),
        }
    }

    /// Advance by `count` items, logging roughly every tenth of the total
    pub fn advance(&mut self, count: usize) {
        let before = self.current / self.log_interval;
        self.current = (self.current + count).min(self.total);
        let after = self.current / self.log_interval;

        if after > before || self.current == self.total {
            let percentage = if self.total > 0 {
                100.0 * self.current as f64 / self.total as f64
            } else {
                100.0
            };
            tracing::debug!(
                "{}: {}/{} ({:.1}%)",
                self.operation,
                self.current,
                self.total,
                percentage
            );
        }
    }

    pub fn finish(&self) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        tracing::info!(
            "{}: completed {} items in {:.2}s",
            self.operation,
            self.total,
            elapsed
        );
    }
}

/// Per-epoch training logger
pub struct TrainingLogger {
    epoch: usize,
    max_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(max_epochs: usize) -> Self {
        Self {
            epoch: 0,
            max_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();
        tracing::debug!("Epoch {}/{} started", epoch + 1, self.max_epochs);
    }

    /// Log end of an epoch with metrics
    pub fn end_epoch(
        &self,
        train_loss: f64,
        train_accuracy: f64,
        val_accuracy: Option<f64>,
        learning_rate: f64,
    ) {
        let val = val_accuracy
            .map(|v| format!("{:.2}%", v * 100.0))
            .unwrap_or_else(|| "-".to_string());

        tracing::info!(
            "Epoch {}/{} in {:.1}s | Loss: {:.4} | Acc: {:.2}% | Val Acc: {} | LR: {:.6}",
            self.epoch + 1,
            self.max_epochs,
            self.epoch_start.elapsed().as_secs_f64(),
            train_loss,
            train_accuracy * 100.0,
            val,
            learning_rate
        );
    }

    pub fn log_lr_decay(&self, learning_rate: f64, drops_remaining: usize) {
        tracing::info!(
            "Plateau reached, learning rate reduced to {:.6} ({} drops remaining)",
            learning_rate,
            drops_remaining
        );
    }

    pub fn log_stop(&self) {
        tracing::warn!(
            "Learning rate drops exhausted, stopping after epoch {}",
            self.epoch + 1
        );
    }

    pub fn log_complete(&self, epochs_run: usize) {
        tracing::info!(
            "Training complete: {} epochs in {:.1}s",
            epochs_run,
            self.training_start.elapsed().as_secs_f64()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("debug"), LogLevel::Debug);
        assert_eq!(LogLevel::parse("INFO"), LogLevel::Info);
        assert_eq!(LogLevel::parse("Warning"), LogLevel::Warn);
        assert_eq!(LogLevel::parse("unknown"), LogLevel::Info);
    }

    #[test]
    fn test_log_config_presets() {
        assert_eq!(LogConfig::default().level, LogLevel::Info);
        assert_eq!(LogConfig::verbose().level, LogLevel::Debug);
    }

    #[test]
    fn test_progress_logger_clamps() {
        let mut logger = ProgressLogger::new("Vectors", 100);
        logger.advance(64);
        logger.advance(64);
        assert_eq!(logger.current, 100);
    }
}
