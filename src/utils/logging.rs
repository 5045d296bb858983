//! Logging Module
//!
//! Structured logging with the `tracing` crate, plus an epoch-level logger
//! for the training loop.

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
    /// Create a verbose logging config for debugging
    pub fn verbose() -> Self {
        Self {
            level: LogLevel::Debug,
            include_target: true,
            include_thread_ids: true,
            ansi_colors: true,
        }
    }

    /// Default layout at the named level (`trace` .. `error`)
    pub fn from_level_name(name: &str) -> Self {
        Self {
            level: LogLevel::parse(name),
            ..Default::default()
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
    /// Convert to tracing Level
    pub fn to_tracing_level(&self) -> Level {
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
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warn,
            "error" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// Initialize logging with the given configuration
pub fn init_logging(config: &LogConfig) -> Result<(), String> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.level.to_tracing_level())
        .with_ansi(config.ansi_colors)
        .with_target(config.include_target)
        .with_thread_ids(config.include_thread_ids)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| format!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Training progress logger
pub struct TrainingLogger {
    epoch: usize,
    total_epochs: usize,
    epoch_start: Instant,
    training_start: Instant,
}

impl TrainingLogger {
    pub fn new(total_epochs: usize) -> Self {
        Self {
            epoch: 0,
            total_epochs,
            epoch_start: Instant::now(),
            training_start: Instant::now(),
        }
    }

    /// Log start of an epoch (0-based)
    pub fn start_epoch(&mut self, epoch: usize) {
        self.epoch = epoch;
        self.epoch_start = Instant::now();

        tracing::info!("Epoch {}/{} started", epoch + 1, self.total_epochs);
    }

    /// Log end of an epoch with metrics. Accuracies are fractions in [0, 1].
    pub fn end_epoch(&self, train_loss: f64, train_accuracy: f64, val_accuracy: Option<f64>) {
        let epoch_time = self.epoch_start.elapsed();

        match val_accuracy {
            Some(val) => tracing::info!(
                "Epoch {}/{} completed in {:.1}s | Loss: {:.4} | Train Acc: {:.2}% | Val Acc: {:.2}%",
                self.epoch + 1,
                self.total_epochs,
                epoch_time.as_secs_f64(),
                train_loss,
                train_accuracy * 100.0,
                val * 100.0
            ),
            None => tracing::info!(
                "Epoch {}/{} completed in {:.1}s | Loss: {:.4} | Train Acc: {:.2}%",
                self.epoch + 1,
                self.total_epochs,
                epoch_time.as_secs_f64(),
                train_loss,
                train_accuracy * 100.0
            ),
        }
    }

    /// Log a new best model
    pub fn log_new_best(&self, accuracy: f64) {
        tracing::info!("New best model, validation accuracy {:.2}%", accuracy * 100.0);
    }

    /// Log training completion
    pub fn log_complete(&self, best_accuracy: Option<f64>) {
        let total_time = self.training_start.elapsed();

        match best_accuracy {
            Some(best) => tracing::info!(
                "Training complete: {} epochs in {:.1}s | Best val accuracy: {:.2}%",
                self.total_epochs,
                total_time.as_secs_f64(),
                best * 100.0
            ),
            None => tracing::info!(
                "Training complete: {} epochs in {:.1}s",
                self.total_epochs,
                total_time.as_secs_f64()
            ),
        }
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
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.level, LogLevel::Info);
        assert!(config.ansi_colors);

        let warn = LogConfig::from_level_name("warn");
        assert_eq!(warn.level, LogLevel::Warn);
        assert!(!warn.include_target);
    }
}
