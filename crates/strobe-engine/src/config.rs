//! Engine configuration, validation, and startup errors.
//!
//! [`EngineConfig`] covers everything the scheduling core is configured
//! with: worker-pool size, target frame rate, and the share of the frame
//! period granted to the commit phase. Per-unit flags live on
//! [`UnitFlags`](strobe_core::UnitFlags) and are supplied at registration.

use std::time::Duration;

use thiserror::Error;

/// Hard upper bound on worker threads.
pub const MAX_WORKERS: usize = 64;

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected during [`EngineConfig::validate()`] or while starting
/// engine threads.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// An explicit worker count of zero leaves nothing to run `compute`.
    #[error("worker_count must be at least 1")]
    ZeroWorkers,
    /// Worker count above [`MAX_WORKERS`].
    #[error("worker_count {configured} exceeds maximum of {MAX_WORKERS}")]
    TooManyWorkers {
        /// The configured count.
        configured: usize,
    },
    /// Target frame rate of zero, or too high to express in nanoseconds.
    #[error("target_frame_rate_hz must be in 1..=1_000_000_000, got {value}")]
    InvalidFrameRate {
        /// The invalid value.
        value: u32,
    },
    /// `commit_budget_ratio` is NaN, non-positive, or above 1.
    #[error("commit_budget_ratio must be in (0, 1], got {value}")]
    InvalidCommitBudget {
        /// The invalid value.
        value: f64,
    },
    /// A background thread could not be spawned or did not report ready.
    #[error("thread spawn failed: {reason}")]
    ThreadSpawnFailed {
        /// Which thread failed, and why.
        reason: String,
    },
}

// ── EngineConfig ───────────────────────────────────────────────────

/// Startup configuration for the scheduling core.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Number of worker threads. `None` = auto-detect
    /// (`available_parallelism - 1`, clamped to `[1, 16]`, leaving a core
    /// for the render thread).
    pub worker_count: Option<usize>,
    /// Target frame rate in Hz. Default: 60.
    pub target_frame_rate_hz: u32,
    /// Fraction of the frame period the commit phase is budgeted. The
    /// budget is advisory: an overrun is reported, never enforced.
    /// Default: 0.5.
    pub commit_budget_ratio: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            target_frame_rate_hz: 60,
            commit_budget_ratio: 0.5,
        }
    }
}

impl EngineConfig {
    /// Shorthand for a config with an explicit worker count.
    pub fn with_workers(worker_count: usize) -> Self {
        Self {
            worker_count: Some(worker_count),
            ..Self::default()
        }
    }

    /// Validate all fields.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.worker_count {
            Some(0) => return Err(ConfigError::ZeroWorkers),
            Some(n) if n > MAX_WORKERS => {
                return Err(ConfigError::TooManyWorkers { configured: n })
            }
            _ => {}
        }
        if self.target_frame_rate_hz == 0 || self.target_frame_rate_hz > 1_000_000_000 {
            return Err(ConfigError::InvalidFrameRate {
                value: self.target_frame_rate_hz,
            });
        }
        let ratio = self.commit_budget_ratio;
        if !ratio.is_finite() || ratio <= 0.0 || ratio > 1.0 {
            return Err(ConfigError::InvalidCommitBudget { value: ratio });
        }
        Ok(())
    }

    /// Resolve the actual worker count, applying auto-detection if `None`.
    ///
    /// Explicit values are returned as-is; call
    /// [`validate()`](Self::validate) first.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n,
            None => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4);
                cpus.saturating_sub(1).clamp(1, 16)
            }
        }
    }

    /// Target frame period, converted from the frame rate in nanoseconds.
    pub fn frame_period(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.target_frame_rate_hz.max(1)))
    }

    /// Soft time budget for one frame's commit phase.
    pub fn commit_budget(&self) -> Duration {
        self.frame_period().mul_f64(self.commit_budget_ratio)
    }
}
