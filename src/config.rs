//! Resource limits.
//!
//! [`Limits`] collects every tunable named in spec.md §6. Use
//! [`Limits::default`] for sensible defaults or [`Limits::builder`] for a
//! fluent, validated builder, mirroring the teacher's
//! `EngineConfig`/`EngineConfigBuilder` pair.
//!
//! # Examples
//!
//! ```rust
//! use termgfx_store::config::Limits;
//!
//! let limits = Limits::builder()
//!     .max_total_ram_size(64 * 1024 * 1024)
//!     .excess_tolerance_ratio(0.1)
//!     .build()
//!     .unwrap();
//! assert_eq!(limits.max_total_ram_size, 64 * 1024 * 1024);
//! ```

use std::fmt;

/// Resource limits and tunables enforced by the eviction engine and the
/// transmission pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    /// Largest a single uploaded frame file may be, in bytes.
    pub max_single_image_file_size: u64,
    /// Aggregate cap on all frame cache files on disk, in bytes.
    pub total_file_cache_size: u64,
    /// Largest a single placement's scaled pixmap (or a frame's decoded
    /// object) may be, in bytes.
    pub max_single_image_ram_size: u64,
    /// Aggregate cap on decoded + scaled RAM usage, in bytes.
    pub max_total_ram_size: u64,
    /// Cap shared by both the image count and the placement count checks
    /// (the reference implementation checks image count against this same
    /// limit; see DESIGN.md).
    pub max_total_placements: usize,
    /// Fraction of slack allowed above a limit before eviction acts
    /// (`limit * (1 + ratio)`).
    pub excess_tolerance_ratio: f64,
    /// Lower bound on the delay reported to the caller between redraws.
    pub animation_min_delay_ms: i64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_single_image_file_size: 20 * 1024 * 1024,
            total_file_cache_size: 300 * 1024 * 1024,
            max_single_image_ram_size: 320 * 1024 * 1024,
            max_total_ram_size: 320 * 1024 * 1024,
            max_total_placements: 100,
            excess_tolerance_ratio: 0.05,
            animation_min_delay_ms: 1,
        }
    }
}

impl Limits {
    /// The limit scaled by `1 + excess_tolerance_ratio`, i.e. the point at
    /// which eviction actually kicks in (spec.md §4.8).
    pub fn tolerated(&self, limit: u64) -> u64 {
        limit + ((limit as f64) * self.excess_tolerance_ratio) as u64
    }

    /// Same as [`Limits::tolerated`] but for counts.
    pub fn tolerated_count(&self, limit: usize) -> usize {
        limit + (((limit as f64) * self.excess_tolerance_ratio) as usize)
    }

    pub fn builder() -> LimitsBuilder {
        LimitsBuilder::default()
    }
}

/// Fluent, validating builder for [`Limits`].
#[derive(Debug, Clone)]
pub struct LimitsBuilder {
    inner: Limits,
}

impl Default for LimitsBuilder {
    fn default() -> Self {
        Self { inner: Limits::default() }
    }
}

impl LimitsBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut Limits)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn max_single_image_file_size(self, n: u64) -> Self {
        self.map(|c| c.max_single_image_file_size = n)
    }
    pub fn total_file_cache_size(self, n: u64) -> Self {
        self.map(|c| c.total_file_cache_size = n)
    }
    pub fn max_single_image_ram_size(self, n: u64) -> Self {
        self.map(|c| c.max_single_image_ram_size = n)
    }
    pub fn max_total_ram_size(self, n: u64) -> Self {
        self.map(|c| c.max_total_ram_size = n)
    }
    pub fn max_total_placements(self, n: usize) -> Self {
        self.map(|c| c.max_total_placements = n)
    }
    pub fn excess_tolerance_ratio(self, r: f64) -> Self {
        self.map(|c| c.excess_tolerance_ratio = r)
    }
    pub fn animation_min_delay_ms(self, n: i64) -> Self {
        self.map(|c| c.animation_min_delay_ms = n)
    }

    /// Validate and build the final [`Limits`].
    pub fn build(self) -> Result<Limits, ConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

/// A [`Limits`] value failed validation.
#[derive(Debug, Clone)]
pub enum ConfigError {
    ZeroLimit(&'static str),
    NegativeTolerance(f64),
    NegativeMinDelay(i64),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ConfigError::*;
        match self {
            ZeroLimit(name) => write!(f, "{name} must be at least 1"),
            NegativeTolerance(r) => write!(f, "excess_tolerance_ratio must be >= 0 (got {r})"),
            NegativeMinDelay(n) => write!(f, "animation_min_delay_ms must be >= 0 (got {n})"),
        }
    }
}

impl std::error::Error for ConfigError {}

fn validate(c: &Limits) -> Result<(), ConfigError> {
    if c.max_single_image_file_size == 0 {
        return Err(ConfigError::ZeroLimit("max_single_image_file_size"));
    }
    if c.total_file_cache_size == 0 {
        return Err(ConfigError::ZeroLimit("total_file_cache_size"));
    }
    if c.max_single_image_ram_size == 0 {
        return Err(ConfigError::ZeroLimit("max_single_image_ram_size"));
    }
    if c.max_total_ram_size == 0 {
        return Err(ConfigError::ZeroLimit("max_total_ram_size"));
    }
    if c.max_total_placements == 0 {
        return Err(ConfigError::ZeroLimit("max_total_placements"));
    }
    if c.excess_tolerance_ratio < 0.0 {
        return Err(ConfigError::NegativeTolerance(c.excess_tolerance_ratio));
    }
    if c.animation_min_delay_ms < 0 {
        return Err(ConfigError::NegativeMinDelay(c.animation_min_delay_ms));
    }
    Ok(())
}
