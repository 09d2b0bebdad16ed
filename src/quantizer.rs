//! Conversion between real-valued seconds and the integer grid a
//! [`Timeline`](crate::timeline::Timeline) is built on.

use crate::error::{Error, Result};

/// How the scaled value is brought onto the integer grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundingMode {
    /// Drop the fractional part (toward zero).
    #[default]
    Truncate,
    /// Round half away from zero.
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizerOptions {
    /// Grid steps per second. Must be a positive whole number.
    pub resolution: f64,
    pub rounding_mode: RoundingMode,
}

impl Default for QuantizerOptions {
    fn default() -> Self {
        QuantizerOptions {
            resolution: 1.0,
            rounding_mode: RoundingMode::Truncate,
        }
    }
}

/// Maps seconds onto integer steps of `1 / resolution` seconds.
///
/// `dequantize(quantize(x))` only approximates `x`; the error is bounded by
/// one grid step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeQuantizer {
    resolution: i64,
    rounding_mode: RoundingMode,
}

impl TimeQuantizer {
    pub fn new(options: QuantizerOptions) -> Result<Self> {
        let resolution = options.resolution;
        if !resolution.is_finite() || resolution.fract() != 0.0 || resolution <= 0.0 {
            return Err(Error::Configuration(format!(
                "quantizer resolution must be a positive integer, got {resolution}"
            )));
        }

        Ok(TimeQuantizer {
            resolution: resolution as i64,
            rounding_mode: options.rounding_mode,
        })
    }

    /// Shorthand for `new` with the given resolution and default rounding.
    pub fn with_resolution(resolution: i64) -> Result<Self> {
        Self::new(QuantizerOptions {
            resolution: resolution as f64,
            ..QuantizerOptions::default()
        })
    }

    pub fn resolution(&self) -> i64 {
        self.resolution
    }

    pub fn rounding_mode(&self) -> RoundingMode {
        self.rounding_mode
    }

    pub fn quantize(&self, value: f64) -> i64 {
        let scaled = value * self.resolution as f64;
        match self.rounding_mode {
            RoundingMode::Truncate => scaled.trunc() as i64,
            RoundingMode::Nearest => scaled.round() as i64,
        }
    }

    pub fn dequantize(&self, value: i64) -> f64 {
        value as f64 / self.resolution as f64
    }
}

impl Default for TimeQuantizer {
    fn default() -> Self {
        TimeQuantizer {
            resolution: 1,
            rounding_mode: RoundingMode::Truncate,
        }
    }
}
