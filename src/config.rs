//! Tunables for partitioning and column chunking.
//!
//! `Default` holds the tuned constants. `from_env` lets a deployment
//! override the partitioning knobs without recompiling:
//!
//! | Variable | Field |
//! |---|---|
//! | `QNBIT_GEMM_THREAD_COMPLEXITY` | `thread_complexity` |
//! | `QNBIT_GEMM_STRIDE_M` | `stride_m` |
//! | `QNBIT_GEMM_STRIDE_N_ALIGN` | `stride_n_thread_align` |

use std::env;

use crate::error::{GemmError, GemmResult};

pub const ENV_THREAD_COMPLEXITY: &str = "QNBIT_GEMM_THREAD_COMPLEXITY";
pub const ENV_STRIDE_M: &str = "QNBIT_GEMM_STRIDE_M";
pub const ENV_STRIDE_N_ALIGN: &str = "QNBIT_GEMM_STRIDE_N_ALIGN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemmConfig {
    /// Multiply-adds one thread is expected to absorb before another is added.
    pub thread_complexity: usize,
    /// Target threads are capped at `max_threads * thread_cap_multiplier`.
    pub thread_cap_multiplier: usize,
    /// Rows per tile when running on a thread pool.
    pub stride_m: usize,
    /// Column tile widths are rounded up to a multiple of this.
    pub stride_n_thread_align: usize,
    /// Columns per single-row kernel call.
    pub m1_stride_n: usize,
    /// Columns dequantized per dense-kernel pass.
    pub dequant_stride_n: usize,
}

impl Default for GemmConfig {
    fn default() -> Self {
        Self {
            thread_complexity: 64 * 1024,
            thread_cap_multiplier: 8,
            stride_m: 128,
            stride_n_thread_align: 16,
            m1_stride_n: 128,
            dequant_stride_n: 32,
        }
    }
}

impl GemmConfig {
    /// Defaults overridden by any `QNBIT_GEMM_*` variables that are set.
    pub fn from_env() -> GemmResult<Self> {
        let mut config = Self::default();
        if let Some(v) = read_env(ENV_THREAD_COMPLEXITY)? {
            config.thread_complexity = v;
        }
        if let Some(v) = read_env(ENV_STRIDE_M)? {
            config.stride_m = v;
        }
        if let Some(v) = read_env(ENV_STRIDE_N_ALIGN)? {
            config.stride_n_thread_align = v;
        }
        config.validate()?;
        log::debug!("qnbit gemm config: {config:?}");
        Ok(config)
    }

    pub fn validate(&self) -> GemmResult<()> {
        let fields = [
            ("thread_complexity", self.thread_complexity),
            ("thread_cap_multiplier", self.thread_cap_multiplier),
            ("stride_m", self.stride_m),
            ("stride_n_thread_align", self.stride_n_thread_align),
            ("m1_stride_n", self.m1_stride_n),
            ("dequant_stride_n", self.dequant_stride_n),
        ];
        for (name, value) in fields {
            if value == 0 {
                return Err(GemmError::InvalidConfig(format!("{name} must be > 0")));
            }
        }
        Ok(())
    }
}

fn read_env(name: &str) -> GemmResult<Option<usize>> {
    match env::var(name) {
        Ok(value) => parse_positive(name, &value).map(Some),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => {
            Err(GemmError::InvalidConfig(format!("{name} is not valid unicode")))
        }
    }
}

fn parse_positive(name: &str, value: &str) -> GemmResult<usize> {
    match value.trim().parse::<usize>() {
        Ok(0) => Err(GemmError::InvalidConfig(format!("{name} must be > 0"))),
        Ok(v) => Ok(v),
        Err(_) => Err(GemmError::InvalidConfig(format!("{name}={value:?} is not an integer"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = GemmConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thread_complexity, 65536);
        assert_eq!(config.stride_m, 128);
    }

    #[test]
    fn parse_rejects_zero_and_garbage() {
        assert_eq!(parse_positive("X", " 42 ").unwrap(), 42);
        assert!(matches!(parse_positive("X", "0"), Err(GemmError::InvalidConfig(_))));
        assert!(matches!(parse_positive("X", "lots"), Err(GemmError::InvalidConfig(_))));
    }

    #[test]
    fn validate_rejects_zero_stride() {
        let config = GemmConfig { stride_m: 0, ..GemmConfig::default() };
        assert!(config.validate().is_err());
    }
}
