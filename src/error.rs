use thiserror::Error;

#[derive(Debug, Error)]
pub enum GemmError {
    #[error("unsupported configuration: bit width {bit_width}, block length {blk_len}, compute type {compute_type}, m {m}")]
    UnsupportedConfiguration {
        bit_width: usize,
        blk_len: usize,
        compute_type: &'static str,
        m: usize,
    },
    #[error("kernel table is missing a kernel required by {0}")]
    KernelUnavailable(&'static str),
    #[error("workspace too small: need {required} bytes, got {actual}")]
    WorkspaceTooSmall { required: usize, actual: usize },
    #[error("variant {0} needs a workspace but none was supplied")]
    MissingWorkspace(&'static str),
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type GemmResult<T> = Result<T, GemmError>;
