use thiserror::Error;

/// Errors raised by the SSR stages.
///
/// Out-of-range settings are never errors; they are clamped at the settings
/// boundary. Everything here degrades to "no reflections this frame".
#[derive(Error, Debug)]
pub enum SsrError {
    #[error("required feature missing: {0}")]
    MissingFeature(String),

    #[error("shader not found: {0}")]
    ShaderNotFound(String),

    #[error("shader compilation failed for {name}: {message}")]
    ShaderCompilation { name: String, message: String },

    #[error("failed to allocate {label}: {reason}")]
    Allocation { label: String, reason: String },

    #[error("no suitable GPU adapter")]
    AdapterUnavailable,

    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
}

/// Coarse classification used when deciding how to report a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Static misconfiguration; logged and retried every frame.
    Configuration,
    /// Temporary resource failure; fatal to the current pass only.
    Resource,
    /// Device setup failure.
    Device,
}

impl SsrError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SsrError::MissingFeature(_) | SsrError::ShaderNotFound(_) | SsrError::ShaderCompilation { .. } => {
                ErrorKind::Configuration
            }
            SsrError::Allocation { .. } => ErrorKind::Resource,
            SsrError::AdapterUnavailable | SsrError::DeviceRequest(_) => ErrorKind::Device,
        }
    }
}

pub type Result<T> = std::result::Result<T, SsrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(SsrError::MissingFeature("depth pyramid".into()).kind(), ErrorKind::Configuration);
        assert_eq!(SsrError::ShaderNotFound("limssr/ssr".into()).kind(), ErrorKind::Configuration);
        let alloc = SsrError::Allocation {
            label: "SSR Reflection".into(),
            reason: "zero extent".into(),
        };
        assert_eq!(alloc.kind(), ErrorKind::Resource);
        assert_eq!(SsrError::AdapterUnavailable.kind(), ErrorKind::Device);
    }

    #[test]
    fn test_error_messages() {
        let err = SsrError::ShaderNotFound("limssr/ssr".into());
        assert_eq!(err.to_string(), "shader not found: limssr/ssr");
        let err = SsrError::ShaderCompilation {
            name: "limssr/blit".into(),
            message: "bad token".into(),
        };
        assert!(err.to_string().contains("limssr/blit"));
    }
}
