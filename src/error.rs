//! Error types for the frame core.
//!
//! Every fallible operation returns [`GraphicsResult`]. Nothing in this crate
//! recovers from an error: device faults and shader failures are reported
//! upward, and the driving application terminates through [`report_fatal`].

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::command::ContextState;
use crate::state_tracker::ResourceState;
use crate::types::ResourceId;

/// Status code returned by a failing device call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    /// The device was physically removed or the driver was upgraded.
    DeviceRemoved,
    /// The device stopped responding to submitted commands.
    DeviceHung,
    /// The device was reset after a badly formed command stream.
    DeviceReset,
    /// A resource allocation could not be satisfied.
    OutOfMemory,
    /// A parameter passed to the call was invalid.
    InvalidArgument,
    /// The call was made while the object was in the wrong state.
    InvalidCall,
    /// The driver hit an internal error.
    DriverInternal,
    /// The requested feature is not supported by this device.
    Unsupported,
}

impl DeviceStatus {
    /// Raw status code in the native 32-bit result format.
    pub fn code(self) -> u32 {
        match self {
            DeviceStatus::DeviceRemoved => 0x887A_0005,
            DeviceStatus::DeviceHung => 0x887A_0006,
            DeviceStatus::DeviceReset => 0x887A_0007,
            DeviceStatus::OutOfMemory => 0x8007_000E,
            DeviceStatus::InvalidArgument => 0x8007_0057,
            DeviceStatus::InvalidCall => 0x887A_0001,
            DeviceStatus::DriverInternal => 0x887A_0020,
            DeviceStatus::Unsupported => 0x887A_0004,
        }
    }

    /// Human readable description of the status.
    pub fn message(self) -> &'static str {
        match self {
            DeviceStatus::DeviceRemoved => "the GPU device instance has been removed",
            DeviceStatus::DeviceHung => "the GPU device stopped responding",
            DeviceStatus::DeviceReset => "the GPU device was reset",
            DeviceStatus::OutOfMemory => "not enough memory to complete the allocation",
            DeviceStatus::InvalidArgument => "one or more arguments are invalid",
            DeviceStatus::InvalidCall => "the method call is invalid for the current object state",
            DeviceStatus::DriverInternal => "the driver encountered an internal error",
            DeviceStatus::Unsupported => "the requested functionality is not supported",
        }
    }

    /// Whether the device can no longer accept work.
    pub fn is_device_lost(self) -> bool {
        matches!(
            self,
            DeviceStatus::DeviceRemoved | DeviceStatus::DeviceHung | DeviceStatus::DeviceReset
        )
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.message(), self.code())
    }
}

/// Errors produced by the frame core.
#[derive(Debug, Error)]
pub enum GraphicsError {
    /// A device call returned a failure status.
    #[error("{call} failed in {file} line {line}: {status}")]
    DeviceFault {
        call: String,
        file: &'static str,
        line: u32,
        status: DeviceStatus,
    },

    #[error("shader `{name}` failed to compile:\n{diagnostics}")]
    ShaderCompilation { name: String, diagnostics: String },

    #[error("shader source `{0}` is not registered")]
    ShaderNotFound(String),

    #[error("include `{include}` not found while composing `{shader}`")]
    IncludeNotFound { shader: String, include: String },

    #[error("failed to read shader override {}: {source}", path.display())]
    ShaderIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{what} capacity of {capacity} exceeded")]
    CapacityExceeded { what: &'static str, capacity: usize },

    #[error("command allocator is still in flight (submitted at fence value {submitted}, completed {completed})")]
    AllocatorInFlight { submitted: u64, completed: u64 },

    #[error("command context is {actual:?}, expected {expected:?}")]
    InvalidContextState {
        expected: ContextState,
        actual: ContextState,
    },

    #[error("redundant transition: {resource:?} is already in state {state:?}")]
    RedundantTransition {
        resource: ResourceId,
        state: ResourceState,
    },

    #[error("{0:?} is not tracked")]
    UntrackedResource(ResourceId),

    #[error("{resource:?} is in state {actual:?}, expected {expected:?}")]
    StateMismatch {
        resource: ResourceId,
        expected: ResourceState,
        actual: ResourceState,
    },

    #[error("{resource:?} released while the GPU may still use it (signaled {signaled}, completed {completed})")]
    ResourceInUse {
        resource: ResourceId,
        signaled: u64,
        completed: u64,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid model import: {0}")]
    InvalidImport(String),

    #[error("no render item named `{0}`")]
    UnknownRenderItem(String),

    #[error("mesh {0} has no bottom-level acceleration structure")]
    MissingAccelerationStructure(usize),

    #[error("renderer has been shut down")]
    ShutDown,
}

impl GraphicsError {
    /// Whether this error indicates a misuse of the barrier or submission
    /// protocol rather than a device or content failure.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            GraphicsError::AllocatorInFlight { .. }
                | GraphicsError::InvalidContextState { .. }
                | GraphicsError::RedundantTransition { .. }
                | GraphicsError::UntrackedResource(_)
                | GraphicsError::StateMismatch { .. }
                | GraphicsError::ResourceInUse { .. }
        )
    }
}

/// Result type for frame core operations.
pub type GraphicsResult<T> = Result<T, GraphicsError>;

/// Wraps a device call returning `Result<T, DeviceStatus>`, converting a
/// failure into [`GraphicsError::DeviceFault`] carrying the call text and
/// source location.
///
/// ```ignore
/// let buffer = device_call!(backend.create_buffer(&desc))?;
/// ```
#[macro_export]
macro_rules! device_call {
    ($call:expr) => {
        ($call).map_err(|status: $crate::error::DeviceStatus| {
            $crate::error::GraphicsError::DeviceFault {
                call: stringify!($call).to_string(),
                file: file!(),
                line: line!(),
                status,
            }
        })
    };
}

/// Presents a fatal error and terminates the process.
pub fn report_fatal(err: &GraphicsError) -> ! {
    log::error!("fatal graphics error: {err}");
    eprintln!("fatal graphics error: {err}");
    std::process::exit(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failing_call() -> Result<u32, DeviceStatus> {
        Err(DeviceStatus::DeviceRemoved)
    }

    #[test]
    fn test_device_call_captures_context() {
        let err = device_call!(failing_call()).unwrap_err();
        match err {
            GraphicsError::DeviceFault {
                call,
                file,
                line,
                status,
            } => {
                assert_eq!(call, "failing_call()");
                assert!(file.ends_with("error.rs"));
                assert!(line > 0);
                assert_eq!(status, DeviceStatus::DeviceRemoved);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_device_call_passes_success_through() {
        let value: Result<u32, DeviceStatus> = Ok(7);
        assert_eq!(device_call!(value).unwrap(), 7);
    }

    #[test]
    fn test_error_display() {
        let err = GraphicsError::DeviceFault {
            call: "device.signal(3)".to_string(),
            file: "src/sync.rs",
            line: 42,
            status: DeviceStatus::DeviceHung,
        };
        let text = err.to_string();
        assert!(text.contains("device.signal(3)"));
        assert!(text.contains("src/sync.rs line 42"));
        assert!(text.contains("0x887A0006"));

        let err = GraphicsError::CapacityExceeded {
            what: "render item",
            capacity: 512,
        };
        assert_eq!(err.to_string(), "render item capacity of 512 exceeded");
    }

    #[test]
    fn test_device_lost_classification() {
        assert!(DeviceStatus::DeviceRemoved.is_device_lost());
        assert!(DeviceStatus::DeviceHung.is_device_lost());
        assert!(!DeviceStatus::OutOfMemory.is_device_lost());
    }

    #[test]
    fn test_protocol_violation_classification() {
        let err = GraphicsError::AllocatorInFlight {
            submitted: 3,
            completed: 2,
        };
        assert!(err.is_protocol_violation());
        assert!(!GraphicsError::ShaderNotFound("x".into()).is_protocol_violation());
    }
}
