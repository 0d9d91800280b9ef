//! Camera error taxonomy and the device-fault classifier.

use rollcall_hw::DeviceFault;
use std::io;
use thiserror::Error;

/// User-facing camera failure categories.
///
/// The `Display` text is the message shown to the operator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera access denied. Please grant this user access to the video device.")]
    PermissionDenied,
    #[error("No camera found. Please connect a camera to your device.")]
    DeviceNotFound,
    #[error("Camera is in use by another application. Please close other apps using the camera.")]
    DeviceBusy,
    #[error("Camera constraints could not be met. Try a different camera.")]
    ConstraintsUnsatisfiable,
    #[error("Camera access blocked for security reasons. Use HTTPS or localhost.")]
    SecurityBlocked,
    #[error("{0}")]
    Unknown(String),
    #[error("Camera not ready.")]
    NotReady,
}

impl CameraError {
    /// Stable category name, for logs and status output.
    pub fn category(&self) -> &'static str {
        match self {
            CameraError::PermissionDenied => "PermissionDenied",
            CameraError::DeviceNotFound => "DeviceNotFound",
            CameraError::DeviceBusy => "DeviceBusy",
            CameraError::ConstraintsUnsatisfiable => "ConstraintsUnsatisfiable",
            CameraError::SecurityBlocked => "SecurityBlocked",
            CameraError::Unknown(_) => "Unknown",
            CameraError::NotReady => "NotReady",
        }
    }

    pub(crate) fn unknown(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            CameraError::Unknown("Unknown camera error. Please check the logs for details.".into())
        } else {
            CameraError::Unknown(message)
        }
    }
}

/// Map a backend fault to its category.
pub fn classify(fault: &DeviceFault) -> CameraError {
    match fault {
        DeviceFault::Io { source, .. } => classify_io(source),
        DeviceFault::NoDevice => CameraError::DeviceNotFound,
        DeviceFault::Overconstrained(_) => CameraError::ConstraintsUnsatisfiable,
        DeviceFault::InsecureContext(_) => CameraError::SecurityBlocked,
        DeviceFault::Other(message) => CameraError::unknown(message.as_str()),
    }
}

fn classify_io(err: &io::Error) -> CameraError {
    match err.raw_os_error() {
        Some(libc::EACCES | libc::EPERM) => CameraError::PermissionDenied,
        Some(libc::ENOENT | libc::ENODEV | libc::ENXIO) => CameraError::DeviceNotFound,
        Some(libc::EBUSY) => CameraError::DeviceBusy,
        Some(_) => CameraError::unknown(err.to_string()),
        None => match err.kind() {
            io::ErrorKind::PermissionDenied => CameraError::PermissionDenied,
            io::ErrorKind::NotFound => CameraError::DeviceNotFound,
            _ => CameraError::unknown(err.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(errno: i32) -> DeviceFault {
        DeviceFault::io("/dev/video0", io::Error::from_raw_os_error(errno))
    }

    #[test]
    fn test_classify_errno() {
        assert_eq!(classify(&os(libc::EACCES)), CameraError::PermissionDenied);
        assert_eq!(classify(&os(libc::EPERM)), CameraError::PermissionDenied);
        assert_eq!(classify(&os(libc::ENOENT)), CameraError::DeviceNotFound);
        assert_eq!(classify(&os(libc::ENODEV)), CameraError::DeviceNotFound);
        assert_eq!(classify(&os(libc::EBUSY)), CameraError::DeviceBusy);
    }

    #[test]
    fn test_classify_unmapped_errno_keeps_message() {
        let fault = os(libc::EIO);
        let CameraError::Unknown(message) = classify(&fault) else {
            panic!("EIO should be Unknown");
        };
        assert!(!message.is_empty());
    }

    #[test]
    fn test_classify_io_kind_without_errno() {
        let fault = DeviceFault::io("/dev/video0", io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(classify(&fault), CameraError::DeviceNotFound);
        let fault = DeviceFault::io("/dev/video0", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(classify(&fault), CameraError::PermissionDenied);
    }

    #[test]
    fn test_classify_structured_faults() {
        assert_eq!(classify(&DeviceFault::NoDevice), CameraError::DeviceNotFound);
        assert_eq!(
            classify(&DeviceFault::Overconstrained("MJPG only".into())),
            CameraError::ConstraintsUnsatisfiable
        );
        assert_eq!(
            classify(&DeviceFault::InsecureContext("http://example.edu".into())),
            CameraError::SecurityBlocked
        );
        assert_eq!(
            classify(&DeviceFault::Other("driver crashed".into())),
            CameraError::Unknown("driver crashed".into())
        );
    }

    #[test]
    fn test_unknown_without_message_gets_fallback_text() {
        let err = classify(&DeviceFault::Other(String::new()));
        assert!(err.to_string().starts_with("Unknown camera error"));
    }

    #[test]
    fn test_category_names() {
        assert_eq!(CameraError::DeviceBusy.category(), "DeviceBusy");
        assert_eq!(CameraError::Unknown("x".into()).category(), "Unknown");
        assert_eq!(CameraError::NotReady.category(), "NotReady");
    }
}
