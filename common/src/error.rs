use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },
    #[error("bad frame magic {found:02x?}")]
    BadMagic { found: [u8; 2] },
    #[error("frame declares {declared} bytes but only {available} are available")]
    LengthMismatch { declared: usize, available: usize },
    #[error("checksum mismatch: calculated {calculated:#06x}, received {received:#06x}")]
    Checksum { calculated: u16, received: u16 },
}

/// Faults raised at the edges where hardware is touched. None of these are
/// fatal; callers log them and try again on their next cycle.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("timed out after {waited_ms} ms waiting for {what}")]
    Timeout { what: &'static str, waited_ms: u64 },
    #[error("bus busy for {waited_ms} ms")]
    BusBusy { waited_ms: u64 },
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("bus error: {0}")]
    Bus(String),
}

impl SensorError {
    /// Anything that is not a missing device is expected to clear up by itself.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_errors_convert_into_transient_sensor_errors() {
        let err: SensorError = FrameError::Checksum {
            calculated: 0x0102,
            received: 0x0201,
        }
        .into();

        assert!(err.is_transient());
        assert_eq!(
            err.to_string(),
            "checksum mismatch: calculated 0x0102, received 0x0201"
        );
    }

    #[test]
    fn missing_device_is_not_transient() {
        assert!(!SensorError::NotFound("BME280").is_transient());
    }
}
