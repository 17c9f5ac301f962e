//! Error types for Gati

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Gati error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A hardware component could not be opened
    #[error("Hardware init failed for {component}: {reason}")]
    HardwareInit {
        /// Component name (e.g. "ultrasonic", "camera")
        component: String,
        /// Underlying failure
        reason: String,
    },

    /// Per-sample sensor failure
    #[error("Sensor error: {0}")]
    Sensor(#[from] SensorError),

    /// External command failed validation
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Routine stopped part-way through
    #[error("Routine '{routine}' aborted at step {step}: {reason}")]
    RoutineAborted {
        /// Routine name
        routine: String,
        /// 1-based index of the failing step
        step: usize,
        /// Underlying failure
        reason: String,
    },

    /// Orchestrator fault; cleared only by `clear_fault()`
    #[error("Fault: {0}")]
    Fault(String),

    /// Actuator rejected or failed a command
    #[error("Actuator error: {0}")]
    Actuator(String),

    /// Motion is latched off by a stop request
    #[error("Motion halted")]
    Halted,

    /// Control loop already started
    #[error("Control loop already running")]
    AlreadyRunning,

    /// Control loop is not accepting commands
    #[error("Control loop not running")]
    NotRunning,

    /// Transport used before it was connected
    #[error("Device not initialized")]
    NotInitialized,

    /// Serial port error
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Wire or catalog serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub fn hardware_init(component: impl Into<String>, reason: impl ToString) -> Self {
        Error::HardwareInit {
            component: component.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Non-fatal, per-sample sensor failures.
///
/// These are absorbed by the smoothing window and counted in health;
/// they never stop the control loop.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SensorError {
    #[error("read timed out")]
    Timeout,

    #[error("reading {0} outside physical range")]
    OutOfRange(f32),

    #[error("sensor unavailable")]
    Unavailable,

    #[error("read failed: {0}")]
    Read(String),

    #[error("no data")]
    NoData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routine_aborted_message() {
        let e = Error::RoutineAborted {
            routine: "patrol".into(),
            step: 3,
            reason: "servo stalled".into(),
        };
        assert_eq!(
            e.to_string(),
            "Routine 'patrol' aborted at step 3: servo stalled"
        );
    }

    #[test]
    fn test_toml_error_maps_to_config() {
        let err = toml::from_str::<toml::Value>("a = ").unwrap_err();
        assert!(matches!(Error::from(err), Error::Config(_)));
    }

    #[test]
    fn test_sensor_error_wraps() {
        let e: Error = SensorError::Unavailable.into();
        assert!(matches!(e, Error::Sensor(SensorError::Unavailable)));
    }
}
