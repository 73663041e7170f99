/// Errors that can occur while sampling sensors or running the estimator.
#[derive(Debug, thiserror::Error)]
pub enum ImuvizError {
    #[error("Sensor read failed: {0}")]
    SensorRead(String),

    #[error("Sensor disconnected")]
    Disconnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to spawn estimator thread: {0}")]
    Spawn(String),
}

impl ImuvizError {
    /// Whether the error means the sensor link is gone and a reconnect
    /// should be attempted before the next read.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ImuvizError::Disconnected => true,
            ImuvizError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotFound
            ),
            _ => false,
        }
    }
}
