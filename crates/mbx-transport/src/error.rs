#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("modbus exception response: {0}")]
    Modbus(String),

    #[error("serial port {tty} already open at {existing} baud, cannot reopen at {requested}")]
    SerialRateMismatch {
        tty: String,
        existing: u32,
        requested: u32,
    },

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,
}
