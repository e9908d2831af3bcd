use mbx_register::RegisterError;
use mbx_transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Register(#[from] RegisterError),
    #[error("no writable register at path {0:?}")]
    NotFound(String),
    #[error("device must be reinitialized before it can be used")]
    ReinitRequired,
    #[error("device is disabled; no client connection is held")]
    Disabled,
}
