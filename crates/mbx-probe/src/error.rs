#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("transport error: {0}")]
    Transport(#[from] mbx_transport::TransportError),

    #[error("decode error: {0}")]
    Decode(#[from] mbx_register::RegisterError),

    #[error("probe aborted")]
    Cancelled,
}
