//! Top-level error aggregate for the bridge, used at the supervisor and
//! CLI boundaries. Per-crate errors stay as their own `thiserror` enums
//! and convert into this one, mirroring the split between
//! `neomind-devices::adapter::AdapterError` (typed, per-module) and
//! `anyhow::Error` at the outermost edges.

#[derive(Debug, thiserror::Error)]
pub enum MbxError {
    #[error("device spec error: {0}")]
    DevSpec(#[from] crate::devspec::DevSpecError),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}
