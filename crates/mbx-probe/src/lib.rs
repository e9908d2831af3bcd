//! Device identification: reading a model-identifying register (or a
//! config-driven equivalent) from a freshly-opened client and matching
//! it against a table of known device families.
//!
//! Grounded on `probe.py`'s `ModelRegister`/`probe`/`add_handler` and
//! `generic_modbus_meter.py`'s `MatchWithConfig`.

mod error;
mod model_register;
mod probe_fn;
mod registry;

pub use error::ProbeError;
pub use model_register::{ModelEntry, ModelRegisterProbe};
pub use probe_fn::{probe, ProbeMatch, ProbeOutcome};
pub use registry::ProbeRegistry;

use async_trait::async_trait;
use mbx_core::DeviceSpec;
use mbx_core::devspec::TransportMethod;
use mbx_transport::ClientHandle;

/// Common interface implemented by every way of identifying a device
/// from a freshly-connected client: reading and matching a model
/// register ([`ModelRegisterProbe`]), or a data-driven config match
/// (grounded on `generic_modbus_meter.py`'s `MatchWithConfig`).
#[async_trait]
pub trait ProbeHandler: Send + Sync {
    /// Transport methods this handler applies to.
    fn methods(&self) -> &[TransportMethod];

    /// Candidate Modbus unit ids to try when the spec doesn't name one.
    fn units(&self) -> &[u8];

    /// Candidate serial baud rates, used by the serial scanner's quick
    /// rate-detection phase. Empty for network-only handlers.
    fn rates(&self) -> &[u32] {
        &[]
    }

    /// Attempts to identify the device at `spec` over `client`.
    /// Returns `Ok(None)` on a clean non-match (wrong model id, no
    /// response content to match against) and `Err` only on a
    /// transport-level failure, matching `probe.py`'s silent
    /// first-match-wins loop.
    async fn try_match(
        &self,
        spec: &DeviceSpec,
        client: &ClientHandle,
    ) -> Result<Option<ProbeMatch>, ProbeError>;
}
