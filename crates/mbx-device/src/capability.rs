//! Capability traits standing in for the Python drivers' mixin
//! classes. Each vendor driver module mixes in whatever subset of
//! `HasCustomName`/`HasErrorId`/`HasVregLink` it needs rather than
//! inheriting from one monolithic base — the same shape here, but as
//! traits a `DriverSpec` implementor opts into instead of multiple
//! inheritance.

use async_trait::async_trait;
use mbx_transport::ClientHandle;

use crate::error::DeviceError;

/// Devices exposing a user-settable `/CustomName` path, distinct from
/// the vendor-reported product name. Grounded on `device.py`'s
/// `CustomName` mixin.
pub trait HasCustomName {
    fn custom_name_path(&self) -> &'static str {
        "/CustomName"
    }
}

/// Devices exposing a vendor/product error code path alongside their
/// normal data registers. Grounded on the `/ErrorCode` handling common
/// to `carlo_gavazzi.py` and `dse.py`.
pub trait HasErrorId {
    fn error_id_path(&self) -> &'static str {
        "/ErrorCode"
    }

    /// Maps a raw vendor error code to a human description, if known.
    fn describe_error(&self, code: i64) -> Option<&'static str>;
}

/// Devices supporting the VregLink vendor-control channel (function
/// code 23, simultaneous read/write), used for firmware-specific
/// settings outside the normal register map. Grounded on
/// `vreglink.py`.
#[async_trait]
pub trait HasVregLink {
    /// Raw VregLink register id space is vendor-defined; `id` and the
    /// returned/accepted words are opaque beyond this boundary.
    async fn vreglink_get(&self, client: &ClientHandle, id: u16) -> Result<Vec<u16>, DeviceError>;

    async fn vreglink_set(
        &self,
        client: &ClientHandle,
        id: u16,
        data: &[u16],
    ) -> Result<(), DeviceError>;
}
