//! Shared value types and boundary traits for the Modbus bridge.
//!
//! `mbx-core` carries the pieces every other crate in the workspace
//! depends on: the [`DeviceSpec`] address value type, the [`Role`]
//! enum, the [`bus::ObjectBus`] trait describing the external
//! publish/subscribe surface the bridge writes decoded values to, and
//! the shared [`error::MbxError`] aggregate plus timing constants used
//! by the supervisor and device framework.

pub mod bus;
pub mod devspec;
pub mod error;
pub mod role;
pub mod timing;

pub use bus::{LocalBus, ObjectBus};
pub use devspec::{DevSpecError, DeviceSpec};
pub use error::MbxError;
pub use role::Role;
