//! The register coding model: how a contiguous span of Modbus words
//! maps to a typed, scaled value.
//!
//! Grounded on `register.py`'s `Reg`/`Reg_num` class hierarchy
//! (`Reg_s16`, `Reg_u16`, `Reg_s32b`, ..., `Reg_text`, `Reg_e16`,
//! `Reg_mapu16`, `Reg_packed`), flattened from a type hierarchy into a
//! single [`Register`] struct carrying a tagged [`Coding`] enum per the
//! spec's composition-over-mixins redesign flag.

mod coding;
mod format;
mod register;

pub use coding::{Coding, TextEncoding};
pub use register::{AccessKind, Register, RegisterError, RegisterValue, WritePolicy};
