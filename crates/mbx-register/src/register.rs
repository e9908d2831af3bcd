//! [`Register`]: a single addressable span of Modbus words, its coding,
//! access kind, write policy, and last-known decoded value.
//!
//! Grounded on `register.py`'s `Reg` base class: `isvalid`/`update`
//! (returns whether the value changed, so the caller can fire an
//! onchange action exactly once per transition — REDESIGN FLAGS
//! replaces the Python callback attribute with an explicit return
//! value) and `decode`/`encode`.

use crate::coding::{Coding, TextEncoding};
use crate::format::format_value;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    /// Function code 4, read input registers.
    Input,
    /// Function code 3 (read) / 6 or 16 (write), read/write holding registers.
    Holding,
}

/// What writes are permitted on this register. Grounded on the several
/// shapes `write=` takes across `register.py`'s drivers: `write=True`
/// (unrestricted), `write=(lo,hi)` (range-checked, e.g. `/PhaseConfig`
/// `write=(0,4)`), or the default `write=False`.
#[derive(Debug, Clone, PartialEq)]
pub enum WritePolicy {
    ReadOnly,
    Writable,
    WritableRange(i64, i64),
}

impl WritePolicy {
    pub fn allows(&self, raw: i64) -> bool {
        match self {
            WritePolicy::ReadOnly => false,
            WritePolicy::Writable => true,
            WritePolicy::WritableRange(lo, hi) => raw >= *lo && raw <= *hi,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegisterValue {
    Int(i64),
    Float(f64),
    Text(String),
    Bits(Vec<u32>),
}

impl RegisterValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RegisterValue::Int(v) => Some(*v),
            RegisterValue::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RegisterValue::Int(v) => Some(*v as f64),
            RegisterValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegisterError {
    #[error("expected {expected} words, got {got}")]
    WrongWordCount { expected: u16, got: usize },
    #[error("raw value {0} is in the invalid-sentinel set")]
    InvalidSentinel(i64),
    #[error("text is not valid {0:?}")]
    InvalidText(TextEncoding),
    #[error("value out of encodable range")]
    OutOfRange,
    #[error("write not permitted by this register's write policy")]
    NotWritable,
    #[error("unmapped raw value {0} for table-coded register")]
    Unmapped(u16),
}

/// A single register: address, coding, formatting, and write policy.
/// Holds the last successfully decoded value so callers can detect
/// changes across polls (see [`Register::update`]).
#[derive(Debug, Clone)]
pub struct Register {
    pub base: u16,
    pub path: String,
    pub coding: Coding,
    pub access: AccessKind,
    pub scale: f64,
    pub text_fmt: Option<String>,
    pub write: WritePolicy,
    pub max_age: Option<Duration>,
    /// Raw integer sentinels that mark the register as currently
    /// invalid/unavailable, checked against the raw (pre-scale) value.
    pub invalid: Vec<i64>,
    last: Option<RegisterValue>,
    last_read: Option<Instant>,
}

impl Register {
    pub fn new(base: u16, path: impl Into<String>, coding: Coding, access: AccessKind) -> Self {
        Self {
            base,
            path: path.into(),
            coding,
            access,
            scale: 1.0,
            text_fmt: None,
            write: WritePolicy::ReadOnly,
            max_age: None,
            invalid: Vec::new(),
            last: None,
            last_read: None,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_format(mut self, fmt: impl Into<String>) -> Self {
        self.text_fmt = Some(fmt.into());
        self
    }

    pub fn writable(mut self) -> Self {
        self.write = WritePolicy::Writable;
        self
    }

    pub fn writable_range(mut self, lo: i64, hi: i64) -> Self {
        self.write = WritePolicy::WritableRange(lo, hi);
        self
    }

    pub fn with_invalid(mut self, invalid: Vec<i64>) -> Self {
        self.invalid = invalid;
        self
    }

    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    pub fn word_count(&self) -> u16 {
        self.coding.word_count()
    }

    /// Whether this register's cached value is older than its
    /// `max_age` and due for another read. A register with no
    /// `max_age` set, or never yet read, is always due.
    pub fn is_due(&self, now: Instant) -> bool {
        match (self.max_age, self.last_read) {
            (Some(max_age), Some(last_read)) => now.duration_since(last_read) >= max_age,
            _ => true,
        }
    }

    /// Records that this register was just read, starting its
    /// `max_age` clock over.
    pub fn mark_read(&mut self, now: Instant) {
        self.last_read = Some(now);
    }

    /// Current cached value, if any decode has succeeded so far.
    pub fn value(&self) -> Option<&RegisterValue> {
        self.last.as_ref()
    }

    /// Renders the current value through `text_fmt`, if set, else the
    /// plain `Display` form. Matches `Reg.__str__`'s printf/dict/
    /// callable dispatch, restricted to the printf case (the only one
    /// any kept vendor driver actually uses).
    pub fn format(&self) -> Option<String> {
        let v = self.last.as_ref()?;
        Some(match &self.text_fmt {
            Some(fmt) => format_value(fmt, v),
            None => match v {
                RegisterValue::Int(i) => i.to_string(),
                RegisterValue::Float(f) => f.to_string(),
                RegisterValue::Text(s) => s.clone(),
                RegisterValue::Bits(b) => format!("{b:?}"),
            },
        })
    }

    /// Decodes a raw word span into a [`RegisterValue`], without
    /// touching the cached `last` value. Invalid-sentinel and table
    /// lookups are checked against the raw integer, pre-scale, matching
    /// `Reg_num.decode`'s `if v[0] in self.invalid: return None`.
    pub fn decode(&self, words: &[u16]) -> Result<RegisterValue, RegisterError> {
        let expected = self.word_count();
        if words.len() != expected as usize {
            return Err(RegisterError::WrongWordCount {
                expected,
                got: words.len(),
            });
        }

        match &self.coding {
            Coding::Text {
                little, encoding, ..
            } => self.decode_text(words, *little, *encoding),
            Coding::Packed { bits, items } => {
                let bits_vec = decode_packed(words, *bits, *items);
                Ok(RegisterValue::Bits(bits_vec))
            }
            Coding::Map16 { table } => {
                let raw = words[0];
                table
                    .iter()
                    .find(|(k, _)| *k == raw)
                    .map(|(_, v)| RegisterValue::Int(*v))
                    .ok_or(RegisterError::Unmapped(raw))
            }
            _ => self.decode_numeric(words),
        }
    }

    fn decode_numeric(&self, words: &[u16]) -> Result<RegisterValue, RegisterError> {
        let (little, signed, bits, is_float) = match self.coding {
            Coding::S16 => (false, true, 16, false),
            Coding::U16 | Coding::Enum16 => (false, false, 16, false),
            Coding::S32B => (false, true, 32, false),
            Coding::U32B => (false, false, 32, false),
            Coding::S64B => (false, true, 64, false),
            Coding::U64B => (false, false, 64, false),
            Coding::S32L => (true, true, 32, false),
            Coding::U32L => (true, false, 32, false),
            Coding::S64L => (true, true, 64, false),
            Coding::U64L => (true, false, 64, false),
            Coding::F32B => (false, false, 32, true),
            Coding::F32L => (true, false, 32, true),
            Coding::Text { .. } | Coding::Packed { .. } | Coding::Map16 { .. } => unreachable!(),
        };

        let raw_bits = words_to_uint(words, little);

        if is_float {
            let f = f32::from_bits(raw_bits as u32) as f64;
            return Ok(RegisterValue::Float(f * self.scale));
        }

        let raw_signed: i64 = if signed {
            sign_extend(raw_bits, bits)
        } else {
            raw_bits as i64
        };

        if self.invalid.contains(&raw_signed) {
            return Err(RegisterError::InvalidSentinel(raw_signed));
        }

        if (self.scale - 1.0).abs() < f64::EPSILON {
            Ok(RegisterValue::Int(raw_signed))
        } else {
            Ok(RegisterValue::Float(raw_signed as f64 / self.scale))
        }
    }

    fn decode_text(
        &self,
        words: &[u16],
        little: bool,
        encoding: TextEncoding,
    ) -> Result<RegisterValue, RegisterError> {
        let mut bytes = Vec::with_capacity(words.len() * 2);
        for &w in words {
            let [hi, lo] = w.to_be_bytes();
            if little {
                bytes.push(lo);
                bytes.push(hi);
            } else {
                bytes.push(hi);
                bytes.push(lo);
            }
        }
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        let s = match encoding {
            TextEncoding::Ascii => {
                if bytes.iter().any(|b| *b > 0x7f) {
                    return Err(RegisterError::InvalidText(encoding));
                }
                bytes.iter().map(|&b| b as char).collect()
            }
            TextEncoding::Utf8 => {
                String::from_utf8(bytes).map_err(|_| RegisterError::InvalidText(encoding))?
            }
        };
        Ok(RegisterValue::Text(s))
    }

    /// Encodes a value back to a raw word span for a write, enforcing
    /// [`WritePolicy`]. Grounded on `Reg_num.encode` / the `write=`
    /// range-check logic applied before issuing function code 6/16.
    pub fn encode(&self, value: &RegisterValue) -> Result<Vec<u16>, RegisterError> {
        match &self.coding {
            Coding::Text {
                words,
                little,
                encoding: _,
            } => self.encode_text(value, *words, *little),
            _ => self.encode_numeric(value),
        }
    }

    fn encode_numeric(&self, value: &RegisterValue) -> Result<Vec<u16>, RegisterError> {
        let (little, bits, is_float) = match self.coding {
            Coding::S16 | Coding::U16 | Coding::Enum16 => (false, 16, false),
            Coding::S32B | Coding::U32B => (false, 32, false),
            Coding::S64B | Coding::U64B => (false, 64, false),
            Coding::S32L | Coding::U32L => (true, 32, false),
            Coding::S64L | Coding::U64L => (true, 64, false),
            Coding::F32B => (false, 32, true),
            Coding::F32L => (true, 32, true),
            Coding::Text { .. } | Coding::Packed { .. } | Coding::Map16 { .. } => unreachable!(),
        };

        let raw: i64 = if is_float {
            let f = value.as_f64().ok_or(RegisterError::OutOfRange)? / self.scale;
            return Ok(uint_to_words((f as f32).to_bits() as u64, 32, little));
        } else {
            let scaled = value.as_f64().ok_or(RegisterError::OutOfRange)?;
            (scaled * self.scale).round() as i64
        };

        if !self.write.allows(raw) {
            return Err(RegisterError::NotWritable);
        }

        Ok(uint_to_words(raw as u64, bits, little))
    }

    fn encode_text(
        &self,
        value: &RegisterValue,
        words: u16,
        little: bool,
    ) -> Result<Vec<u16>, RegisterError> {
        let RegisterValue::Text(s) = value else {
            return Err(RegisterError::OutOfRange);
        };
        if !self.write.allows(0) {
            return Err(RegisterError::NotWritable);
        }
        let mut bytes = s.as_bytes().to_vec();
        let total = words as usize * 2;
        if bytes.len() > total {
            return Err(RegisterError::OutOfRange);
        }
        bytes.resize(total, 0);
        let mut out = Vec::with_capacity(words as usize);
        for chunk in bytes.chunks(2) {
            let (hi, lo) = if little {
                (chunk[1], chunk[0])
            } else {
                (chunk[0], chunk[1])
            };
            out.push(u16::from_be_bytes([hi, lo]));
        }
        Ok(out)
    }

    /// Updates the cached value, returning `true` iff it changed from
    /// the previous decode — including the uninitialized-to-first-value
    /// transition. Matches `Reg.update`'s `changed` return, which the
    /// caller uses to fire `onchange` exactly once per transition.
    pub fn update(&mut self, new: RegisterValue) -> bool {
        let changed = self.last.as_ref() != Some(&new);
        self.last = Some(new);
        changed
    }

    /// Clears the cached value (decode failure / invalid sentinel),
    /// returning whether this is itself a change (i.e. it had a value
    /// before). Matches `device.py`'s clearing of a dict entry to
    /// `None` on decode failure.
    pub fn clear(&mut self) -> bool {
        let changed = self.last.is_some();
        self.last = None;
        changed
    }
}

fn words_to_uint(words: &[u16], little: bool) -> u64 {
    let n = words.len();
    let mut acc: u64 = 0;
    for (i, w) in words.iter().enumerate() {
        let shift = if little { i } else { n - 1 - i };
        acc |= (*w as u64) << (16 * shift);
    }
    acc
}

fn uint_to_words(value: u64, bits: u32, little: bool) -> Vec<u16> {
    let n = (bits / 16) as usize;
    let mut out = vec![0u16; n];
    for i in 0..n {
        let shift = if little { i } else { n - 1 - i };
        out[i] = ((value >> (16 * shift)) & 0xffff) as u16;
    }
    out
}

fn sign_extend(raw: u64, bits: u32) -> i64 {
    if bits >= 64 {
        return raw as i64;
    }
    let shift = 64 - bits;
    ((raw << shift) as i64) >> shift
}

/// Extracts `items` MSB-first fields of `bits` width each from the
/// word span, matching `utils.py`'s `getbits`/`Reg_packed.unpack`.
fn decode_packed(words: &[u16], bits: u8, items: u8) -> Vec<u32> {
    let v = words_to_uint(words, false);
    let mask = (1u64 << bits) - 1;
    let mut out = Vec::with_capacity(items as usize);
    for i in 0..items {
        let pos = bits as u32 * (items - 1 - i) as u32;
        out.push(((v >> pos) & mask) as u32);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_u16_with_scale() {
        let reg = Register::new(0x10, "/Ac/Power", Coding::U16, AccessKind::Holding)
            .with_scale(10.0);
        let v = reg.decode(&[2345]).unwrap();
        assert_eq!(v, RegisterValue::Float(234.5));
    }

    #[test]
    fn decodes_s16_negative() {
        let reg = Register::new(0x10, "/x", Coding::S16, AccessKind::Holding);
        let v = reg.decode(&[0xffff]).unwrap();
        assert_eq!(v, RegisterValue::Int(-1));
    }

    #[test]
    fn decodes_u32b_high_word_first() {
        let reg = Register::new(0x10, "/x", Coding::U32B, AccessKind::Holding);
        let v = reg.decode(&[0x0001, 0x0000]).unwrap();
        assert_eq!(v, RegisterValue::Int(0x0001_0000));
    }

    #[test]
    fn decodes_u32l_low_word_first() {
        let reg = Register::new(0x10, "/x", Coding::U32L, AccessKind::Holding);
        let v = reg.decode(&[0x0000, 0x0001]).unwrap();
        assert_eq!(v, RegisterValue::Int(0x0001_0000));
    }

    #[test]
    fn decodes_f32b() {
        let bits = 1.5f32.to_bits();
        let hi = (bits >> 16) as u16;
        let lo = (bits & 0xffff) as u16;
        let reg = Register::new(0x10, "/x", Coding::F32B, AccessKind::Holding);
        let v = reg.decode(&[hi, lo]).unwrap();
        assert_eq!(v, RegisterValue::Float(1.5));
    }

    #[test]
    fn invalid_sentinel_rejected_before_scale() {
        let reg = Register::new(0x10, "/x", Coding::S16, AccessKind::Holding)
            .with_invalid(vec![-1])
            .with_scale(10.0);
        assert!(matches!(
            reg.decode(&[0xffff]),
            Err(RegisterError::InvalidSentinel(-1))
        ));
    }

    #[test]
    fn text_round_trips_with_nul_trim() {
        let reg = Register::new(
            0x10,
            "/Serial",
            Coding::Text {
                words: 4,
                little: false,
                encoding: TextEncoding::Ascii,
            },
            AccessKind::Holding,
        )
        .writable();
        let words = reg.encode(&RegisterValue::Text("AB1".into())).unwrap();
        let decoded = reg.decode(&words).unwrap();
        assert_eq!(decoded, RegisterValue::Text("AB1".into()));
    }

    #[test]
    fn encode_rejects_read_only_register() {
        let reg = Register::new(
            0x10,
            "/Serial",
            Coding::Text {
                words: 4,
                little: false,
                encoding: TextEncoding::Ascii,
            },
            AccessKind::Holding,
        );
        assert!(reg.encode(&RegisterValue::Text("AB1".into())).is_err());
    }

    #[test]
    fn packed_decodes_msb_first() {
        // 4 items of 4 bits each = 16 bits = one word: 0xA B C D -> [A,B,C,D]
        let reg = Register::new(
            0x10,
            "/bits",
            Coding::Packed { bits: 4, items: 4 },
            AccessKind::Holding,
        );
        let v = reg.decode(&[0xABCD]).unwrap();
        assert_eq!(v, RegisterValue::Bits(vec![0xA, 0xB, 0xC, 0xD]));
    }

    #[test]
    fn map16_looks_up_table() {
        let reg = Register::new(
            0x10,
            "/phase",
            Coding::Map16 {
                table: vec![(1, 100), (2, 200)],
            },
            AccessKind::Holding,
        );
        assert_eq!(reg.decode(&[2]).unwrap(), RegisterValue::Int(200));
        assert!(reg.decode(&[9]).is_err());
    }

    #[test]
    fn update_reports_change_exactly_once() {
        let mut reg = Register::new(0x10, "/x", Coding::U16, AccessKind::Holding);
        assert!(reg.update(RegisterValue::Int(5)));
        assert!(!reg.update(RegisterValue::Int(5)));
        assert!(reg.update(RegisterValue::Int(6)));
    }

    #[test]
    fn write_policy_range_enforced() {
        let reg = Register::new(0x10, "/PhaseConfig", Coding::U16, AccessKind::Holding)
            .writable_range(0, 4);
        assert!(reg.encode(&RegisterValue::Int(2)).is_ok());
        assert!(reg.encode(&RegisterValue::Int(5)).is_err());
    }

    #[test]
    fn format_applies_printf_style() {
        let mut reg = Register::new(0x10, "/Ac/Power", Coding::U16, AccessKind::Holding)
            .with_format("%d W");
        reg.update(RegisterValue::Int(230));
        assert_eq!(reg.format().as_deref(), Some("230 W"));
    }
}
