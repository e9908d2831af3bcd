//! The [`Coding`] enum: one variant per register wire encoding.
//!
//! Word/byte order follows the `struct` format strings in
//! `register.py`'s subclasses: `Reg_s32b`/`Reg_u32b`/`Reg_f32b` etc.
//! use `>` (big-endian, high word first); the `*l` variants use `<`
//! (little-endian, low word first).

/// Text decoding charset, matching `Reg_text`'s `encoding` parameter
/// (`ascii` by default, `utf-8` used by a few vendor drivers such as
/// `ev_charger.py`'s `/CustomName`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Ascii,
    Utf8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Coding {
    S16,
    U16,
    S32B,
    U32B,
    S64B,
    U64B,
    S32L,
    U32L,
    S64L,
    U64L,
    F32B,
    F32L,
    /// Fixed-length ASCII/UTF-8 text, `words` 16-bit registers wide.
    /// `little` reorders word significance the same way the numeric
    /// little-endian codings do; NUL bytes are trimmed from the end on
    /// decode and used to pad on encode, matching `Reg_text`.
    Text {
        words: u16,
        little: bool,
        encoding: TextEncoding,
    },
    /// Closed enum: decode yields the raw integer, the caller maps it
    /// to a named variant. Kept generic here (the concrete enum lives
    /// at the driver layer) rather than re-deriving a Rust enum per
    /// register, matching `Reg_e16`'s runtime enum-class parameter.
    Enum16,
    /// Table lookup from the raw 16-bit word to an output code,
    /// grounded on `Reg_mapu16`/`Reg_map`.
    Map16 { table: Vec<(u16, i64)> },
    /// Packed bit-fields, MSB-first, grounded on `Reg_packed`.
    Packed { bits: u8, items: u8 },
}

impl Coding {
    /// Number of consecutive 16-bit registers this coding occupies.
    pub fn word_count(&self) -> u16 {
        match self {
            Coding::S16 | Coding::U16 | Coding::Enum16 | Coding::Map16 { .. } => 1,
            Coding::S32B | Coding::U32B | Coding::S32L | Coding::U32L | Coding::F32B
            | Coding::F32L => 2,
            Coding::S64B | Coding::U64B | Coding::S64L | Coding::U64L => 4,
            Coding::Text { words, .. } => *words,
            Coding::Packed { bits, items } => {
                let total_bits = *bits as u32 * *items as u32;
                ((total_bits + 15) / 16) as u16
            }
        }
    }

    /// Whether this coding decodes to a floating-point number.
    pub fn is_float(&self) -> bool {
        matches!(self, Coding::F32B | Coding::F32L)
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Coding::Text { .. })
    }

    pub fn is_packed(&self) -> bool {
        matches!(self, Coding::Packed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_counts_match_python_counterparts() {
        assert_eq!(Coding::S16.word_count(), 1);
        assert_eq!(Coding::U32B.word_count(), 2);
        assert_eq!(Coding::S64L.word_count(), 4);
        assert_eq!(
            Coding::Text {
                words: 6,
                little: true,
                encoding: TextEncoding::Ascii
            }
            .word_count(),
            6
        );
    }

    #[test]
    fn packed_rounds_up_to_whole_words() {
        // 4 items of 5 bits = 20 bits -> 2 words.
        assert_eq!(Coding::Packed { bits: 5, items: 4 }.word_count(), 2);
    }
}
