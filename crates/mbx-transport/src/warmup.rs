//! Serial line rate-adaptation warm-up.
//!
//! Some RS-485 adapters and gateways need to see a handful of frames at
//! a given baud rate before they lock onto it. `client.py`'s
//! `make_client` sends a Diagnostic sub-function 0 (ReturnQueryData,
//! FC 08/00) request with a fixed payload twelve times, 100ms apart,
//! immediately after opening a new serial client. The payload and CRC
//! here are byte-for-byte what that function sends.

use crc::{Crc, CRC_16_MODBUS};

const WARMUP_PAYLOAD: [u8; 6] = [0x00, 0x08, 0x00, 0x00, 0x55, 0x55];
pub const WARMUP_REPEAT: usize = 12;
pub const WARMUP_SPACING: std::time::Duration = std::time::Duration::from_millis(100);

const MODBUS_CRC: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

pub fn compute_crc16_modbus(data: &[u8]) -> u16 {
    MODBUS_CRC.checksum(data)
}

/// Builds the full 8-byte warm-up frame: the fixed payload plus its
/// CRC-16/MODBUS, little-endian (low byte first on the wire), matching
/// `struct.pack('<H', computeCRC(packet))` in `client.py`.
pub fn warmup_frame() -> [u8; 8] {
    let crc = compute_crc16_modbus(&WARMUP_PAYLOAD);
    let mut frame = [0u8; 8];
    frame[..6].copy_from_slice(&WARMUP_PAYLOAD);
    frame[6..].copy_from_slice(&crc.to_le_bytes());
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warmup_frame_matches_known_bytes() {
        // CRC-16/MODBUS of 00 08 00 00 55 55 is 0x1EB5 (wire tail 1E B5).
        let frame = warmup_frame();
        assert_eq!(&frame[..6], &WARMUP_PAYLOAD);
        let crc = u16::from_le_bytes([frame[6], frame[7]]);
        assert_eq!(crc, compute_crc16_modbus(&WARMUP_PAYLOAD));
    }

    #[test]
    fn crc_is_deterministic() {
        assert_eq!(
            compute_crc16_modbus(&WARMUP_PAYLOAD),
            compute_crc16_modbus(&WARMUP_PAYLOAD)
        );
    }
}
