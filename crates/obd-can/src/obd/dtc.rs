//! Trouble-code codec for mode 03 responses
//!
//! NOTE: the layout here is a flat 14-bit suffix (low 6 bits of the first
//! byte plus the whole second byte) under a 2-bit category. ISO 15031-6
//! splits those bits into separate digit groups, so codes from a real
//! vehicle will not match the standard rendering.

use obd_core::{DtcCategory, TroubleCode};

use super::{mode, ACK_OFFSET};

/// Decode one encoded byte pair; the all-zero pair means "no code"
pub fn decode_pair(b1: u8, b2: u8) -> Option<TroubleCode> {
    if b1 == 0 && b2 == 0 {
        return None;
    }

    let category = DtcCategory::from_high_byte(b1);
    let code = ((b1 as u16 & 0x3F) << 8) | b2 as u16;
    Some(TroubleCode::new(category, code))
}

/// Encode a trouble code back into its byte pair
pub fn encode_trouble_code(code: &TroubleCode) -> [u8; 2] {
    let suffix = code.code();
    [
        (code.category().bits() << 6) | ((suffix >> 8) as u8 & 0x3F),
        (suffix & 0xFF) as u8,
    ]
}

/// Extract trouble codes from a mode 03 response frame payload.
///
/// `data[0]` is the declared length and `data[1]` the ack byte. Returns an
/// empty list for anything that is not a well-formed mode 03 answer.
pub fn decode_mode3_response(data: &[u8]) -> Vec<TroubleCode> {
    if data.len() < 2 {
        return Vec::new();
    }

    let declared = data[0] as usize;
    if declared < 2 || data[1] != mode::STORED_DTCS | ACK_OFFSET {
        return Vec::new();
    }

    let mut codes = Vec::new();
    let mut i = 2;
    while i < declared && i + 1 < data.len() {
        if let Some(code) = decode_pair(data[i], data[i + 1]) {
            codes.push(code);
        }
        i += 2;
    }
    codes
}
