//! HFP feature bitmasks (`AT+BRSF`), per HFP 1.6/1.7 §4.34.

/// Bit set by a Hands-Free device that supports codec negotiation (`AT+BAC`/`+BCS`).
pub const HF_FEAT_CODEC: u32 = 0x200;

/// Bit set by an Audio Gateway that supports codec negotiation (`AT+BAC`/`+BCS`).
pub const AG_FEAT_CODEC: u32 = 0x200;

/// Whether a feature bitmask advertises codec negotiation support.
pub fn supports_codec_negotiation(features: u32) -> bool {
    features & HF_FEAT_CODEC != 0
}
