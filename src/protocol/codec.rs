//! Voice codec identifiers used by `AT+BAC`/`+BCS` codec negotiation.

use num_derive::{FromPrimitive, ToPrimitive};

/// A negotiated or offered SCO voice codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum Codec {
    /// Narrowband, mandatory for every HFP implementation.
    Cvsd = 1,
    /// Wideband, advertised only when compiled in and negotiated via `AT+BAC`.
    Msbc = 2,
}

impl Default for Codec {
    fn default() -> Self {
        Self::Cvsd
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Cvsd => write!(f, "CVSD"),
            Self::Msbc => write!(f, "mSBC"),
        }
    }
}
