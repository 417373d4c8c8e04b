//! Engine configuration: feature bitmasks and SLC retry/timeout tunables (§6).

use std::time::Duration;

/// Configuration consumed by [`crate::engine::run`].
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// `config.hfp.features_rfcomm_ag`: our advertised AG feature bitmask (used when we run
    /// in the AG role).
    pub features_rfcomm_ag: u32,
    /// `config.hfp.features_rfcomm_hf`: our advertised HF feature bitmask (used when we run
    /// in the HF role).
    pub features_rfcomm_hf: u32,
    /// Number of SLC retries before the session fails with `TimedOut` (default 10).
    pub slc_retries: u32,
    /// SLC step timeout in milliseconds before a retry is attempted (default 10000).
    pub slc_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            features_rfcomm_ag: 0,
            features_rfcomm_hf: 0,
            slc_retries: 10,
            slc_timeout_ms: 10_000,
        }
    }
}

impl Config {
    /// The SLC step timeout as a [`Duration`].
    pub fn slc_timeout(&self) -> Duration {
        Duration::from_millis(self.slc_timeout_ms)
    }

    /// Loads configuration from a TOML document, filling in defaults for absent keys.
    #[cfg(feature = "serde")]
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

/// Whether mSBC support is compiled into this build. Combined with the peer's `AT+BAC`
/// advertisement (AG role) or our own config (HF role) to decide `Conn::msbc_available`.
pub const fn msbc_compiled_in() -> bool {
    cfg!(feature = "msbc")
}
