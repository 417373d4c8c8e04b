//! The shared records this engine writes and the audio-serving side reads (C7).
//!
//! Both [`Transport`] and [`Device`] are expected to outlive a single engine session; they are
//! shared with the audio worker thread via `Arc`, so every field this engine owns is a
//! single-writer atomic. `mic_gain`/`spk_gain` are the one exception: the audio side also
//! writes them (to reflect a hardware volume change) and pokes [`crate::signal::Signal::SetVolume`]
//! on the signalling channel so this engine can emit the matching `+VGM`/`+VGS` unsolicited
//! response.

use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU8, Ordering};

use crate::protocol::{Codec, IndicatorMap};

/// Bitmask of transport properties changed by a single handler invocation, passed to
/// [`PropertySink::notify`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PropertyMask {
    /// The negotiated sample rate changed (codec negotiation completed).
    pub sampling: bool,
    /// The negotiated codec changed.
    pub codec: bool,
    /// Microphone or speaker gain changed.
    pub volume: bool,
    /// Device battery level changed.
    pub battery: bool,
}

impl PropertyMask {
    /// The empty mask.
    pub const NONE: Self = Self { sampling: false, codec: false, volume: false, battery: false };
    /// `SAMPLING | CODEC`, emitted once codec negotiation completes and the SLC reaches
    /// [`crate::slc::HfpState::Connected`].
    pub const SAMPLING_CODEC: Self = Self { sampling: true, codec: true, volume: false, battery: false };
    /// `VOLUME` alone.
    pub const VOLUME: Self = Self { sampling: false, codec: false, volume: true, battery: false };
    /// `BATTERY` alone.
    pub const BATTERY: Self = Self { sampling: false, codec: false, volume: false, battery: true };

    /// Whether no bit is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::NONE
    }
}

impl std::ops::BitOr for PropertyMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self {
            sampling: self.sampling || rhs.sampling,
            codec: self.codec || rhs.codec,
            volume: self.volume || rhs.volume,
            battery: self.battery || rhs.battery,
        }
    }
}

/// External callable notified after this engine updates [`Transport`] or [`Device`] fields.
///
/// Called synchronously from within the event loop; implementations must not block (per the
/// concurrency model, no lock is held across a socket write, and no async suspension point
/// exists here to hand control back to the loop).
pub trait PropertySink: Send + Sync {
    /// Notify the sink that `changed` properties were updated.
    fn notify(&self, changed: PropertyMask);
}

/// A [`PropertySink`] that does nothing, for engines that have not wired up a real one yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullPropertySink;

impl PropertySink for NullPropertySink {
    fn notify(&self, _changed: PropertyMask) {}
}

/// The shared transport record, updated by this engine and read by the audio-serving side.
#[derive(Debug)]
pub struct Transport {
    codec: AtomicU8,
    mic_gain: AtomicI32,
    spk_gain: AtomicI32,
    hfp_features: AtomicU32,
    hfp_inds: std::sync::Mutex<IndicatorMap>,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            codec: AtomicU8::new(Codec::Cvsd as u8),
            mic_gain: AtomicI32::new(0),
            spk_gain: AtomicI32::new(0),
            hfp_features: AtomicU32::new(0),
            hfp_inds: std::sync::Mutex::new(IndicatorMap::default()),
        }
    }
}

impl Transport {
    /// Current negotiated codec.
    pub fn codec(&self) -> Codec {
        match self.codec.load(Ordering::Acquire) {
            v if v == Codec::Msbc as u8 => Codec::Msbc,
            _ => Codec::Cvsd,
        }
    }

    /// Sets the negotiated codec. Single-writer: this engine only.
    pub fn set_codec(&self, codec: Codec) {
        self.codec.store(codec as u8, Ordering::Release);
    }

    /// Current microphone gain.
    pub fn mic_gain(&self) -> i32 {
        self.mic_gain.load(Ordering::Acquire)
    }

    /// Sets the microphone gain. Written by this engine (on `AT+VGM=`) or by the audio side
    /// (to request an unsolicited `+VGM=` be sent).
    pub fn set_mic_gain(&self, value: i32) {
        self.mic_gain.store(value, Ordering::Release);
    }

    /// Current speaker gain.
    pub fn spk_gain(&self) -> i32 {
        self.spk_gain.load(Ordering::Acquire)
    }

    /// Sets the speaker gain. Written by this engine (on `AT+VGS=`) or by the audio side.
    pub fn set_spk_gain(&self, value: i32) {
        self.spk_gain.store(value, Ordering::Release);
    }

    /// Peer's advertised feature bitmask (HF features if we are AG, AG features if we are HF).
    pub fn hfp_features(&self) -> u32 {
        self.hfp_features.load(Ordering::Acquire)
    }

    /// Sets the peer's advertised feature bitmask. Single-writer: this engine only.
    pub fn set_hfp_features(&self, value: u32) {
        self.hfp_features.store(value, Ordering::Release);
    }

    /// Runs `f` against the session's indicator map. Single-writer: this engine only.
    pub fn with_indicators<R>(&self, f: impl FnOnce(&mut IndicatorMap) -> R) -> R {
        f(&mut self.hfp_inds.lock().expect("hfp_inds mutex poisoned"))
    }
}

/// Apple accessory descriptors reported by `AT+XAPL=`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Xapl {
    /// USB vendor id.
    pub vendor: u32,
    /// USB product id.
    pub product: u32,
    /// Accessory software version.
    pub version: u32,
    /// Accessory feature bitmask.
    pub features: u32,
    /// Dock state reported by `AT+IPHONEACCEV=` key `2`.
    pub accev_docked: bool,
}

/// The device record, shared sibling of [`Transport`]. This engine writes `battery_level` and
/// the Apple accessory descriptors only.
#[derive(Debug, Default)]
pub struct Device {
    battery_level: AtomicU32,
    xapl: std::sync::Mutex<Xapl>,
}

impl Device {
    /// Current battery level, 0-100.
    pub fn battery_level(&self) -> u32 {
        self.battery_level.load(Ordering::Acquire)
    }

    /// Sets the battery level. Single-writer: this engine only.
    pub fn set_battery_level(&self, value: u32) {
        self.battery_level.store(value, Ordering::Release);
    }

    /// Current Apple accessory descriptors.
    pub fn xapl(&self) -> Xapl {
        *self.xapl.lock().expect("xapl mutex poisoned")
    }

    /// Updates the Apple accessory descriptors from a successful `AT+XAPL=` parse.
    pub fn set_xapl_ids(&self, vendor: u32, product: u32, version: u32, features: u32) {
        let mut xapl = self.xapl.lock().expect("xapl mutex poisoned");
        xapl.vendor = vendor;
        xapl.product = product;
        xapl.version = version;
        xapl.features = features;
    }

    /// Updates the dock state reported by `AT+IPHONEACCEV=` key `2`.
    pub fn set_accev_docked(&self, docked: bool) {
        self.xapl.lock().expect("xapl mutex poisoned").accev_docked = docked;
    }
}
