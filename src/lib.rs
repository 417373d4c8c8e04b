#![cfg_attr(docsrs, feature(doc_cfg))]

//! # HFP RFCOMM control-channel engine
//!
//! Drives the AT-command dialogue that establishes a Bluetooth Hands-Free Profile (HFP)
//! Service Level Connection (SLC), negotiates a voice codec (CVSD or mSBC), tracks indicator
//! state (call, signal, battery, …) and reacts to runtime events such as volume changes and
//! codec switches.
//!
//! The engine speaks AT commands over an [RFCOMM](rfcomm) byte stream, per HFP 1.6/1.7. It
//! implements both Hands-Free (HF) and Audio-Gateway (AG) roles, sharing one state machine
//! ([slc::HfpState]).
//!
//! ## What this crate does not do
//! It does not implement a generic AT grammar (see [protocol::frame] for the minimal frame
//! model used here), does not stream SCO audio, and does not talk to D-Bus. Those concerns
//! are external collaborators referenced only through the [transport::PropertySink] contract
//! and the generic stream types this crate is built on.
//!
//! ## Layout
//! * [protocol] — the AT frame model, HFP feature bitmasks, indicator vocabulary, codec ids.
//! * [transport] — the shared record this engine writes and the audio-serving side reads.
//! * [dispatch] — the static `(type, command) -> handler` registry.
//! * [handlers] — per-command handler implementations.
//! * [slc] — the role-parameterized SLC state machine.
//! * [engine] — the event loop multiplexing the RFCOMM stream, the signalling channel and an
//!   optional external AT-handler stream.
//! * [rfcomm] — RFCOMM socket bindings (Tokio-flavored, backed by raw BlueZ socket calls).
//! * [config] — engine configuration (feature bitmasks, retry/timeout tunables).
//!
//! [AsyncRead]: tokio::io::AsyncRead
//! [AsyncWrite]: tokio::io::AsyncWrite

#![warn(missing_docs)]

#[cfg(not(target_os = "linux"))]
compile_error!("this crate only supports the Linux operating system.");

use std::{
    fmt::{self, Debug, Display, Formatter},
    ops::{Deref, DerefMut},
    str::FromStr,
};

#[macro_use]
mod sock;
mod sys;

pub mod config;
mod conn;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod protocol;
pub mod rfcomm;
pub mod signal;
pub mod slc;
pub mod transport;

pub use conn::{Conn, Role};
pub use error::{Error, ErrorKind, Result};

/// Bluetooth device address.
///
/// The serialized representation is a string in colon-hexadecimal notation.
#[derive(Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Address(pub [u8; 6]);

impl Address {
    /// Creates a new Bluetooth address with the specified value.
    pub const fn new(addr: [u8; 6]) -> Self {
        Self(addr)
    }

    /// Any Bluetooth address.
    ///
    /// Corresponds to `00:00:00:00:00:00`.
    pub const fn any() -> Self {
        Self([0; 6])
    }
}

impl Deref for Address {
    type Target = [u8; 6];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Address {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl Debug for Address {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl From<sys::bdaddr_t> for Address {
    fn from(mut addr: sys::bdaddr_t) -> Self {
        addr.b.reverse();
        Self(addr.b)
    }
}

impl From<Address> for sys::bdaddr_t {
    fn from(mut addr: Address) -> Self {
        addr.0.reverse();
        sys::bdaddr_t { b: addr.0 }
    }
}

/// Invalid Bluetooth address error.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InvalidAddress(pub String);

impl fmt::Display for InvalidAddress {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "invalid Bluetooth address: {}", &self.0)
    }
}

impl std::error::Error for InvalidAddress {}

impl FromStr for Address {
    type Err = InvalidAddress;
    fn from_str(s: &str) -> std::result::Result<Self, InvalidAddress> {
        let fields = s
            .split(':')
            .map(|s| u8::from_str_radix(s, 16).map_err(|_| InvalidAddress(s.to_string())))
            .collect::<std::result::Result<Vec<_>, InvalidAddress>>()?;
        Ok(Self(fields.try_into().map_err(|_| InvalidAddress(s.to_string()))?))
    }
}

impl From<[u8; 6]> for Address {
    fn from(addr: [u8; 6]) -> Self {
        Self(addr)
    }
}

impl From<Address> for [u8; 6] {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_string().serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}
