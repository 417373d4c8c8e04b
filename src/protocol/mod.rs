//! The AT wire format: frame model, HFP feature bitmasks, indicator vocabulary and codec ids.

pub mod codec;
pub mod features;
pub mod frame;
pub mod indicators;

pub use codec::Codec;
pub use frame::{AtFrame, AtType, parse_at};
pub use indicators::{IndicatorKind, IndicatorMap};
