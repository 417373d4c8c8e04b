//! The in-process signalling channel (`sig_fd`) multiplexed by the event loop (C6), and the
//! outbound nudge to the SCO sibling.

/// A signal delivered to this engine on the signalling channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// The audio side changed `mic_gain` and/or `spk_gain` on the shared transport and wants
    /// this engine to reconcile them with the peer via unsolicited `+VGM=`/`+VGS=`.
    SetVolume,
}

/// A signal this engine sends to the SCO/audio sibling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoSignal {
    /// The call/call-setup indicator changed; the sibling may need to bring SCO up or down.
    Ping,
}

/// Sending half of the signalling channel, held by whatever drives the audio side.
pub type SignalSender = tokio::sync::mpsc::Sender<Signal>;
/// Receiving half of the signalling channel, held by the event loop.
pub type SignalReceiver = tokio::sync::mpsc::Receiver<Signal>;

/// Creates a bounded signalling channel. A small bound is sufficient: signals are coalesced by
/// nature (another `SetVolume` arriving before the first is processed changes nothing about
/// what the loop will do when it wakes).
pub fn channel() -> (SignalSender, SignalReceiver) {
    tokio::sync::mpsc::channel(8)
}
