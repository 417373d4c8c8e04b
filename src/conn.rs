//! The per-session connection record (`conn` in the design notes): owned by the event loop
//! task, never shared.

use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::{
    dispatch::HandlerFn,
    error::Result,
    protocol::AtFrame,
    signal::ScoSignal,
    slc::HfpState,
    transport::{Device, PropertyMask, PropertySink, Transport},
};

/// Which side of the HFP Service Level Connection this engine is driving.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Hands-Free (headset) side.
    Hf,
    /// Audio Gateway (phone) side.
    Ag,
}

/// A one-shot continuation installed by the SLC driver before it sends a command, consulted
/// ahead of the static dispatch table (§4.5/§4.6 dispatch order, design note on dispatch
/// table vs dynamic expectation).
pub struct ExpectedHandler {
    /// The `(type, command)` this continuation expects as a reply.
    pub typ: crate::protocol::AtType,
    /// See [`ExpectedHandler::typ`].
    pub command: String,
    /// The continuation to run once the matching reply arrives.
    pub handler: HandlerFn,
}

/// The per-session connection record.
pub struct Conn {
    /// Our role in this session.
    pub role: Role,
    /// Current HFP/SLC state. Monotone for the lifetime of the session.
    pub state: HfpState,
    /// State as of the previous SLC driver tick, used to detect progress and reset `retries`.
    /// `None` before the driver has run for the first time.
    pub prev_state: Option<HfpState>,
    /// SLC retry counter; zeroed whenever `state` advances.
    pub retries: u32,
    /// One-shot continuation for the reply to the last command we sent, if any.
    pub expected: Option<ExpectedHandler>,
    /// The last frame sent by the SLC driver, cached so a retry can re-emit it verbatim (§9:
    /// retries resend, they do not recompute).
    pub last_sent_slc_frame: Option<AtFrame>,
    /// Cached microphone gain, mirrors `transport.mic_gain()` after our own writes so we can
    /// detect audio-side changes cheaply.
    pub mic_gain_cache: i32,
    /// Cached speaker gain, see `mic_gain_cache`.
    pub spk_gain_cache: i32,
    /// Whether mSBC is usable in this session (compiled in and, for the AG role, offered by
    /// the HF's `AT+BAC=`).
    pub msbc_available: bool,
    /// Our own advertised feature bitmask (`config.hfp.features_rfcomm_{ag,hf}`).
    pub our_features: u32,
    /// The shared transport record.
    pub transport: Arc<Transport>,
    /// The shared device record.
    pub device: Arc<Device>,
    property_sink: Arc<dyn PropertySink>,
    writer: Box<dyn AsyncWrite + Unpin + Send>,
    /// Channel to the SCO/audio sibling, if wired up. `None` if this engine runs headless
    /// (e.g. in tests).
    pub sco_tx: Option<tokio::sync::mpsc::Sender<ScoSignal>>,
}

impl Conn {
    /// Creates a new connection record at [`HfpState::Disconnected`].
    pub fn new(
        role: Role, our_features: u32, msbc_available: bool, transport: Arc<Transport>, device: Arc<Device>,
        property_sink: Arc<dyn PropertySink>, writer: Box<dyn AsyncWrite + Unpin + Send>,
        sco_tx: Option<tokio::sync::mpsc::Sender<ScoSignal>>,
    ) -> Self {
        Self {
            role,
            state: HfpState::Disconnected,
            prev_state: None,
            retries: 0,
            expected: None,
            last_sent_slc_frame: None,
            mic_gain_cache: 0,
            spk_gain_cache: 0,
            msbc_available,
            our_features,
            transport,
            device,
            property_sink,
            writer,
            sco_tx,
        }
    }

    /// Writes one AT frame to the peer (§4.2, C2). Interrupted writes are retried
    /// transparently by `AsyncWriteExt::write_all`; a short write is not expected (frames are
    /// always smaller than the RFCOMM MTU) and is therefore not a distinct error path here.
    pub async fn write_frame(&mut self, frame: &AtFrame) -> Result<()> {
        self.writer.write_all(&frame.build()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Writes raw bytes to the peer verbatim, bypassing the frame model. Used only to forward
    /// traffic from the external AT-handler stream.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Writes an AT frame that is part of the SLC handshake and remembers it, so a retry (driven
    /// by [`crate::slc::tick`]) can resend the exact same bytes without recomputing them.
    pub async fn send_slc(&mut self, frame: AtFrame) -> Result<()> {
        self.write_frame(&frame).await?;
        self.last_sent_slc_frame = Some(frame);
        Ok(())
    }

    /// Installs the one-shot expected-handler for the reply to a command just sent.
    pub fn expect(&mut self, typ: crate::protocol::AtType, command: impl Into<String>, handler: HandlerFn) {
        self.expected = Some(ExpectedHandler { typ, command: command.into(), handler });
    }

    /// Takes the expected-handler if it matches `frame`, clearing the expectation either way
    /// once consulted is not correct: only clear when it actually matches, per §4.6 (an
    /// unrelated frame must still fall through to the static table while the real expectation
    /// stays armed).
    pub fn take_expected_if_matches(&mut self, frame: &AtFrame) -> Option<HandlerFn> {
        let matches = self.expected.as_ref().is_some_and(|e| e.typ == frame.typ && e.command == frame.command);
        if matches {
            self.expected.take().map(|e| e.handler)
        } else {
            None
        }
    }

    /// Advances to `new`, enforcing the monotone-state invariant (§8).
    pub fn set_state(&mut self, new: HfpState) {
        debug_assert!(new >= self.state, "HFP state must not regress: {:?} -> {:?}", self.state, new);
        self.state = new;
    }

    /// Notifies the property sink. Called synchronously; sinks must not block.
    pub fn notify(&self, changed: PropertyMask) {
        if !changed.is_empty() {
            self.property_sink.notify(changed);
        }
    }

    /// Sends a `PING` to the SCO sibling, if wired up (best-effort: a full channel or a
    /// disconnected sibling is not a session error).
    pub fn ping_sco(&self) {
        if let Some(tx) = &self.sco_tx {
            let _ = tx.try_send(ScoSignal::Ping);
        }
    }
}
