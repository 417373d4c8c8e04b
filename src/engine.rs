//! The event loop (§4.6, C6): multiplexes the RFCOMM byte stream, the in-process signalling
//! channel and an optional external AT-handler stream, and drives the SLC state machine.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    config::Config,
    conn::{Conn, Role},
    dispatch,
    error::{Error, Result},
    protocol::{AtFrame, parse_at},
    signal::{ScoSignal, Signal, SignalReceiver},
    slc,
    transport::{Device, PropertySink, Transport},
};

/// Initial and maximum size of the AT read buffer. An HFP control-channel line is always tiny;
/// this comfortably covers the longest frame this engine builds or parses (`+CIND=?`'s
/// vocabulary response).
const READ_CHUNK: usize = 512;

/// Runs the engine for one HFP session to completion.
///
/// `stream` is the RFCOMM byte stream (or, in tests, any `AsyncRead + AsyncWrite` duplex).
/// `handler` is an optional external AT-handler stream: bytes this engine cannot dispatch
/// (neither a pending expected-handler nor a static table entry matches) are forwarded there
/// verbatim rather than discarded, and anything the handler writes back is forwarded to the
/// peer untouched. Returns once the RFCOMM stream closes or a fatal error occurs (§7).
pub async fn run<S>(
    stream: S, role: Role, config: Config, transport: Arc<Transport>, device: Arc<Device>,
    property_sink: Arc<dyn PropertySink>, mut signal_rx: SignalReceiver,
    sco_tx: Option<tokio::sync::mpsc::Sender<ScoSignal>>,
    mut handler: Option<Box<dyn AsyncRead + AsyncWrite + Unpin + Send>>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let our_features = match role {
        Role::Ag => config.features_rfcomm_ag,
        Role::Hf => config.features_rfcomm_hf,
    };
    let msbc_available = crate::config::msbc_compiled_in();

    let (read_half, write_half) = tokio::io::split(stream);
    let mut conn =
        Conn::new(role, our_features, msbc_available, transport, device, property_sink, Box::new(write_half), sco_tx);

    let mut reader = read_half;
    let mut buf = Vec::with_capacity(READ_CHUNK);
    let mut handler_buf = [0u8; READ_CHUNK];

    loop {
        let timeout = slc::tick(&mut conn, &config).await?;

        match try_parse_one(&buf) {
            Ok(Some((frame, tail_len))) => {
                buf.drain(..buf.len() - tail_len);
                if let Err(e) = dispatch_frame(&mut conn, frame, handler.as_deref_mut()).await {
                    if e.terminates_session() {
                        return Err(e);
                    }
                    log::warn!("dropping frame after handler error: {e}");
                }
                continue;
            }
            Ok(None) => {}
            Err(e) if !e.terminates_session() => {
                // §7: a malformed line does not end the session. There is no per-line cursor
                // in this buffer model, so "clear the reader cursor" means dropping everything
                // buffered so far and waiting for the next read to refill.
                log::warn!("dropping unparsable AT bytes: {e}");
                buf.clear();
                continue;
            }
            Err(e) => return Err(e),
        }

        let mut chunk = [0u8; READ_CHUNK];
        tokio::select! {
            biased;

            n = reader.read(&mut chunk) => {
                let n = n?;
                if n == 0 {
                    return Err(Error::ConnReset);
                }
                buf.extend_from_slice(&chunk[..n]);
            }

            signal = signal_rx.recv() => {
                match signal {
                    Some(Signal::SetVolume) => resync_volume(&mut conn).await?,
                    None => {}
                }
            }

            n = read_handler(&mut handler, &mut handler_buf) => {
                match n {
                    Ok(Some(n)) if n > 0 => conn.write_raw(&handler_buf[..n]).await?,
                    Ok(_) => {
                        // EOF on the external handler stream (§7: close it, keep the session).
                        log::warn!("external AT-handler stream closed, detaching it");
                        handler = None;
                    }
                    Err(err) => {
                        log::warn!("external AT-handler stream I/O error, detaching it: {err}");
                        handler = None;
                    }
                }
            }

            _ = sleep_or_pending(timeout) => {
                // Timed out waiting for the SLC peer; loop back so `slc::tick` can retry.
            }
        }
    }
}

/// Reads from the external handler stream, if one is wired up. Never resolves if `handler` is
/// `None`, so it drops out of the `select!` naturally.
async fn read_handler(
    handler: &mut Option<Box<dyn AsyncRead + AsyncWrite + Unpin + Send>>, buf: &mut [u8],
) -> std::io::Result<Option<usize>> {
    match handler {
        Some(h) => {
            let n = h.read(buf).await?;
            Ok(Some(n))
        }
        None => std::future::pending().await,
    }
}

async fn sleep_or_pending(timeout: Option<std::time::Duration>) {
    match timeout {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending().await,
    }
}

/// Tries to parse exactly one frame from the head of `buf`. Returns the frame and the length of
/// the remaining tail (from the end of `buf`) so the caller can drain the consumed prefix.
fn try_parse_one(buf: &[u8]) -> Result<Option<(AtFrame, usize)>> {
    match parse_at(buf)? {
        Some((frame, tail)) => Ok(Some((frame, tail.len()))),
        None => Ok(None),
    }
}

/// Dispatches one parsed frame: the expected-handler, if armed and matching, takes precedence
/// over the static table (§4.6). An unmatched frame is forwarded to the external handler if one
/// is wired up; otherwise an unmatched command frame gets a synthesized `ERROR` reply and an
/// unmatched response frame is only logged (§4.6 step 5, §7).
async fn dispatch_frame(
    conn: &mut Conn, frame: AtFrame, handler: Option<&mut (dyn AsyncRead + AsyncWrite + Unpin + Send)>,
) -> Result<()> {
    if let Some(h) = conn.take_expected_if_matches(&frame) {
        return h(conn, &frame).await;
    }
    if let Some(h) = dispatch::get_handler(&frame) {
        return h(conn, &frame).await;
    }
    match handler {
        Some(h) => {
            h.write_all(&frame.build()).await?;
            h.flush().await?;
            Ok(())
        }
        None if frame.typ == crate::protocol::AtType::Resp => {
            log::warn!("unhandled AT response, no external handler wired up: {frame:?}");
            Ok(())
        }
        None => {
            log::warn!("unsupported AT command, replying ERROR: {frame:?}");
            conn.write_frame(&AtFrame::error()).await
        }
    }
}

/// Reacts to [`Signal::SetVolume`]: if the session is up, pushes whichever of mic/speaker gain
/// changed since our last report. The wire form depends on direction: the Hands-Free side
/// issues `AT+VGM=`/`AT+VGS=` as commands, the Audio Gateway side reports `+VGM:`/`+VGS:` as
/// unsolicited responses.
async fn resync_volume(conn: &mut Conn) -> Result<()> {
    if conn.state != crate::slc::HfpState::Connected {
        return Ok(());
    }
    let mic = conn.transport.mic_gain();
    let spk = conn.transport.spk_gain();
    if mic != conn.mic_gain_cache {
        conn.mic_gain_cache = mic;
        conn.write_frame(&volume_frame(conn.role, "+VGM", mic)).await?;
    }
    if spk != conn.spk_gain_cache {
        conn.spk_gain_cache = spk;
        conn.write_frame(&volume_frame(conn.role, "+VGS", spk)).await?;
    }
    Ok(())
}

fn volume_frame(role: Role, command: &str, value: i32) -> AtFrame {
    match role {
        Role::Hf => AtFrame::cmd_set(command, value.to_string()),
        Role::Ag => AtFrame::resp(command, value.to_string()),
    }
}
