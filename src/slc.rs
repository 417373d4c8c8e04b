//! The role-parameterized Service Level Connection state machine (§4.5).
//!
//! Both roles share one [`HfpState`] progression. Most transitions are driven by a handler
//! (static or expected) observing a reply; [`tick`] only does three things each event loop
//! iteration: detect whether the previous send made progress, retry or fail on timeout, and
//! dispatch the next send for states that need one.

use std::time::Duration;

use crate::{
    conn::{Conn, Role},
    config::Config,
    dispatch::{self, BoxFuture},
    error::{Error, Result},
    protocol::{AtFrame, AtType, Codec, features},
    transport::PropertyMask,
};

/// SLC (and, past `SLC_CONNECTED`, codec negotiation) progress, shared by both roles.
///
/// Declaration order is the monotone progression order: `Ord`/`PartialOrd` are derived from it
/// and used by [`Conn::set_state`] to assert the state never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HfpState {
    /// No SLC established yet; nothing sent.
    Disconnected,
    /// `AT+BRSF=`/`+BRSF:` exchanged; waiting for the terminating `OK`.
    SlcBrsfSet,
    /// `+BRSF` acknowledged.
    SlcBrsfSetOk,
    /// `AT+BAC=` acknowledged (skipped entirely if codec negotiation is not supported).
    SlcBacSetOk,
    /// `AT+CIND=?` sent; waiting for the terminating `OK` after the vocabulary response.
    SlcCindTest,
    /// `+CIND=?` vocabulary received and acknowledged.
    SlcCindTestOk,
    /// `AT+CIND?` sent; waiting for the terminating `OK` after the value response.
    SlcCindGet,
    /// `+CIND?` values received and acknowledged.
    SlcCindGetOk,
    /// `AT+CMER=` acknowledged.
    SlcCmerSetOk,
    /// SLC established; codec negotiation (if supported) or completion follows immediately.
    SlcConnected,
    /// `+BCS:` exchanged; waiting for the terminating `OK` after our/the HF's confirmation.
    CcBcsSet,
    /// Codec confirmation acknowledged.
    CcBcsSetOk,
    /// Reserved terminal step before [`Self::Connected`]; reached via [`Self::CcBcsSetOk`] or,
    /// defensively, directly.
    CcConnected,
    /// Fully connected: SLC established and (if applicable) codec negotiated.
    Connected,
}

/// The state to advance to when a bare `OK` arrives while `state` is current. States not listed
/// here have no generic-`OK`-driven transition (either nothing is outstanding, or the advance is
/// driven by a specific handler instead).
pub fn next_after_generic_ok(state: HfpState) -> HfpState {
    match state {
        HfpState::SlcBrsfSet => HfpState::SlcBrsfSetOk,
        HfpState::SlcCindTest => HfpState::SlcCindTestOk,
        HfpState::SlcCindGet => HfpState::SlcCindGetOk,
        HfpState::SlcCindGetOk => HfpState::SlcCmerSetOk,
        HfpState::CcBcsSet => HfpState::CcBcsSetOk,
        other => other,
    }
}

/// Runs one SLC driver tick. Returns the timeout to poll with (`None` means wait indefinitely),
/// or `Err(Error::TimedOut)` once the retry budget for the current state is exhausted.
///
/// Called once per event loop iteration before the loop waits on its file descriptors (§4.6,
/// step 1). A no-op once `state` reaches [`HfpState::Connected`].
pub async fn tick(conn: &mut Conn, config: &Config) -> Result<Option<Duration>> {
    if conn.state == HfpState::Connected {
        return Ok(None);
    }

    if conn.prev_state != Some(conn.state) {
        conn.retries = 0;
        conn.prev_state = Some(conn.state);
    } else {
        conn.retries += 1;
        if conn.retries > config.slc_retries {
            return Err(Error::TimedOut(conn.state));
        }
        if let Some(frame) = conn.last_sent_slc_frame.clone() {
            conn.write_frame(&frame).await?;
        }
        return Ok(Some(config.slc_timeout()));
    }

    match conn.state {
        HfpState::SlcCmerSetOk => {
            conn.set_state(HfpState::SlcConnected);
        }
        HfpState::CcBcsSetOk | HfpState::CcConnected => {
            conn.set_state(HfpState::Connected);
            conn.notify(PropertyMask::SAMPLING_CODEC);
            return Ok(None);
        }
        _ => {}
    }

    match conn.role {
        Role::Hf => dispatch_hf(conn).await?,
        Role::Ag => dispatch_ag(conn).await?,
    }

    if conn.state == HfpState::Connected {
        Ok(None)
    } else if conn.expected.is_some() {
        Ok(Some(config.slc_timeout()))
    } else {
        Ok(None)
    }
}

/// Hands-Free role driver: we send the SLC commands and expect the AG's replies.
fn dispatch_hf(conn: &mut Conn) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        match conn.state {
            HfpState::Disconnected => {
                conn.send_slc(AtFrame::cmd_set("+BRSF", conn.our_features.to_string())).await?;
                conn.expect(AtType::Resp, "+BRSF", dispatch::H_BRSF_RESP);
            }
            HfpState::SlcBrsfSetOk => {
                if features::supports_codec_negotiation(conn.transport.hfp_features()) {
                    let ids = if conn.msbc_available { "1,2" } else { "1" };
                    conn.send_slc(AtFrame::cmd_set("+BAC", ids)).await?;
                    conn.expect(AtType::Resp, "", dispatch::H_GENERIC_OK);
                } else {
                    conn.set_state(HfpState::SlcBacSetOk);
                    return dispatch_hf(conn).await;
                }
            }
            HfpState::SlcBacSetOk => {
                conn.send_slc(AtFrame::cmd_test("+CIND")).await?;
                conn.expect(AtType::Resp, "+CIND", dispatch::H_CIND_TEST_RESP);
            }
            HfpState::SlcCindTestOk => {
                conn.send_slc(AtFrame::cmd_get("+CIND")).await?;
                conn.expect(AtType::Resp, "+CIND", dispatch::H_CIND_GET_RESP);
            }
            HfpState::SlcCindGetOk => {
                conn.send_slc(AtFrame::cmd_set("+CMER", "3,0,0,1,0")).await?;
                conn.expect(AtType::Resp, "", dispatch::H_GENERIC_OK);
            }
            HfpState::SlcConnected => {
                if !features::supports_codec_negotiation(conn.transport.hfp_features()) {
                    conn.set_state(HfpState::Connected);
                    conn.notify(PropertyMask::SAMPLING_CODEC);
                }
                // Otherwise: remain, waiting for the AG's unsolicited `+BCS:` push.
            }
            HfpState::SlcBrsfSet
            | HfpState::SlcCindTest
            | HfpState::SlcCindGet
            | HfpState::CcBcsSet
            | HfpState::SlcCmerSetOk
            | HfpState::CcBcsSetOk
            | HfpState::CcConnected
            | HfpState::Connected => {
                // Purely waiting states (or already handled by `tick`'s fall-through above):
                // the expected-handler installed on entry governs progress.
            }
        }
        Ok(())
    })
}

/// Audio Gateway role driver: we are mostly passive, answering commands the HF sends; the
/// exception is codec negotiation, which the AG initiates once the SLC is established.
fn dispatch_ag(conn: &mut Conn) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        match conn.state {
            HfpState::SlcConnected => {
                if features::supports_codec_negotiation(conn.transport.hfp_features()) {
                    let codec = if conn.msbc_available { Codec::Msbc } else { Codec::Cvsd };
                    conn.transport.set_codec(codec);
                    conn.send_slc(AtFrame::resp("+BCS", (codec as u8).to_string())).await?;
                    conn.expect(AtType::CmdSet, "+BCS", dispatch::H_BCS_SET);
                } else {
                    conn.set_state(HfpState::Connected);
                    conn.notify(PropertyMask::SAMPLING_CODEC);
                }
            }
            HfpState::Disconnected
            | HfpState::SlcBrsfSet
            | HfpState::SlcBrsfSetOk
            | HfpState::SlcBacSetOk
            | HfpState::SlcCindTest
            | HfpState::SlcCindTestOk
            | HfpState::SlcCindGet
            | HfpState::SlcCindGetOk
            | HfpState::SlcCmerSetOk
            | HfpState::CcBcsSet
            | HfpState::CcBcsSetOk
            | HfpState::CcConnected
            | HfpState::Connected => {
                // Passive: driven entirely by the static dispatch table reacting to the HF's
                // commands (`brsf_set`, `bac_set`, `ag_cind_test`, `ag_cind_get`, `cmer_set`,
                // `bcs_set`).
            }
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_order_is_monotone_by_declaration() {
        assert!(HfpState::Disconnected < HfpState::SlcBrsfSet);
        assert!(HfpState::SlcCmerSetOk < HfpState::SlcConnected);
        assert!(HfpState::CcConnected < HfpState::Connected);
    }

    #[test]
    fn generic_ok_transitions_match_driver_sends() {
        assert_eq!(next_after_generic_ok(HfpState::SlcBrsfSet), HfpState::SlcBrsfSetOk);
        assert_eq!(next_after_generic_ok(HfpState::SlcCindGetOk), HfpState::SlcCmerSetOk);
        assert_eq!(next_after_generic_ok(HfpState::CcBcsSet), HfpState::CcBcsSetOk);
        assert_eq!(next_after_generic_ok(HfpState::Connected), HfpState::Connected);
    }
}
