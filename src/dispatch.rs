//! The static `(type, command) -> handler` registry (§4.3).
//!
//! Lookup order, enforced by the event loop rather than by this module: a one-shot
//! [`crate::conn::ExpectedHandler`] installed by the SLC driver is always consulted first; this
//! table is the fallback for everything else, and a bare `OK`/`ERROR` never matches a row here
//! (it only ever resolves through the expected-handler slot).

use std::{future::Future, pin::Pin};

use crate::{
    conn::Conn,
    error::Result,
    handlers,
    protocol::{AtFrame, AtType},
};

/// A boxed, borrowing future, the return type of every dispatch entry point.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A dispatchable handler: borrows the connection and the triggering frame rather than owning
/// them, since [`Conn`] cannot be cheaply cloned. A plain `fn` pointer (not `Arc<dyn Fn>`): every
/// entry is either a static table row or one of a handful of fixed continuations the SLC driver
/// installs, so there is no need to close over per-call state.
pub type HandlerFn = for<'a> fn(&'a mut Conn, &'a AtFrame) -> BoxFuture<'a, Result<()>>;

/// One row of the static dispatch table.
pub struct HandlerEntry {
    /// The frame type this row matches.
    pub typ: AtType,
    /// The command name this row matches, e.g. `"+CIND"`.
    pub command: &'static str,
    /// The handler to run.
    pub handler: HandlerFn,
}

macro_rules! wrap {
    ($name:ident, $inner:path) => {
        fn $name<'a>(conn: &'a mut Conn, frame: &'a AtFrame) -> BoxFuture<'a, Result<()>> {
            Box::pin($inner(conn, frame))
        }
    };
}

wrap!(h_generic_ok, handlers::generic_ok);
wrap!(h_ag_cind_test, handlers::ag_cind_test);
wrap!(h_ag_cind_get, handlers::ag_cind_get);
wrap!(h_cind_resp_fallback, handlers::cind_resp_fallback);
wrap!(h_cind_test_resp, handlers::cind_test_resp);
wrap!(h_cind_get_resp, handlers::cind_get_resp);
wrap!(h_cmer_set, handlers::cmer_set);
wrap!(h_ciev_resp, handlers::ciev_resp);
wrap!(h_bia_set, handlers::bia_set);
wrap!(h_brsf_set, handlers::brsf_set);
wrap!(h_brsf_resp, handlers::brsf_resp);
wrap!(h_vgm_set, handlers::vgm_set);
wrap!(h_vgs_set, handlers::vgs_set);
wrap!(h_btrh_get, handlers::btrh_get);
wrap!(h_bcs_set, handlers::bcs_set);
wrap!(h_bcs_resp, handlers::bcs_resp);
wrap!(h_bcs_confirm_ok, handlers::bcs_confirm_ok);
wrap!(h_bac_set, handlers::bac_set);
wrap!(h_iphoneaccev_set, handlers::iphoneaccev_set);
wrap!(h_xapl_set, handlers::xapl_set);

/// Handler for a bare `OK`/`ERROR` reply, installed as an expected-handler by the SLC driver
/// wherever a plain acknowledgement advances the state machine (§4.5).
pub const H_GENERIC_OK: HandlerFn = h_generic_ok;
/// `+BRSF` response handler (HF role), installed as an expected-handler after we send `AT+BRSF=`.
pub const H_BRSF_RESP: HandlerFn = h_brsf_resp;
/// `+CIND` test-form response handler (HF role), installed after we send `AT+CIND=?`.
pub const H_CIND_TEST_RESP: HandlerFn = h_cind_test_resp;
/// `+CIND` get-form response handler (HF role), installed after we send `AT+CIND?`.
pub const H_CIND_GET_RESP: HandlerFn = h_cind_get_resp;
/// `+BCS=` set handler (AG role), installed after we send `+BCS:` to confirm the HF's choice.
pub const H_BCS_SET: HandlerFn = h_bcs_set;
/// Bare `OK`/`ERROR` handler that also raises `SAMPLING|CODEC`, installed by the HF role after
/// it confirms the AG's codec choice with `AT+BCS=`.
pub const H_BCS_CONFIRM_OK: HandlerFn = h_bcs_confirm_ok;

/// The static dispatch table (§4.3). Exactly the commands named there; a bare `OK`/`ERROR` is
/// deliberately absent (see module docs).
pub static REGISTRY: &[HandlerEntry] = &[
    HandlerEntry { typ: AtType::CmdTest, command: "+CIND", handler: h_ag_cind_test },
    HandlerEntry { typ: AtType::CmdGet, command: "+CIND", handler: h_ag_cind_get },
    HandlerEntry { typ: AtType::Resp, command: "+CIND", handler: h_cind_resp_fallback },
    HandlerEntry { typ: AtType::CmdSet, command: "+CMER", handler: h_cmer_set },
    HandlerEntry { typ: AtType::Resp, command: "+CIEV", handler: h_ciev_resp },
    HandlerEntry { typ: AtType::CmdSet, command: "+BIA", handler: h_bia_set },
    HandlerEntry { typ: AtType::CmdSet, command: "+BRSF", handler: h_brsf_set },
    HandlerEntry { typ: AtType::Resp, command: "+BRSF", handler: h_brsf_resp },
    HandlerEntry { typ: AtType::CmdSet, command: "+VGM", handler: h_vgm_set },
    HandlerEntry { typ: AtType::CmdSet, command: "+VGS", handler: h_vgs_set },
    HandlerEntry { typ: AtType::CmdGet, command: "+BTRH", handler: h_btrh_get },
    HandlerEntry { typ: AtType::CmdSet, command: "+BCS", handler: h_bcs_set },
    HandlerEntry { typ: AtType::Resp, command: "+BCS", handler: h_bcs_resp },
    HandlerEntry { typ: AtType::CmdSet, command: "+BAC", handler: h_bac_set },
    HandlerEntry { typ: AtType::CmdSet, command: "+IPHONEACCEV", handler: h_iphoneaccev_set },
    HandlerEntry { typ: AtType::CmdSet, command: "+XAPL", handler: h_xapl_set },
];

/// Looks up the static handler for `frame`. Bare `OK`/`ERROR` (empty command) always misses.
pub fn get_handler(frame: &AtFrame) -> Option<HandlerFn> {
    if frame.command.is_empty() {
        return None;
    }
    REGISTRY.iter().find(|e| e.typ == frame.typ && e.command == frame.command).map(|e| e.handler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_ok_never_matches() {
        assert!(get_handler(&AtFrame::ok()).is_none());
        assert!(get_handler(&AtFrame::error()).is_none());
    }

    #[test]
    fn finds_registered_command() {
        assert!(get_handler(&AtFrame::cmd_test("+CIND")).is_some());
        assert!(get_handler(&AtFrame::resp("+CIEV", "1,1")).is_some());
    }

    #[test]
    fn unregistered_command_misses() {
        assert!(get_handler(&AtFrame::cmd_set("+CLIP", "1")).is_none());
    }
}
