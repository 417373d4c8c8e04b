//! Per-command handler implementations (§4.4).
//!
//! Each function here is wrapped by a small `fn` pointer in [`crate::dispatch`] before being
//! placed in the static registry or installed as a one-shot expected-handler.

use crate::{
    conn::Conn,
    dispatch,
    error::{Error, Result},
    protocol::{AtFrame, AtType, Codec, IndicatorKind},
    slc::HfpState,
    transport::PropertyMask,
};

/// Bare `OK`/`ERROR` handler. Advances the SLC state machine one step on `OK`; a peer `ERROR` to
/// an SLC command is fatal (§7). Anything else is left alone — there is nothing else a bare
/// response can mean.
pub async fn generic_ok(conn: &mut Conn, frame: &AtFrame) -> Result<()> {
    if frame.is_ok() {
        conn.set_state(crate::slc::next_after_generic_ok(conn.state));
        Ok(())
    } else if frame.is_error() {
        Err(Error::NotSupported(format!("{:?}", conn.state)))
    } else {
        Ok(())
    }
}

/// Like [`generic_ok`], but also raises `SAMPLING|CODEC` on success. Installed by the HF role
/// after it confirms the AG's codec choice with `AT+BCS=`.
pub async fn bcs_confirm_ok(conn: &mut Conn, frame: &AtFrame) -> Result<()> {
    generic_ok(conn, frame).await?;
    if frame.is_ok() {
        conn.notify(PropertyMask::SAMPLING_CODEC);
    }
    Ok(())
}

/// `AT+CIND=?` (AG role): reply with the fixed indicator vocabulary, then `OK`.
pub async fn ag_cind_test(conn: &mut Conn, _frame: &AtFrame) -> Result<()> {
    conn.transport.with_indicators(|m| {
        if !m.is_populated() {
            *m = crate::protocol::IndicatorMap::ag_fixed();
        }
    });
    conn.write_frame(&AtFrame::resp("+CIND", crate::protocol::indicators::AG_CIND_TEST_VOCABULARY)).await?;
    conn.write_frame(&AtFrame::ok()).await?;
    if conn.state < HfpState::SlcCindTestOk {
        conn.set_state(HfpState::SlcCindTestOk);
    }
    Ok(())
}

/// `AT+CIND?` (AG role): reply with the current indicator values, then `OK`.
pub async fn ag_cind_get(conn: &mut Conn, _frame: &AtFrame) -> Result<()> {
    let values = conn.transport.with_indicators(|m| {
        (0..7).map(|i| m.get(AG_ORDER[i]).unwrap_or(0).to_string()).collect::<Vec<_>>().join(",")
    });
    conn.write_frame(&AtFrame::resp("+CIND", values)).await?;
    conn.write_frame(&AtFrame::ok()).await?;
    conn.set_state(HfpState::SlcCindGetOk);
    Ok(())
}

const AG_ORDER: [IndicatorKind; 7] = [
    IndicatorKind::Call,
    IndicatorKind::Callsetup,
    IndicatorKind::Service,
    IndicatorKind::Signal,
    IndicatorKind::Roam,
    IndicatorKind::Battchg,
    IndicatorKind::Callheld,
];

/// `+CIND` response with no pending expectation: the static table's only job for this row is to
/// absorb a stray unsolicited report, since the real test/get forms are always consumed through
/// the one-shot expected-handler the HF driver installs before asking.
pub async fn cind_resp_fallback(_conn: &mut Conn, frame: &AtFrame) -> Result<()> {
    log::warn!("unexpected +CIND response with no pending expectation: {}", frame.value);
    Ok(())
}

/// `+CIND=?` response (HF role): populate the session's indicator vocabulary, then wait for the
/// terminating bare `OK`.
pub async fn cind_test_resp(conn: &mut Conn, frame: &AtFrame) -> Result<()> {
    let map = crate::protocol::IndicatorMap::parse_vocabulary(&frame.value)?;
    conn.transport.with_indicators(|m| *m = map);
    conn.set_state(HfpState::SlcCindTest);
    conn.expect(AtType::Resp, "", dispatch::H_GENERIC_OK);
    Ok(())
}

/// `+CIND?` response (HF role): populate initial indicator values; a changed `battchg` updates
/// the device battery level (§4.4: `value * 100 / 5`) and raises `BATTERY`.
pub async fn cind_get_resp(conn: &mut Conn, frame: &AtFrame) -> Result<()> {
    let changes = conn.transport.with_indicators(|m| m.parse_values(&frame.value))?;
    let mut mask = PropertyMask::NONE;
    for (kind, _old, new) in changes {
        if kind == IndicatorKind::Battchg {
            conn.device.set_battery_level((new * 100 / 5) as u32);
            mask = mask | PropertyMask::BATTERY;
        }
    }
    conn.notify(mask);
    conn.set_state(HfpState::SlcCindGet);
    conn.expect(AtType::Resp, "", dispatch::H_GENERIC_OK);
    Ok(())
}

/// `AT+CMER=` (AG role): reply `OK` unconditionally; indicator events are always wanted.
pub async fn cmer_set(conn: &mut Conn, _frame: &AtFrame) -> Result<()> {
    conn.write_frame(&AtFrame::ok()).await?;
    conn.set_state(HfpState::SlcCmerSetOk);
    Ok(())
}

/// `+CIEV: index,value` (post-SLC indicator event). `call`/`callsetup` changes ping the SCO
/// sibling; `battchg` recomputes and republishes the battery level.
pub async fn ciev_resp(conn: &mut Conn, frame: &AtFrame) -> Result<()> {
    let (idx_s, val_s) =
        frame.value.split_once(',').ok_or_else(|| Error::BadMessage(format!("malformed +CIEV: {}", frame.value)))?;
    let position: usize =
        idx_s.trim().parse().map_err(|_| Error::BadMessage(format!("bad +CIEV index: {idx_s}")))?;
    let value: i32 = val_s.trim().parse().map_err(|_| Error::BadMessage(format!("bad +CIEV value: {val_s}")))?;
    let Some((kind, _old)) = conn.transport.with_indicators(|m| m.set_by_position(position, value)) else {
        log::warn!("+CIEV: unknown indicator position {position}");
        return Ok(());
    };
    match kind {
        IndicatorKind::Call | IndicatorKind::Callsetup => conn.ping_sco(),
        IndicatorKind::Battchg => {
            conn.device.set_battery_level((value * 100 / 5) as u32);
            conn.notify(PropertyMask::BATTERY);
        }
        _ => {}
    }
    Ok(())
}

/// `AT+BIA=` (indicator activation mask): acknowledged unconditionally. This engine always
/// reports every indicator; the mask is accepted but not enforced.
pub async fn bia_set(conn: &mut Conn, _frame: &AtFrame) -> Result<()> {
    conn.write_frame(&AtFrame::ok()).await
}

/// `AT+BRSF=` (AG role): store the HF's feature bitmask, force CVSD if it does not advertise
/// codec negotiation, reply with our own feature bitmask and `OK`.
pub async fn brsf_set(conn: &mut Conn, frame: &AtFrame) -> Result<()> {
    let hf_features: u32 =
        frame.value.trim().parse().map_err(|_| Error::BadMessage(format!("bad +BRSF value: {}", frame.value)))?;
    conn.transport.set_hfp_features(hf_features);
    if !crate::protocol::features::supports_codec_negotiation(hf_features) {
        conn.transport.set_codec(Codec::Cvsd);
        conn.msbc_available = false;
    }
    conn.write_frame(&AtFrame::resp("+BRSF", conn.our_features.to_string())).await?;
    conn.write_frame(&AtFrame::ok()).await?;
    conn.set_state(HfpState::SlcBrsfSetOk);
    Ok(())
}

/// `+BRSF` response (HF role): store the AG's feature bitmask, force CVSD if it does not
/// advertise codec negotiation, then wait for the terminating bare `OK`.
pub async fn brsf_resp(conn: &mut Conn, frame: &AtFrame) -> Result<()> {
    let ag_features: u32 =
        frame.value.trim().parse().map_err(|_| Error::BadMessage(format!("bad +BRSF value: {}", frame.value)))?;
    conn.transport.set_hfp_features(ag_features);
    if !crate::protocol::features::supports_codec_negotiation(ag_features) {
        conn.transport.set_codec(Codec::Cvsd);
        conn.msbc_available = false;
    }
    conn.set_state(HfpState::SlcBrsfSet);
    conn.expect(AtType::Resp, "", dispatch::H_GENERIC_OK);
    Ok(())
}

/// `AT+VGM=` (microphone gain): update the shared transport, acknowledge, notify `VOLUME`.
pub async fn vgm_set(conn: &mut Conn, frame: &AtFrame) -> Result<()> {
    let gain: i32 =
        frame.value.trim().parse().map_err(|_| Error::BadMessage(format!("bad +VGM value: {}", frame.value)))?;
    conn.mic_gain_cache = gain;
    conn.transport.set_mic_gain(gain);
    conn.write_frame(&AtFrame::ok()).await?;
    conn.notify(PropertyMask::VOLUME);
    Ok(())
}

/// `AT+VGS=` (speaker gain): see [`vgm_set`].
pub async fn vgs_set(conn: &mut Conn, frame: &AtFrame) -> Result<()> {
    let gain: i32 =
        frame.value.trim().parse().map_err(|_| Error::BadMessage(format!("bad +VGS value: {}", frame.value)))?;
    conn.spk_gain_cache = gain;
    conn.transport.set_spk_gain(gain);
    conn.write_frame(&AtFrame::ok()).await?;
    conn.notify(PropertyMask::VOLUME);
    Ok(())
}

/// `AT+BTRH?` (response-and-hold query): we never hold a call, so the only meaningful answer is
/// a bare `OK` with no `+BTRH:` line.
pub async fn btrh_get(conn: &mut Conn, _frame: &AtFrame) -> Result<()> {
    conn.write_frame(&AtFrame::ok()).await
}

/// `AT+BCS=` (AG role): the HF confirms our codec offer. Accept only if it matches the codec we
/// last selected; otherwise the HF is out of sync and we reject.
pub async fn bcs_set(conn: &mut Conn, frame: &AtFrame) -> Result<()> {
    let proposed: u8 =
        frame.value.trim().parse().map_err(|_| Error::BadMessage(format!("bad +BCS value: {}", frame.value)))?;
    if proposed == conn.transport.codec() as u8 {
        conn.write_frame(&AtFrame::ok()).await?;
        conn.set_state(HfpState::CcBcsSetOk);
    } else {
        conn.write_frame(&AtFrame::error()).await?;
    }
    Ok(())
}

/// `+BCS:` response (HF role): the AG selected a codec; store it, confirm with `AT+BCS=`, and
/// wait for the AG's `OK` (retried like any other SLC step, per the resolved open question).
pub async fn bcs_resp(conn: &mut Conn, frame: &AtFrame) -> Result<()> {
    let codec_id: u8 =
        frame.value.trim().parse().map_err(|_| Error::BadMessage(format!("bad +BCS value: {}", frame.value)))?;
    let codec = if codec_id == Codec::Msbc as u8 { Codec::Msbc } else { Codec::Cvsd };
    conn.transport.set_codec(codec);
    conn.send_slc(AtFrame::cmd_set("+BCS", codec_id.to_string())).await?;
    conn.expect(crate::protocol::AtType::Resp, "", dispatch::H_BCS_CONFIRM_OK);
    conn.set_state(HfpState::CcBcsSet);
    Ok(())
}

/// `AT+BAC=` (AG role): record which codecs the HF is willing to use.
pub async fn bac_set(conn: &mut Conn, frame: &AtFrame) -> Result<()> {
    let ids: Vec<u8> = frame
        .value
        .split(',')
        .map(|s| s.trim().parse().map_err(|_| Error::BadMessage(format!("bad +BAC id: {s}"))))
        .collect::<Result<_>>()?;
    if crate::config::msbc_compiled_in() && ids.contains(&(Codec::Msbc as u8)) {
        conn.msbc_available = true;
    }
    conn.write_frame(&AtFrame::ok()).await?;
    conn.set_state(HfpState::SlcBacSetOk);
    Ok(())
}

/// `AT+IPHONEACCEV=<count>,<key1>,<val1>,...` (Apple accessory state). Key `1` is battery level
/// (`value * 100 / 9`, §4.4); key `2` is dock state. Unknown keys are skipped along with their
/// value, not rejected — new keys appear across iOS versions and this is diagnostic data only.
pub async fn iphoneaccev_set(conn: &mut Conn, frame: &AtFrame) -> Result<()> {
    let mut parts = frame.value.split(',').map(str::trim);
    let count: usize = parts
        .next()
        .ok_or_else(|| Error::BadMessage("empty +IPHONEACCEV".to_string()))?
        .parse()
        .map_err(|_| Error::BadMessage("bad +IPHONEACCEV count".to_string()))?;
    for _ in 0..count {
        let key = parts.next().ok_or_else(|| Error::BadMessage("+IPHONEACCEV: missing key".to_string()))?;
        let value = parts.next().ok_or_else(|| Error::BadMessage("+IPHONEACCEV: missing value".to_string()))?;
        match key {
            "1" => {
                let battery: i32 =
                    value.parse().map_err(|_| Error::BadMessage(format!("bad +IPHONEACCEV battery: {value}")))?;
                conn.device.set_battery_level((battery * 100 / 9) as u32);
                conn.notify(PropertyMask::BATTERY);
            }
            "2" => conn.device.set_accev_docked(value.trim() != "0"),
            other => log::warn!("+IPHONEACCEV: unknown key {other}, value {value}"),
        }
    }
    conn.write_frame(&AtFrame::ok()).await
}

/// `AT+XAPL=<vendor>-<product>-<version>,<features>` (Apple accessory identification). Replies
/// `+XAPL=BlueALSA,<features>` on a well-formed payload, `ERROR` otherwise.
pub async fn xapl_set(conn: &mut Conn, frame: &AtFrame) -> Result<()> {
    match parse_xapl(&frame.value) {
        Some((vendor, product, version, features)) => {
            conn.device.set_xapl_ids(vendor, product, version, features);
            conn.write_frame(&AtFrame::resp("+XAPL", "BlueALSA,0")).await
        }
        None => conn.write_frame(&AtFrame::error()).await,
    }
}

fn parse_xapl(value: &str) -> Option<(u32, u32, u32, u32)> {
    let (ids, features) = value.split_once(',')?;
    let features: u32 = features.trim().parse().ok()?;
    let mut ids = ids.split('-');
    let vendor = u32::from_str_radix(ids.next()?.trim(), 16).ok()?;
    let product = u32::from_str_radix(ids.next()?.trim(), 16).ok()?;
    let version: u32 = ids.next()?.trim().parse().ok()?;
    if ids.next().is_some() {
        return None;
    }
    Some((vendor, product, version, features))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xapl(s: &str) -> Option<(u32, u32, u32, u32)> {
        parse_xapl(s)
    }

    #[test]
    fn parses_xapl_ids() {
        assert_eq!(xapl("0055-0002-0100,9"), Some((0x55, 0x02, 0x100, 9)));
    }

    #[test]
    fn rejects_malformed_xapl() {
        assert!(xapl("0055-0002,9").is_none());
        assert!(xapl("not-hex-data,9").is_none());
    }
}
