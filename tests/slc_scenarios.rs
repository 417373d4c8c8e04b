//! End-to-end SLC scenarios (spec.md §8) driven against `engine::run` over an in-memory
//! `tokio::io::duplex` pair standing in for the RFCOMM socket.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use hfp_rfcomm_engine::{
    config::Config,
    engine,
    protocol::Codec,
    signal,
    transport::{Device, PropertyMask, PropertySink, Transport},
    Role,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

/// A [`PropertySink`] spy that records every notification it receives.
#[derive(Default)]
struct SpySink {
    events: Mutex<Vec<PropertyMask>>,
}

impl SpySink {
    fn saw(&self, pred: impl Fn(&PropertyMask) -> bool) -> bool {
        self.events.lock().unwrap().iter().any(pred)
    }
}

impl PropertySink for SpySink {
    fn notify(&self, changed: PropertyMask) {
        self.events.lock().unwrap().push(changed);
    }
}

struct Harness {
    peer: BufReader<DuplexStream>,
    transport: Arc<Transport>,
    device: Arc<Device>,
    sink: Arc<SpySink>,
    signal_tx: signal::SignalSender,
    engine: tokio::task::JoinHandle<hfp_rfcomm_engine::error::Result<()>>,
}

impl Harness {
    /// Reads and trims one AT line sent by the engine.
    async fn expect(&mut self, want: &str) {
        let mut line = String::new();
        self.peer.read_line(&mut line).await.unwrap();
        assert_eq!(line.trim_end_matches(['\r', '\n']), want, "unexpected line from engine");
    }

    /// Sends one AT line to the engine, as the peer would.
    async fn send(&mut self, line: &str) {
        self.peer.write_all(format!("{line}\r\n").as_bytes()).await.unwrap();
    }
}

fn spawn(role: Role, config: Config) -> Harness {
    let (engine_side, peer_side) = tokio::io::duplex(4096);
    let transport = Arc::new(Transport::default());
    let device = Arc::new(Device::default());
    let sink = Arc::new(SpySink::default());
    let (signal_tx, signal_rx) = signal::channel();

    let engine = tokio::spawn(engine::run(
        engine_side,
        role,
        config,
        transport.clone(),
        device.clone(),
        sink.clone(),
        signal_rx,
        None,
        None,
    ));

    Harness { peer: BufReader::new(peer_side), transport, device, sink, signal_tx, engine }
}

/// Scenario 1: HF-role full SLC, AG supports codec negotiation (mSBC ends up selected).
#[tokio::test]
async fn hf_full_slc_with_codec_negotiation() {
    let config = Config { features_rfcomm_hf: 0x23F, ..Default::default() };
    let mut h = spawn(Role::Hf, config);

    h.expect("AT+BRSF=575").await;
    h.send("+BRSF: 512").await;
    h.send("OK").await;

    h.expect("AT+BAC=1,2").await;
    h.send("OK").await;

    h.expect("AT+CIND=?").await;
    h.send("+CIND: (call,(0,1)),(callsetup,(0-3)),(service,(0-1)),(signal,(0-5)),(roam,(0-1)),(battchg,(0-5)),(callheld,(0-2))")
        .await;
    h.send("OK").await;

    h.expect("AT+CIND?").await;
    h.send("+CIND: 0,0,1,4,0,3,0").await;
    h.send("OK").await;

    h.expect("AT+CMER=3,0,0,1,0").await;
    h.send("OK").await;

    // AG-initiated codec selection.
    h.send("+BCS: 2").await;
    h.expect("AT+BCS=2").await;
    h.send("OK").await;

    // Give the engine one scheduling slot to process the final OK.
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(h.transport.codec(), Codec::Msbc);
    assert!(h.sink.saw(|m| m.sampling && m.codec));

    h.engine.abort();
}

/// Scenario 2: AG-role SLC without codec negotiation — the HF's `AT+BRSF=` omits the codec bit,
/// so the engine forces CVSD and advances straight past `+BCS` to `Connected`.
#[tokio::test]
async fn ag_slc_without_codec_negotiation() {
    let config = Config { features_rfcomm_ag: 0x200, ..Default::default() };
    let mut h = spawn(Role::Ag, config);

    h.send("AT+BRSF=319").await;
    let mut line = String::new();
    h.peer.read_line(&mut line).await.unwrap();
    assert!(line.starts_with("+BRSF:"), "expected +BRSF: reply, got {line:?}");
    let mut ok = String::new();
    h.peer.read_line(&mut ok).await.unwrap();
    assert_eq!(ok.trim_end_matches(['\r', '\n']), "OK");
    assert_eq!(h.transport.codec(), Codec::Cvsd);

    h.send("AT+CIND=?").await;
    let mut vocab = String::new();
    h.peer.read_line(&mut vocab).await.unwrap();
    assert!(vocab.starts_with("+CIND:"));
    h.expect("OK").await;

    h.send("AT+CIND?").await;
    let mut values = String::new();
    h.peer.read_line(&mut values).await.unwrap();
    assert_eq!(values.trim_end_matches(['\r', '\n']), "+CIND: 0,0,0,0,0,0,0");
    h.expect("OK").await;

    h.send("AT+CMER=3,0,0,1,0").await;
    h.expect("OK").await;

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(h.sink.saw(|m| m.sampling && m.codec));

    h.engine.abort();
}

/// Brings an HF-role session all the way to `Connected` with codec negotiation, for scenarios
/// that only care about post-SLC behavior.
async fn connect_hf(h: &mut Harness) {
    h.expect("AT+BRSF=575").await;
    h.send("+BRSF: 512").await;
    h.send("OK").await;
    h.expect("AT+BAC=1,2").await;
    h.send("OK").await;
    h.expect("AT+CIND=?").await;
    h.send("+CIND: (call,(0,1)),(callsetup,(0-3)),(service,(0-1)),(signal,(0-5)),(roam,(0-1)),(battchg,(0-5)),(callheld,(0-2))")
        .await;
    h.send("OK").await;
    h.expect("AT+CIND?").await;
    h.send("+CIND: 0,0,1,4,0,0,0").await;
    h.send("OK").await;
    h.expect("AT+CMER=3,0,0,1,0").await;
    h.send("OK").await;
    h.send("+BCS: 1").await;
    h.expect("AT+BCS=1").await;
    h.send("OK").await;
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Scenario 3: volume propagation in both directions once connected.
#[tokio::test]
async fn volume_propagation() {
    let config = Config { features_rfcomm_hf: 0x23F, ..Default::default() };
    let mut h = spawn(Role::Hf, config);
    connect_hf(&mut h).await;

    h.transport.set_spk_gain(10);
    h.signal_tx.send(signal::Signal::SetVolume).await.unwrap();
    h.expect("AT+VGS=10").await;

    h.send("AT+VGM=7").await;
    h.expect("OK").await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.transport.mic_gain(), 7);
    assert!(h.sink.saw(|m| m.volume));

    h.engine.abort();
}

/// Scenario 4: an unsolicited `+CIEV:` battery update recomputes and republishes battery level.
#[tokio::test]
async fn ciev_battery_update() {
    let config = Config { features_rfcomm_hf: 0x23F, ..Default::default() };
    let mut h = spawn(Role::Hf, config);
    connect_hf(&mut h).await;

    h.send("+CIEV: 6,3").await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(h.device.battery_level(), 60);
    assert!(h.sink.saw(|m| m.battery));

    h.engine.abort();
}

/// Scenario 5: the AG never answers `AT+BRSF=`; the engine retries a bounded number of times and
/// then fails with `TimedOut`.
#[tokio::test]
async fn slc_timeout_gives_up() {
    let config = Config { features_rfcomm_hf: 0x23F, slc_retries: 2, slc_timeout_ms: 15, ..Default::default() };
    let mut h = spawn(Role::Hf, config);

    h.expect("AT+BRSF=575").await;
    // Peer never replies; the engine must resend the same frame on each timeout.
    h.expect("AT+BRSF=575").await;
    h.expect("AT+BRSF=575").await;

    let result = tokio::time::timeout(Duration::from_secs(2), h.engine).await.expect("engine did not exit").unwrap();
    assert!(matches!(result, Err(hfp_rfcomm_engine::Error::TimedOut(_))));
}

/// Scenario 6: an unrecognized command gets a synthesized `ERROR` when no external handler is
/// wired up, and the session continues afterward.
#[tokio::test]
async fn unsupported_command_gets_error() {
    let config = Config { features_rfcomm_hf: 0x23F, ..Default::default() };
    let mut h = spawn(Role::Hf, config);
    connect_hf(&mut h).await;

    h.send("AT+XYZZY=1").await;
    h.expect("ERROR").await;

    // Session keeps running: a later, recognized frame still works.
    h.transport.set_spk_gain(5);
    h.signal_tx.send(signal::Signal::SetVolume).await.unwrap();
    h.expect("AT+VGS=5").await;

    h.engine.abort();
}
