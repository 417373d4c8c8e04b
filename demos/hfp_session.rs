//! Connects to, or listens for, an HFP RFCOMM control channel and drives one session.

use std::{process::exit, sync::Arc};

use clap::Parser;
use hfp_rfcomm_engine::{
    config::Config,
    engine,
    rfcomm::{Listener, Socket, SocketAddr},
    signal,
    transport::{Device, NullPropertySink, Transport},
    Address, Role,
};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[clap(
    name = "hfp-session",
    about = "Drive one HFP RFCOMM control-channel session.",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Opts {
    /// Run as the Hands-Free side instead of the Audio Gateway side.
    #[clap(long)]
    hf: bool,
    /// Address of local Bluetooth adapter to bind to.
    #[clap(long, short)]
    bind: Option<Address>,
    #[clap(subcommand)]
    cmd: Cmd,
}

#[derive(Parser)]
enum Cmd {
    /// Connect to a remote device's RFCOMM channel.
    Connect {
        /// Bluetooth address of the remote device.
        address: Address,
        /// Remote RFCOMM channel, normally discovered via SDP beforehand.
        channel: u8,
    },
    /// Listen for an incoming RFCOMM connection.
    Listen {
        /// Local RFCOMM channel to listen on. 0 auto-allocates one.
        channel: u8,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::init();
    let opts = Opts::parse();

    let role = if opts.hf { Role::Hf } else { Role::Ag };
    let stream = match opts.cmd {
        Cmd::Connect { address, channel } => {
            let socket = Socket::new()?;
            let local_sa = match opts.bind {
                Some(bind_addr) => SocketAddr::new(bind_addr, 0),
                None => SocketAddr::any(),
            };
            socket.bind(local_sa)?;
            socket.connect(SocketAddr::new(address, channel)).await?
        }
        Cmd::Listen { channel } => {
            let local_sa = SocketAddr::new(opts.bind.unwrap_or_else(Address::any), channel);
            let listener = Listener::bind(local_sa).await?;
            let bound = listener.as_ref().local_addr()?;
            eprintln!("listening on channel {}", bound.channel);
            let (stream, peer_sa) = listener.accept().await?;
            eprintln!("connected from {}", peer_sa.addr);
            stream
        }
    };

    let config = Config::default();
    let transport = Arc::new(Transport::default());
    let device = Arc::new(Device::default());
    let (_signal_tx, signal_rx) = signal::channel();

    let result =
        engine::run(stream, role, config, transport, device, Arc::new(NullPropertySink), signal_rx, None, None)
            .await;

    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            eprintln!("session ended: {err}");
            exit(1)
        }
    }
}
