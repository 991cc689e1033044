//! Entry point for `file-transfer`.
//!
//! Parses CLI arguments and dispatches into either **send** or **receive**
//! mode.  All protocol work is delegated to library modules; `main.rs` owns
//! only process setup (logging, argument parsing, output directory).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use file_transfer::socket::DatagramSocket;
use file_transfer::{session, TransferConfig};
use tokio::net::TcpListener;

/// Send a file over TCP, or over UDP with selective-repeat reliability.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Send one file to a waiting receiver.
    Send {
        /// Receiver address (e.g. 127.0.0.1:9000).
        #[arg(short, long)]
        peer: SocketAddr,
        /// Transport to use.
        #[arg(short, long, value_enum, default_value_t = Transport::Udp)]
        transport: Transport,
        #[command(flatten)]
        tuning: Tuning,
        /// File to send.
        file: PathBuf,
    },
    /// Wait for one file and write it to the output directory.
    Receive {
        /// Local address to bind (e.g. 0.0.0.0:9000).
        #[arg(short, long, default_value = "0.0.0.0:9000")]
        bind: SocketAddr,
        /// Transport to use.
        #[arg(short, long, value_enum, default_value_t = Transport::Udp)]
        transport: Transport,
        #[command(flatten)]
        tuning: Tuning,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Transport {
    Udp,
    Tcp,
}

#[derive(Args)]
struct Tuning {
    /// Fixed size of every packet; both ends must agree.
    #[arg(long, default_value_t = 1024)]
    packet_size: usize,
    /// Maximum unacknowledged packets in flight.
    #[arg(long, default_value_t = 100)]
    window: usize,
    /// Retransmission timeout.
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,
    /// Longest wait between ack checks.
    #[arg(long, default_value_t = 50)]
    poll_ms: u64,
    /// Directory received files are written into.
    #[arg(long, default_value = "./downloads")]
    output_dir: PathBuf,
}

impl From<Tuning> for TransferConfig {
    fn from(t: Tuning) -> Self {
        TransferConfig {
            packet_size: t.packet_size,
            window_size: t.window,
            timeout: Duration::from_millis(t.timeout_ms),
            poll_interval: Duration::from_millis(t.poll_ms),
            output_dir: t.output_dir,
            ..TransferConfig::default()
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::init();

    let cli = Cli::parse();
    if let Err(e) = run(cli.mode).await {
        log::error!("{e}");
        process::exit(1);
    }
}

async fn run(mode: Mode) -> file_transfer::Result<()> {
    match mode {
        Mode::Send {
            peer,
            transport,
            tuning,
            file,
        } => {
            let config = TransferConfig::from(tuning);
            match transport {
                Transport::Udp => {
                    let report = session::send_datagram_file(&file, peer, config).await?;
                    log::info!(
                        "Sent {} bytes ({} data + {} control packets, {} retransmissions, peak window {})",
                        report.bytes,
                        report.data_packets,
                        report.control_packets,
                        report.retransmissions,
                        report.peak_in_flight
                    );
                }
                Transport::Tcp => {
                    let sent = session::send_stream_file(&file, peer, config).await?;
                    log::info!("Sent {sent} bytes");
                }
            }
        }
        Mode::Receive {
            bind,
            transport,
            tuning,
        } => {
            let config = TransferConfig::from(tuning);
            config.validate()?;
            tokio::fs::create_dir_all(&config.output_dir).await?;
            let path = match transport {
                Transport::Udp => {
                    let socket = DatagramSocket::bind(bind, config.packet_size).await?;
                    session::receive_datagram_file(&socket, config).await?
                }
                Transport::Tcp => {
                    let listener = TcpListener::bind(bind).await?;
                    log::info!("[tcp] listening on {bind}");
                    session::receive_stream_file(&listener, config).await?
                }
            };
            log::info!("Received {}", path.display());
        }
    }
    Ok(())
}
