use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::{info, warn};

use bloomshare::{setup_logging, Config, Node, NodeEvent, Result};

#[derive(Parser)]
#[command(name = "bloomshare")]
#[command(about = "Bloom-filter based P2P file discovery and transfer")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a node that indexes a directory and serves/relays queries
    Start {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Directory to index and share
        #[arg(short, long, default_value = "./shared")]
        dir: PathBuf,
        /// Peer addresses to connect to at startup (host:port)
        #[arg(short, long)]
        connect: Vec<SocketAddr>,
        /// Request this file from the first connected peer once running
        #[arg(short, long)]
        fetch: Option<String>,
    },
    /// Fetch one file through a peer and exit
    Fetch {
        /// File name to look up in the overlay
        #[arg(long)]
        file: String,
        /// Peer to send the query to (host:port)
        #[arg(short, long)]
        peer: SocketAddr,
        /// Directory to save the received file into
        #[arg(short, long, default_value = "./downloads")]
        dir: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start {
            port,
            dir,
            connect,
            fetch,
        } => {
            let config = Config {
                port,
                shared_dir: dir,
                peers: connect.clone(),
                ..Config::default()
            };

            let mut node = Node::new(config).await?;
            let mut events = node.take_events().expect("fresh node has its event stream");

            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    match event {
                        NodeEvent::FileReceived { filename, saved_to } => {
                            info!("Received {} -> {:?}", filename, saved_to);
                        }
                        NodeEvent::FileUnavailable { filename, .. } => {
                            warn!("File {} not found in the network", filename);
                        }
                    }
                }
            });

            if let Some(filename) = fetch {
                match connect.first() {
                    Some(peer) => {
                        let peer = *peer;
                        node.connect_peer(peer).await?;
                        node.request_file(&filename, peer).await?;
                    }
                    None => warn!("--fetch given without --connect, nothing to query"),
                }
            }

            node.run().await?;
        }
        Commands::Fetch { file, peer, dir } => {
            let config = Config {
                port: 0,
                shared_dir: dir,
                peers: vec![peer],
                ..Config::default()
            };

            let mut node = Node::new(config).await?;
            let mut events = node.take_events().expect("fresh node has its event stream");

            node.connect_peer(peer).await?;
            let request_id = node.request_file(&file, peer).await?;

            while let Some(event) = events.recv().await {
                match event {
                    NodeEvent::FileReceived { filename, saved_to } if filename == file => {
                        println!("Download completed: {:?}", saved_to);
                        break;
                    }
                    NodeEvent::FileUnavailable {
                        filename,
                        request_id: id,
                    } if id == request_id => {
                        println!("File {} not found in the network", filename);
                        std::process::exit(1);
                    }
                    _ => {}
                }
            }
        }
    }

    Ok(())
}
