use anyhow::Result;
use clap::Parser;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};

use arcanefall::NetMessage;

/// State-mirroring relay: pairs two websocket peers and forwards their
/// messages verbatim. The simulation itself never runs here.
#[derive(Parser, Debug)]
struct Opts {
    /// Address to listen for websocket connections
    #[arg(long, default_value = "127.0.0.1:9100")]
    listen: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let opts = Opts::parse();
    let listener = TcpListener::bind(&opts.listen).await?;
    println!("Relay listening on ws://{}", opts.listen);

    loop {
        let (stream_a, addr_a) = listener.accept().await?;
        println!("Peer connected: {}", addr_a);
        let (stream_b, addr_b) = listener.accept().await?;
        println!("Peer connected: {}, match starting", addr_b);
        tokio::spawn(async move {
            if let Err(e) = relay_pair(stream_a, stream_b).await {
                eprintln!("relay error ({} <-> {}): {:?}", addr_a, addr_b, e);
            }
        });
    }
}

async fn relay_pair(a: TcpStream, b: TcpStream) -> Result<()> {
    let ws_a = accept_async(a).await?;
    let ws_b = accept_async(b).await?;
    let (mut tx_a, mut rx_a) = ws_a.split();
    let (mut tx_b, mut rx_b) = ws_b.split();

    loop {
        tokio::select! {
            Some(msg) = rx_a.next() => {
                match msg? {
                    Message::Text(text) => {
                        log_envelope(&text);
                        tx_b.send(Message::Text(text)).await?;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(msg) = rx_b.next() => {
                match msg? {
                    Message::Text(text) => {
                        log_envelope(&text);
                        tx_a.send(Message::Text(text)).await?;
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            else => break,
        }
    }
    Ok(())
}

fn log_envelope(text: &str) {
    if let Ok(message) = serde_json::from_str::<NetMessage>(text) {
        log::debug!("relay {} from {}", message.kind, message.player_id);
    }
}
