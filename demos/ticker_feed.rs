//! Live ticker fed over TCP into a keyed container
//!
//! Run with: cargo run --example ticker_feed [SECONDS]
//!
//! Starts a local quote server on an ephemeral port, connects a
//! `ReconnectingSocket` to it and keeps the latest quote per symbol in a
//! `SubscriptionContainer`. The server hangs up after every few quotes; the
//! demo reopens the feed each time and re-sends its subscribe request, and
//! the container keeps its contents across sessions.
//!
//! Set `RUST_LOG=livefeed=debug` to watch the socket state machine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use livefeed::buffer::UniqueArrayBuffer;
use livefeed::container::{ContainerConfig, ContainerEvent, SubscriberContainer, SubscriptionContainer};
use livefeed::socket::{BinaryType, ReconnectingSocketEvent, SocketEvent};
use livefeed::{Message, ReconnectingSocket, SocketConfig, TcpConnector};

const SYMBOLS: [&str; 4] = ["AAPL", "MSFT", "NVDA", "TSLA"];
const QUOTES_PER_SESSION: u64 = 12;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Quote {
    symbol: String,
    price: f64,
    seq: u64,
}

#[derive(Debug, Serialize)]
struct SubscribeRequest<'a> {
    action: &'a str,
    symbols: &'a [&'a str],
}

type QuoteBuffer = UniqueArrayBuffer<Quote, String>;

/// Serve one session: read the subscribe request, stream quotes, hang up
async fn serve(mut stream: TcpStream, seq: Arc<AtomicU64>) -> std::io::Result<()> {
    let mut request = vec![0u8; 1024];
    let n = stream.read(&mut request).await?;
    tracing::info!(request = %String::from_utf8_lossy(&request[..n]), "Quote server got request");

    let mut ticker = tokio::time::interval(Duration::from_millis(150));
    for _ in 0..QUOTES_PER_SESSION {
        ticker.tick().await;
        let n = seq.fetch_add(1, Ordering::Relaxed);
        let quote = Quote {
            symbol: SYMBOLS[(n as usize) % SYMBOLS.len()].to_string(),
            price: 100.0 + ((n * 37) % 500) as f64 / 10.0,
            seq: n,
        };
        let mut line = serde_json::to_vec(&quote).map_err(std::io::Error::other)?;
        line.push(b'\n');
        stream.write_all(&line).await?;
    }
    Ok(())
}

async fn run_server(listener: TcpListener) {
    let seq = Arc::new(AtomicU64::new(0));
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::error!(error = %e, "Accept failed");
                continue;
            }
        };
        tracing::debug!(peer = %peer, "Quote client connected");
        let seq = Arc::clone(&seq);
        tokio::spawn(async move {
            if let Err(e) = serve(stream, seq).await {
                tracing::debug!(error = %e, "Quote session ended");
            }
        });
    }
}

/// Turn socket responses into keyed updates
fn on_feed(event: &ReconnectingSocketEvent, quotes: &SubscriberContainer<Quote, QuoteBuffer>) {
    let ReconnectingSocketEvent::Socket(SocketEvent::Response(Message::Text(text))) = event else {
        return;
    };
    let batch: Vec<Quote> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(quote) => Some(quote),
            Err(e) => {
                tracing::warn!(error = %e, line, "Skipping malformed quote");
                None
            }
        })
        .collect();
    if !batch.is_empty() {
        quotes.update_items(batch);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let seconds: u64 = match std::env::args().nth(1) {
        Some(arg) => arg.parse()?,
        None => 6,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("livefeed=info".parse()?)
                .add_directive("ticker_feed=info".parse()?),
        )
        .init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(run_server(listener));
    println!("Quote server listening on {}", addr);

    let feed = ReconnectingSocket::new(
        format!("tcp://{}", addr),
        Arc::new(TcpConnector::new()),
        SocketConfig::new().binary_type(BinaryType::Text),
    );

    let buffer = UniqueArrayBuffer::new(Arc::new(|quote: &Quote| quote.symbol.clone()));
    let quotes = SubscriptionContainer::new(
        feed.subscribable().clone(),
        on_feed,
        buffer,
        &ContainerConfig::new().max_queue_size(SYMBOLS.len()),
    );

    let _board = quotes.subscribe_filtered(
        |event| {
            if let ContainerEvent::Update(element) = event {
                for quote in element.add.iter().chain(element.update.iter()).flatten() {
                    println!("{:>5} {:>8.2}  (#{})", quote.symbol, quote.price, quote.seq);
                }
            }
        },
        &["update"],
    );

    let control = feed.clone();
    let status = feed.subscribe_filtered(
        move |event| match event {
            ReconnectingSocketEvent::Connected => {
                println!("-- connected");
                let request = SubscribeRequest {
                    action: "subscribe",
                    symbols: &SYMBOLS,
                };
                if let Err(e) = control.send_object(&request) {
                    tracing::error!(error = %e, "Failed to send subscribe request");
                }
            }
            ReconnectingSocketEvent::Socket(SocketEvent::Close(info)) => {
                println!("-- session closed (code {}), reopening", info.code);
                control.open();
            }
            ReconnectingSocketEvent::Disconnected(info) => {
                println!("-- disconnected: {}", info.reason);
            }
            _ => {}
        },
        &["connected", "close", "disconnected"],
    );

    feed.open();
    tokio::time::sleep(Duration::from_secs(seconds)).await;

    // Stop reopening before the final close
    drop(status);
    feed.close();

    println!();
    println!("Latest quotes:");
    for quote in quotes.buffered_items() {
        println!("{:>5} {:>8.2}", quote.symbol, quote.price);
    }
    Ok(())
}
