//! Load generator for the relay.
//!
//! Opens N WebSocket clients, each announcing a fixed point near the origin
//! once a second and draining whatever the relay sends back. Clients
//! reconnect after any failure.

use anyhow::{Context, Result};
use clap::Parser;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use serde_json::json;
use std::time::Duration;
use tokio::time::{interval, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Interval between location updates.
const FREQUENCY: Duration = Duration::from_secs(1);
const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Width, in degrees, of the square clients are scattered over.
const SPREAD: f64 = 0.06;

#[derive(Parser, Debug)]
#[command(name = "simload")]
#[command(about = "Simulated clients for the geofence relay")]
struct Args {
    /// Relay address (host:port)
    #[arg(short = 'a', long, default_value = "127.0.0.1:8000")]
    addr: String,

    /// Number of clients
    #[arg(short = 'n', long, default_value = "100")]
    clients: usize,

    /// Origin as a GeoJSON position, [lng,lat]
    #[arg(short = 'c', long, default_value = "[-104.99649808,39.74254437]")]
    coords: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Origin {
    lat: f64,
    lng: f64,
}

fn parse_origin(coords: &str) -> Result<Origin> {
    let [lng, lat]: [f64; 2] =
        serde_json::from_str(coords).context("coords must be [lng,lat]")?;
    Ok(Origin { lat, lng })
}

fn jitter<R: Rng>(origin: Origin, rng: &mut R) -> Origin {
    Origin {
        lat: origin.lat + rng.gen::<f64>() * SPREAD - SPREAD / 2.0,
        lng: origin.lng + rng.gen::<f64>() * SPREAD - SPREAD / 2.0,
    }
}

fn random_id<R: Rng>(rng: &mut R) -> String {
    let bytes: [u8; 12] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn location_feature(id: &str, position: Origin) -> String {
    json!({
        "type": "Feature",
        "geometry": {"type": "Point", "coordinates": [position.lng, position.lat]},
        "id": id,
        "properties": {"color": "red"}
    })
    .to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let origin = parse_origin(&args.coords)?;
    let url = format!("ws://{}/ws", args.addr);
    info!("Firing up {} clients against {}", args.clients, url);

    let mut handles = Vec::with_capacity(args.clients);
    for idx in 0..args.clients {
        handles.push(tokio::spawn(run_client(idx, url.clone(), origin)));
    }
    futures::future::join_all(handles).await;
    Ok(())
}

async fn run_client(idx: usize, url: String, origin: Origin) {
    let (id, position, startup) = {
        let mut rng = rand::thread_rng();
        (
            random_id(&mut rng),
            jitter(origin, &mut rng),
            Duration::from_secs_f64(rng.gen::<f64>() * 2.0),
        )
    };
    let feature = location_feature(&id, position);
    sleep(startup).await;

    loop {
        match session(idx, &url, &feature).await {
            Ok(()) => info!("Client {} disconnected", idx),
            Err(e) => warn!("Client {}: {:#}", idx, e),
        }
        sleep(RECONNECT_DELAY).await;
    }
}

/// One connection: send the location every tick, read until the stream ends.
async fn session(idx: usize, url: &str, feature: &str) -> Result<()> {
    let (ws, _) = connect_async(url).await.context("connect")?;
    info!("Client {} connected", idx);
    let (mut write, mut read) = ws.split();
    let mut ticker = interval(FREQUENCY);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                write.send(Message::Text(feature.into())).await.context("send")?;
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("read"),
                    None => return Ok(()),
                }
            }
        }
    }
}
