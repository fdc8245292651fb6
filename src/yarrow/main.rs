// Copyright Kyler Chin <kyler@catenarymaps.org>
// Catenary Transit Initiatives
// Attribution cannot be removed

// Haptic turn-by-turn navigator. Plans a route, then feeds maneuver commands
// to the device link as position updates stream in on stdin.

use anyhow::Context;
use clap::Parser;
use haptisteer::Coordinate;
use haptisteer::directions::{DirectionsProvider, GoogleDirectionsClient, Origin};
use haptisteer::location::SharedPosition;
use haptisteer::maneuver::DEFAULT_MANEUVER;
use haptisteer::navigation::{NavConfig, NavigationSession};
use haptisteer::route::NavRoute;
use haptisteer::transport::LogTransport;
use log::{info, warn};
use std::time::Duration;
use tokio::io::AsyncBufReadExt;

#[derive(Parser, Debug)]
#[command(author, version, about = "Haptic turn-by-turn navigator", long_about = None)]
struct Args {
    /// Route origin, an address or "lat,lng"
    #[arg(long)]
    origin: String,

    /// Route destination
    #[arg(long)]
    destination: String,

    /// Travel mode passed to the directions provider
    #[arg(long, default_value = "driving")]
    mode: String,

    /// Distance from the step path (meters) that counts as off route
    #[arg(long, default_value_t = 25.0)]
    off_route_threshold_m: f64,

    /// Distance to the turn point (meters) that triggers the maneuver command
    #[arg(long, default_value_t = 15.0)]
    advance_threshold_m: f64,

    /// Decision cycle period in milliseconds
    #[arg(long, default_value_t = 500)]
    tick_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let api_key =
        std::env::var("GOOGLE_MAPS_API_KEY").context("GOOGLE_MAPS_API_KEY must be set")?;
    let directions = GoogleDirectionsClient::new(api_key)?;

    let response = directions
        .get_route(
            &Origin::Address(args.origin.clone()),
            &args.destination,
            &args.mode,
        )
        .await?;
    let route = NavRoute::from_response(&response)?;

    for step in route.steps() {
        info!(
            "step {}: {} towards {}",
            step.step_index,
            step.maneuver.as_deref().unwrap_or(DEFAULT_MANEUVER),
            step.end_location
        );
    }

    // GPS feed: "lat,lng" lines on stdin update the shared snapshot
    let position = SharedPosition::new();
    let feed = position.clone();
    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match parse_position(&line) {
                Some(coordinate) => feed.update(coordinate),
                None => warn!("ignoring unparseable position line: {line:?}"),
            }
        }
    });

    let config = NavConfig {
        off_route_threshold_m: args.off_route_threshold_m,
        advance_threshold_m: args.advance_threshold_m,
        tick_interval: Duration::from_millis(args.tick_ms),
        travel_mode: args.mode,
    };

    let (session, handle) = NavigationSession::new(
        route,
        position,
        directions,
        LogTransport,
        args.destination,
        config,
    );

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping session");
            handle.stop();
        }
    });

    let final_state = session.run().await;
    info!("session ended: {final_state:?}");

    Ok(())
}

/// Parses a `"lat,lng"` line into a coordinate.
fn parse_position(line: &str) -> Option<Coordinate> {
    let (lat, lng) = line.split_once(',')?;
    let coordinate = Coordinate::new(lat.trim().parse().ok()?, lng.trim().parse().ok()?);
    coordinate.is_valid().then_some(coordinate)
}
