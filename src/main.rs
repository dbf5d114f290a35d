// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! shiptrack - command-line front end for the shipment tracking engine.

mod config;
mod router;
mod session_manager;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info};
use shipment_tracker::{
    Clock, Coordinates, HttpBackend, InMemoryBackend, Location, ManualClock, MovementStatus,
    RouteResolver, SystemClock, TrackerConfig, TrackingEvent, TrackingSession, TrackingView,
};

use config::AppConfig;
use router::Router;
use session_manager::SessionManager;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// How often `track` prints a status line.
const STATUS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "shiptrack", version)]
#[command(about = "Track dealership vehicle shipments along their delivery route", long_about = None)]
struct Cli {
    /// Storefront API base URL (overrides config)
    #[arg(long, global = true)]
    backend_url: Option<String>,

    /// OSRM server URL (overrides config)
    #[arg(long, global = true)]
    routing_url: Option<String>,

    /// Route along great-circle lines instead of calling OSRM
    #[arg(long, global = true)]
    offline_routing: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow shipments until all are delivered or Ctrl-C is pressed
    Track {
        #[arg(required = true)]
        order_ids: Vec<String>,
    },
    /// Create a shipment and resolve its route
    Create {
        order_id: String,
        /// Origin as "lat,lng"
        #[arg(long, value_parser = parse_coordinates)]
        from: Coordinates,
        /// Destination as "lat,lng"
        #[arg(long, value_parser = parse_coordinates)]
        to: Coordinates,
        /// Human-readable delivery address
        #[arg(long)]
        address: Option<String>,
    },
    /// Start or resume a shipment
    Start { order_id: String },
    /// Pause a shipment in transit
    Pause { order_id: String },
    /// Change the destination of a shipment that has not started
    SetDestination {
        order_id: String,
        #[arg(long, value_parser = parse_coordinates)]
        to: Coordinates,
        #[arg(long)]
        address: Option<String>,
    },
    /// Resolve and print a route without creating a shipment
    Route {
        #[arg(long, value_parser = parse_coordinates)]
        from: Coordinates,
        #[arg(long, value_parser = parse_coordinates)]
        to: Coordinates,
    },
    /// Run an offline trip with an in-memory backend, one simulated minute per tick
    Simulate {
        #[arg(long, value_parser = parse_coordinates)]
        from: Coordinates,
        #[arg(long, value_parser = parse_coordinates)]
        to: Coordinates,
        /// Stop after this many simulated minutes even if not delivered
        #[arg(long, default_value_t = 240)]
        minutes: u32,
    },
    /// Show the config file location and effective values
    Config {
        /// Persist a new storefront API base URL
        #[arg(long)]
        set_backend_url: Option<String>,
        /// Persist a new OSRM server URL
        #[arg(long)]
        set_routing_url: Option<String>,
    },
}

fn parse_coordinates(s: &str) -> Result<Coordinates, String> {
    let (lat, lng) = s
        .split_once(',')
        .ok_or_else(|| format!("expected \"lat,lng\", got {s:?}"))?;
    let lat: f64 = lat.trim().parse().map_err(|e| format!("latitude {lat:?}: {e}"))?;
    let lng: f64 = lng.trim().parse().map_err(|e| format!("longitude {lng:?}: {e}"))?;
    let coordinates = Coordinates::new(lat, lng);
    coordinates.validate().map_err(|e| e.to_string())?;
    Ok(coordinates)
}

fn destination(to: Coordinates, address: Option<String>) -> Location {
    match address {
        Some(address) => Location::from(to).with_address(address),
        None => Location::from(to),
    }
}

fn print_view(view: &TrackingView, countdown: &str) {
    println!(
        "[{}] {:<11} {:>5.1}%  at {}  remaining {}  ({:.1} km route)",
        view.order_id, view.movement_status, view.progress, view.current_location, countdown, view.distance_km
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = AppConfig::load()?;
    if let Some(url) = &cli.backend_url {
        config.backend_url.clone_from(url);
    }
    if let Some(url) = &cli.routing_url {
        config.routing_url.clone_from(url);
    }

    match cli.command {
        Command::Config {
            set_backend_url,
            set_routing_url,
        } => show_config(set_backend_url, set_routing_url)?,
        Command::Route { from, to } => {
            let router = Router::from_config(&config, cli.offline_routing)?;
            let resolver = RouteResolver::new(router, config.tracker_config().resolver);
            let route = resolver.resolve_with_retry(from, to).await?;
            println!(
                "{} -> {}: {:.2} km, {:.1} min, {} waypoints",
                from,
                to,
                route.distance_km,
                route.duration_min,
                route.waypoints.len()
            );
            for point in &route.waypoints {
                println!("  {point}");
            }
        }
        Command::Simulate { from, to, minutes } => simulate(&config, from, to, minutes).await?,
        command => run_against_backend(&config, cli.offline_routing, command).await?,
    }
    Ok(())
}

fn show_config(set_backend_url: Option<String>, set_routing_url: Option<String>) -> Result<(), Box<dyn Error>> {
    let mut stored = AppConfig::load()?;
    if set_backend_url.is_some() || set_routing_url.is_some() {
        if let Some(url) = set_backend_url {
            stored.backend_url = url;
        }
        if let Some(url) = set_routing_url {
            stored.routing_url = url;
        }
        stored.save()?;
        info!("Configuration saved");
    }

    println!("Config file: {}", AppConfig::config_path()?.display());
    println!("backend_url     = {}", stored.backend_url);
    println!(
        "backend_token   = {}",
        if stored.resolve_token().is_some() { "<set>" } else { "<none>" }
    );
    println!("routing_url     = {}", stored.routing_url);
    println!("routing_profile = {}", stored.routing_profile);
    println!(
        "poll            = {}s on transit, {}s otherwise",
        stored.poll_on_transit_secs, stored.poll_idle_secs
    );
    println!("save            = {}s", stored.save_secs);
    Ok(())
}

async fn run_against_backend(config: &AppConfig, offline: bool, command: Command) -> Result<(), Box<dyn Error>> {
    let backend = Arc::new(HttpBackend::new(&config.backend_url, config.resolve_token())?);
    let router = Router::from_config(config, offline)?;
    let mut sessions = SessionManager::new(backend, router, Arc::new(SystemClock), config.tracker_config());

    match command {
        Command::Track { order_ids } => {
            for order_id in &order_ids {
                sessions.open(order_id).await?;
            }
            track(&mut sessions).await;
        }
        Command::Create {
            order_id,
            from,
            to,
            address,
        } => {
            let session = sessions
                .create(&order_id, Location::from(from), destination(to, address))
                .await?;
            print_view(&session.view(), &session.countdown().to_string());
        }
        Command::Start { order_id } => {
            let session = sessions.open(&order_id).await?;
            session.start().await?;
            print_view(&session.view(), &session.countdown().to_string());
        }
        Command::Pause { order_id } => {
            let session = sessions.open(&order_id).await?;
            session.pause().await?;
            print_view(&session.view(), &session.countdown().to_string());
        }
        Command::SetDestination { order_id, to, address } => {
            let session = sessions.open(&order_id).await?;
            session.set_destination(destination(to, address)).await?;
            print_view(&session.view(), &session.countdown().to_string());
        }
        Command::Route { .. } | Command::Simulate { .. } | Command::Config { .. } => {}
    }

    sessions.stop_all().await;
    Ok(())
}

async fn track<B, P>(sessions: &mut SessionManager<B, P>)
where
    B: shipment_tracker::ShipmentBackend + 'static,
    P: shipment_tracker::RoutingProvider + Clone,
{
    let mut interval = tokio::time::interval(STATUS_INTERVAL);
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl-C: {}", e);
                }
                info!("Interrupted");
                break;
            }
            _ = interval.tick() => {
                for view in sessions.views() {
                    let countdown = sessions
                        .get(&view.order_id)
                        .map(|s| s.countdown().to_string())
                        .unwrap_or_default();
                    print_view(&view, &countdown);
                }
                if sessions.all_delivered() {
                    info!("All shipments delivered");
                    break;
                }
            }
        }
    }
}

async fn simulate(config: &AppConfig, from: Coordinates, to: Coordinates, minutes: u32) -> Result<(), Box<dyn Error>> {
    let clock = ManualClock::new(SystemClock.now());
    let backend = Arc::new(InMemoryBackend::new(Arc::new(clock.clone())));
    let router = Router::from_config(config, true)?;
    let tick = Duration::from_millis(100);
    let tracker = TrackerConfig {
        tick_interval: tick,
        countdown_interval: tick,
        ..config.tracker_config()
    };

    let session = TrackingSession::create(
        "simulation",
        Location::from(from),
        Location::from(to),
        backend,
        router,
        Arc::new(clock.clone()),
        tracker,
    )
    .await?;
    let mut events = session.subscribe_events();
    session.start().await?;

    let mut ticker = tokio::time::interval(tick);
    for minute in 0..=minutes {
        ticker.tick().await;
        clock.advance(chrono::Duration::minutes(1));
        while let Ok(event) = events.try_recv() {
            if let TrackingEvent::StatusChanged(status) = event {
                info!("Status changed to {}", status);
            }
        }
        let view = session.view();
        if minute % 5 == 0 || view.movement_status == MovementStatus::Delivered {
            print_view(&view, &session.countdown().to_string());
        }
        if view.movement_status == MovementStatus::Delivered {
            break;
        }
    }

    session.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinates() {
        assert_eq!(parse_coordinates("4.0511, 9.7679"), Ok(Coordinates::new(4.0511, 9.7679)));
        assert!(parse_coordinates("4.0511").is_err());
        assert!(parse_coordinates("north,9.7").is_err());
        assert!(parse_coordinates("200,9.7").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["shiptrack", "--offline-routing", "create", "42", "--from", "4.05,9.76", "--to", "4.1,9.82"])
            .unwrap();
        assert!(cli.offline_routing);
        assert!(matches!(cli.command, Command::Create { ref order_id, .. } if order_id == "42"));

        assert!(Cli::try_parse_from(["shiptrack", "track"]).is_err());
    }
}
