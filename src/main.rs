//! CLI entry point for the TeleGo client.
//!
//! Provides interactive driver and rider sessions against the backend, plus
//! standalone runs of the ambient traffic engine and the geolocation shim.

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use telego::{
    alert,
    api::BackendClient,
    config::{AppConfig, Timings},
    fetch::{BasicClient, HttpClient, auth},
    flow::{DriverStep, RiderStep},
    geo::GeoPoint,
    geosim::GeoSimulator,
    infra::google::GoogleMapsClient,
    output::CsvFrameRecorder,
    price::format_amount,
    services::MapsApi,
    session::{DriverSession, PickupCheck, RiderSession, TariffState},
    traffic::{AmbientTraffic, CarRenderer, LogRenderer, TrafficConfig},
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Map center used when no position is given (Antalya).
const DEFAULT_CENTER: GeoPoint = GeoPoint::new(36.910894, 30.720875);

#[derive(Parser)]
#[command(name = "telego")]
#[command(about = "TeleGo ride-hailing client", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an interactive driver session
    Driver {
        /// Latitude of the simulated position
        #[arg(long, default_value_t = DEFAULT_CENTER.latitude)]
        lat: f64,

        /// Longitude of the simulated position
        #[arg(long, default_value_t = DEFAULT_CENTER.longitude)]
        lng: f64,
    },
    /// Run an interactive rider session
    Rider {
        #[arg(long, default_value_t = DEFAULT_CENTER.latitude)]
        lat: f64,

        #[arg(long, default_value_t = DEFAULT_CENTER.longitude)]
        lng: f64,
    },
    /// Run the ambient traffic engine around a point
    Traffic {
        #[arg(long, default_value_t = DEFAULT_CENTER.latitude)]
        lat: f64,

        #[arg(long, default_value_t = DEFAULT_CENTER.longitude)]
        lng: f64,

        /// How long to run
        #[arg(short, long, default_value_t = 30)]
        seconds: u64,

        /// CSV file to append frames to (frames are only logged otherwise)
        #[arg(short, long)]
        output: Option<String>,

        /// Seed for reproducible routes and cars
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Play a scripted route through the geolocation shim
    Geosim {
        /// Points as "lat,lng;lat,lng;..."
        #[arg(short, long)]
        route: String,

        /// Milliseconds between broadcasts
        #[arg(short, long, default_value_t = 1000)]
        tick_ms: u64,
    },
}

type Backend = BackendClient<Box<dyn HttpClient>>;
type Maps = GoogleMapsClient<BasicClient>;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/telego.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("telego.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Driver { lat, lng } => {
            let config = AppConfig::from_env()?;
            run_driver(&config, GeoPoint::new(lat, lng)).await?;
        }
        Commands::Rider { lat, lng } => {
            let config = AppConfig::from_env()?;
            run_rider(&config, GeoPoint::new(lat, lng)).await?;
        }
        Commands::Traffic {
            lat,
            lng,
            seconds,
            output,
            seed,
        } => {
            let config = AppConfig::from_env()?;
            let renderer: Box<dyn CarRenderer> = match &output {
                Some(path) => Box::new(CsvFrameRecorder::create(path)?),
                None => Box::new(LogRenderer),
            };
            let mut traffic = AmbientTraffic::new(TrafficConfig::default(), Arc::new(maps(&config)?), renderer);
            if let Some(seed) = seed {
                traffic = traffic.with_seed(seed);
            }

            traffic.activate(GeoPoint::new(lat, lng));
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            traffic.deactivate();
            info!(seconds, output = output.as_deref().unwrap_or("-"), "Traffic run finished");
        }
        Commands::Geosim { route, tick_ms } => {
            let points = route
                .split(';')
                .filter(|s| !s.trim().is_empty())
                .map(str::parse)
                .collect::<Result<Vec<GeoPoint>>>()
                .context("invalid --route")?;
            if points.is_empty() {
                return Err(anyhow!("--route needs at least one point"));
            }

            let count = points.len();
            let geo = GeoSimulator::new(DEFAULT_CENTER, Duration::from_millis(tick_ms));
            info!(points = count, tick_ms = geo.tick_period().as_millis() as u64, "Playing route");
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            geo.watch_position(move |fix| {
                let _ = tx.send(fix);
            });
            geo.set_route(points);
            geo.start();

            for n in 1..=count {
                let Some(fix) = rx.recv().await else { break };
                info!(n, position = %fix.coords, accuracy = fix.accuracy, "Position broadcast");
            }
            info!(cursor = geo.cursor(), running = geo.is_running(), "Route finished");
        }
    }

    Ok(())
}

fn backend(config: &AppConfig) -> Result<Backend> {
    let init_data = config.backend_init_data()?;
    if init_data.is_none() {
        warn!(environment = ?config.environment, "TELEGO_INIT_DATA not set, backend calls are unauthenticated");
    }
    let http = auth::telegram_init_data(BasicClient::new(config.timings.http_timeout)?, init_data)?;
    Ok(BackendClient::new(http, &config.api_base_url)?)
}

fn maps(config: &AppConfig) -> Result<Maps> {
    let http = BasicClient::new(config.timings.http_timeout)?;
    Ok(GoogleMapsClient::new(http, &config.maps_api_key))
}

fn geo(center: GeoPoint, timings: &Timings) -> GeoSimulator {
    GeoSimulator::with_jittered_fallback(center, &mut rand::thread_rng(), timings.geosim_tick)
}

fn alert_user(err: &anyhow::Error, fallback: &str) {
    warn!(error = %format!("{err:#}"), "Action failed");
    println!("! {}", alert::user_message(err, fallback));
}

async fn run_driver(config: &AppConfig, center: GeoPoint) -> Result<()> {
    let maps = Arc::new(maps(config)?);
    let mut session = DriverSession::new(backend(config)?, maps, geo(center, &config.timings), &config.timings);
    if let Err(e) = session.ensure_profile().await {
        alert_user(&e, "Could not load the driver profile");
    }

    println!("commands: online, offline, accept, decline, code NNNN, end, continue, status, quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let mut words = line.split_whitespace();
                let result = match (words.next(), words.next()) {
                    (None, _) => continue,
                    (Some("quit" | "exit"), _) => break,
                    (Some("online" | "continue"), _) => session.go_online().await,
                    (Some("offline"), _) => session.go_offline().await,
                    (Some("accept"), _) => match session.accept_offer().await {
                        Ok(false) => {
                            println!("! The offer is no longer available");
                            Ok(())
                        }
                        other => other.map(|_| ()),
                    },
                    (Some("decline"), _) => session.decline_offer().await,
                    (Some("code"), code) => match session.submit_pickup_code(code.unwrap_or("")).await {
                        Ok(PickupCheck::Rejected) => {
                            println!("! Wrong pickup code");
                            Ok(())
                        }
                        other => other.map(|_| ()),
                    },
                    (Some("end"), _) => session.end_ride(),
                    (Some("status"), _) => Ok(()),
                    (Some(other), _) => {
                        println!("! unknown command '{other}'");
                        continue;
                    }
                };
                match result {
                    Ok(()) => println!("{}", describe_driver(session.step(), session.current_fix())),
                    Err(e) => alert_user(&e, "Error. Please try again"),
                }
            }
            changed = session.process_next_poll() => {
                if changed {
                    println!("{}", describe_driver(session.step(), session.current_fix()));
                }
            }
        }
    }
    Ok(())
}

fn describe_driver(step: &DriverStep, fix: GeoPoint) -> String {
    match step {
        DriverStep::OrderPreview { offer } => {
            let price = offer
                .price
                .as_ref()
                .map(|p| format_amount(p.amount, &p.currency_symbol, p.currency_symbol_position))
                .unwrap_or_default();
            format!(
                "[{step}] {} wants a ride: {} -> {} ({:.1} km to pickup) {price}",
                offer.passenger_name,
                offer.origin.short_name,
                offer.destination.short_name,
                offer.distance_meters / 1000.0,
            )
        }
        DriverStep::GoingToPickup { offer, .. } => {
            format!("[{step}] heading to {} from {fix}", offer.origin.address)
        }
        DriverStep::ArrivedAtPickup { offer, .. } => {
            format!("[{step}] ask {} for the pickup code", offer.passenger_name)
        }
        DriverStep::RideInProgress { offer, .. } => {
            format!("[{step}] driving to {} from {fix}", offer.destination.address)
        }
        _ => format!("[{step}] at {fix}"),
    }
}

async fn run_rider(config: &AppConfig, center: GeoPoint) -> Result<()> {
    let maps = Arc::new(maps(config)?);
    let traffic = AmbientTraffic::new(TrafficConfig::default(), Arc::clone(&maps), Box::new(LogRenderer));
    let mut session = RiderSession::new(
        backend(config)?,
        maps,
        geo(center, &config.timings),
        traffic,
        &config.timings,
    );
    if let Err(e) = session.ensure_profile().await {
        alert_user(&e, "Could not load the passenger profile");
    }
    match session.locate().await {
        Ok(Some(place)) => println!("you are at {}", place.address),
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Could not resolve own position"),
    }

    println!("commands: from LAT,LNG, to LAT,LNG, search TEXT, adjust ±N, request, cancel, status, quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                let (command, arg) = line.split_once(' ').unwrap_or((line, ""));
                let arg = arg.trim();
                let result = match command {
                    "" => continue,
                    "quit" | "exit" => break,
                    "from" | "to" => set_endpoint(&mut session, command == "from", arg).await,
                    "search" => session.search(arg).await.map(|places| {
                        for p in places {
                            println!("  {} | {} | {:.6},{:.6}", p.short_name, p.address, p.latitude, p.longitude);
                        }
                    }),
                    "adjust" => {
                        let Ok(delta) = arg.trim_start_matches('+').parse::<f64>() else {
                            println!("! usage: adjust ±N");
                            continue;
                        };
                        if !session.adjust_fare(delta) {
                            println!("! Fare adjustment out of range");
                        }
                        Ok(())
                    }
                    "request" => session.request_ride().await,
                    "cancel" => session.cancel(),
                    "status" => Ok(()),
                    other => {
                        println!("! unknown command '{other}'");
                        continue;
                    }
                };
                match result {
                    Ok(()) => println!("{}", describe_rider(&session)),
                    Err(e) => alert_user(&e, "Could not create the ride request"),
                }
            }
            changed = session.process_next_poll() => {
                if changed {
                    println!("{}", describe_rider(&session));
                }
            }
        }
    }
    Ok(())
}

async fn set_endpoint<M: MapsApi + 'static>(
    session: &mut RiderSession<Box<dyn HttpClient>, M>,
    origin: bool,
    arg: &str,
) -> Result<()> {
    let point: GeoPoint = arg.parse()?;
    let place = session.resolve_place(point).await;
    if origin {
        session.set_origin(place).await
    } else {
        session.set_destination(place).await
    }
}

fn describe_rider<M: MapsApi + 'static>(session: &RiderSession<Box<dyn HttpClient>, M>) -> String {
    let step = session.step();
    let mut out = format!("[{step}]");
    match step {
        RiderStep::DefiningRoute => {
            let name = |p: Option<&telego::api::types::PlaceDto>| {
                p.map(|p| p.short_name.clone()).unwrap_or_else(|| "?".to_string())
            };
            out.push_str(&format!(" {} -> {}", name(session.origin()), name(session.destination())));
            if let Some(route) = session.route() {
                out.push_str(&format!(" ({:.1} km route)", route.length_meters() / 1000.0));
            }
            match session.tariff() {
                TariffState::Idle => {}
                TariffState::Loading => out.push_str(" fare: ..."),
                TariffState::Ready(quote) => out.push_str(&format!(
                    " fare: {} (adjust within ±{})",
                    quote.formatted_fare(),
                    quote.limit()
                )),
                TariffState::Failed(message) => out.push_str(&format!(" fare unavailable: {message}")),
            }
        }
        RiderStep::WaitingForDriver { request_id } => {
            out.push_str(&format!(" request {request_id}, {} cars nearby", session.traffic().population()));
        }
        RiderStep::DriverEnRoute { ride } => {
            let name = ride.driver_user.first_name.as_deref().unwrap_or("Your driver");
            out.push_str(&format!(" {name} is at {}", ride.driver_state.position()));
        }
        RiderStep::DriverArrived { .. } => {
            if let Some(code) = session.ride_code() {
                out.push_str(&format!(" driver arrived, your code is {code:04}"));
            }
        }
        RiderStep::RideInProgress { ride, .. } => {
            out.push_str(&format!(" riding to {}", ride.destination.address));
        }
        RiderStep::RideCompleted => out.push_str(" arrived"),
    }
    out
}
