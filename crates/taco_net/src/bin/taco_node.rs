//! # TACO Node
//!
//! Headless session node: ticks a [`Session`] at a fixed rate and reads
//! console commands from stdin.
//!
//! ## Usage
//!
//! ```bash
//! taco_node [CONFIG.toml]
//! RUST_LOG=debug taco_node node.toml
//! ```
//!
//! Then type `host`, `connect 10.0.0.2`, `say hello`, `status`, `quit`...

use std::io::BufRead;
use std::time::Duration;

use crossbeam_channel::{Receiver, TryRecvError};
use taco_net::transport::udp::UdpNetwork;
use taco_net::{Command, CommandError, NoopListener, Session, SessionConfig, SystemClock};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Tick period, roughly 66 Hz.
const TICK: Duration = Duration::from_millis(15);

/// Ticks pumped after `quit` so graceful disconnects reach the wire.
const SHUTDOWN_TICKS: u32 = 20;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => match SessionConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                error!("Failed to load config \"{}\": {}", path, err);
                std::process::exit(1);
            }
        },
        None => SessionConfig::default(),
    };

    info!(
        "TACO node \"{}\" (protocol v{}), port {}",
        config.name,
        taco_net::PROTOCOL_VERSION,
        config.port
    );

    let mut session = Session::new(
        config,
        Box::new(UdpNetwork::new()),
        Box::new(SystemClock),
        Box::new(NoopListener),
    );
    let commands = spawn_stdin_reader();
    let mut stdin_open = true;

    loop {
        if stdin_open {
            match commands.try_recv() {
                Ok(line) => match parse_line(&line) {
                    Some(Command::Quit) => break,
                    Some(command) => session.execute(command),
                    None => {}
                },
                Err(TryRecvError::Empty) => {}
                // Headless: keep ticking without a console.
                Err(TryRecvError::Disconnected) => stdin_open = false,
            }
        }
        session.update();
        std::thread::sleep(TICK);
    }

    session.execute(Command::Quit);
    for _ in 0..SHUTDOWN_TICKS {
        session.update();
        std::thread::sleep(TICK);
    }
    info!("Bye.");
}

/// Parses a console line; errors are logged and skipped.
fn parse_line(line: &str) -> Option<Command> {
    match Command::parse(line) {
        Ok(command) => Some(command),
        Err(CommandError::Empty) => None,
        Err(err) => {
            warn!("{}", err);
            None
        }
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (sender, receiver) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if sender.send(line).is_err() {
                break;
            }
        }
    });
    receiver
}
