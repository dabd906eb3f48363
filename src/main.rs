//! Bakhoor cabinet: console runner.
//!
//! Drives one cabinet from line commands on stdin and prints every
//! controller event as a JSON line on stdout.  Logs go to stderr.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  HardwareController   SimulatedController   SleepTicker        │
//! │  (serial + sysfs)     (thermal model)       (Ticker)           │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │   CabinetController thread → AppService (pure logic)   │    │
//! │  │   FSM · Safety · Sensors                               │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  stdin commands ──▶ channel          channel ──▶ stdout JSON   │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `bakhoor [--hardware [--thermocouple]] [--config JSON]`.
//! Without `--hardware` the cabinet is simulated.  `--config` (or
//! `BAKHOOR_CONFIG`) may hold a JSON object overriding any
//! [`CabinetConfig`] field; `BAKHOOR_LOG` takes an `env_logger` filter.

#![deny(unused_must_use)]

use std::io::{self, BufRead};
use std::thread;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use env_logger::Env;
use log::{error, info, warn};

use bakhoor::adapters::simulated::{SimHandle, SimTicker, SimulatedController};
use bakhoor::adapters::time::SleepTicker;
use bakhoor::{
    CabinetConfig, CabinetController, ControllerHandle, CustomSettings, HeatLevel, Mode,
    SpeedLevel, StartRequest,
};

// ── Command line ──────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "bakhoor", version)]
#[command(about = "Bakhoor cabinet console runner", long_about = None)]
struct Cli {
    /// Drive the real relays, fan and sensors instead of the simulator
    #[arg(long)]
    hardware: bool,

    /// Read the chamber temperature from the MAX6675 on SPI
    #[arg(long, requires = "hardware")]
    thermocouple: bool,

    /// JSON object overriding configuration fields
    #[arg(long, env = "BAKHOOR_CONFIG", value_name = "JSON")]
    config: Option<String>,
}

fn init_logging() -> Result<()> {
    env_logger::Builder::from_env(Env::new().filter_or("BAKHOOR_LOG", "info"))
        .format_timestamp_millis()
        .try_init()
        .context("installing logger")
}

fn load_config(json: Option<&str>) -> Result<CabinetConfig> {
    match json {
        Some(json) => {
            let config = CabinetConfig::from_json(json).context("configuration override")?;
            info!("Configuration override applied");
            Ok(config)
        }
        None => Ok(CabinetConfig::default()),
    }
}

// ── Console commands ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum ConsoleCommand {
    Start(StartRequest),
    Cancel,
    Safe,
    ExitSafe,
    Arm(StartRequest),
    Disarm,
    /// Simulation only.
    Weight(f32),
    /// Simulation only.
    Temperature(f32),
    Status,
    Help,
    Quit,
}

const HELP: &str = "\
commands:
  start <person|clothes|surrounding> [low|medium|high] [1|2|3]
  custom <heat step 1-5> <minutes 1-90>
  auto <mode> [heat] [speed]     arm auto-start
  disarm                         disarm auto-start
  cancel | safe | exit-safe
  weight <kg> | temp <celsius>   simulation only
  status | help | quit";

fn parse_request<'a>(mut words: impl Iterator<Item = &'a str>) -> Result<StartRequest> {
    let mode = words.next().ok_or_else(|| anyhow!("missing mode"))?;
    let mode = Mode::parse(mode).ok_or_else(|| anyhow!("unknown mode {mode:?}"))?;
    if mode == Mode::Custom {
        return parse_custom(words);
    }
    let heat = words.next().map_or(HeatLevel::Medium, HeatLevel::parse_or_default);
    let speed = match words.next() {
        Some(s) => SpeedLevel::from_index_or_default(s.parse().unwrap_or(0)),
        None => SpeedLevel::Two,
    };
    Ok(StartRequest::new(mode, heat, speed))
}

fn parse_custom<'a>(mut words: impl Iterator<Item = &'a str>) -> Result<StartRequest> {
    let step: u8 = words
        .next()
        .ok_or_else(|| anyhow!("missing heat step"))?
        .parse()
        .context("heat step")?;
    let minutes: u16 = words
        .next()
        .ok_or_else(|| anyhow!("missing minutes"))?
        .parse()
        .context("minutes")?;
    let settings = CustomSettings::new(step, minutes).map_err(|e| anyhow!("{e}"))?;
    Ok(StartRequest::custom(settings))
}

fn parse_number(word: Option<&str>, what: &str) -> Result<f32> {
    word.ok_or_else(|| anyhow!("missing {what}"))?
        .parse()
        .with_context(|| format!("bad {what}"))
}

fn parse_line(line: &str) -> Result<Option<ConsoleCommand>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let cmd = match verb.to_ascii_lowercase().as_str() {
        "start" => ConsoleCommand::Start(parse_request(words)?),
        "custom" => ConsoleCommand::Start(parse_custom(words)?),
        "auto" => ConsoleCommand::Arm(parse_request(words)?),
        "disarm" => ConsoleCommand::Disarm,
        "cancel" => ConsoleCommand::Cancel,
        "safe" => ConsoleCommand::Safe,
        "exit-safe" => ConsoleCommand::ExitSafe,
        "weight" => ConsoleCommand::Weight(parse_number(words.next(), "weight")?),
        "temp" => ConsoleCommand::Temperature(parse_number(words.next(), "temperature")?),
        "status" => ConsoleCommand::Status,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        other => bail!("unknown command {other:?} (try `help`)"),
    };
    Ok(Some(cmd))
}

/// Returns `false` once the user asked to quit.
fn dispatch(cmd: ConsoleCommand, ctl: &ControllerHandle, sim: Option<&SimHandle>) -> Result<bool> {
    match cmd {
        ConsoleCommand::Start(req) => ctl.start_cycle(req)?,
        ConsoleCommand::Cancel => ctl.cancel()?,
        ConsoleCommand::Safe => ctl.activate_safe_mode()?,
        ConsoleCommand::ExitSafe => ctl.exit_safe_mode()?,
        ConsoleCommand::Arm(req) => ctl.arm_auto_start(req)?,
        ConsoleCommand::Disarm => ctl.disarm_auto_start()?,
        ConsoleCommand::Weight(kg) => sim
            .ok_or_else(|| anyhow!("weight can only be set on the simulator"))?
            .set_weight(kg),
        ConsoleCommand::Temperature(c) => sim
            .ok_or_else(|| anyhow!("temperature can only be set on the simulator"))?
            .set_temperature(c),
        ConsoleCommand::Status => {
            println!("{}", serde_json::to_string(&ctl.snapshot())?);
        }
        ConsoleCommand::Help => eprintln!("{HELP}"),
        ConsoleCommand::Quit => return Ok(false),
    }
    Ok(true)
}

// ── Entry point ───────────────────────────────────────────────

fn spawn_controller(config: CabinetConfig, cli: &Cli) -> Result<(CabinetController, Option<SimHandle>)> {
    let ticker = SleepTicker::from_millis(config.control_loop_interval_ms);
    if cli.hardware {
        let hw = bakhoor::adapters::hardware::open_default(&config, cli.thermocouple)?;
        return Ok((CabinetController::spawn(config, hw, ticker)?, None));
    }
    let sim = SimulatedController::new();
    let handle = sim.handle();
    let ticker = SimTicker::new(ticker, handle.clone());
    Ok((CabinetController::spawn(config, sim, ticker)?, Some(handle)))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;
    info!("Bakhoor cabinet v{}", env!("CARGO_PKG_VERSION"));

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        error!("PANIC: {panic}");
        default_hook(panic);
    }));

    let config = load_config(cli.config.as_deref())?;
    let (controller, sim) = spawn_controller(config, &cli)?;
    info!(
        "Controller running on {} (type `help`)",
        if sim.is_some() { "the simulator" } else { "hardware" }
    );

    // Events → stdout, one JSON object per line.
    let events = controller.handle();
    thread::Builder::new()
        .name("bakhoor-events".into())
        .spawn(move || {
            loop {
                let event = events.next_event();
                match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!("Unprintable event {event:?}: {e}"),
                }
            }
        })
        .context("spawning event printer")?;

    for line in io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        match parse_line(&line) {
            Ok(None) => {}
            Ok(Some(cmd)) => match dispatch(cmd, &controller, sim.as_ref()) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => warn!("{e:#}"),
            },
            Err(e) => warn!("{e:#}"),
        }
    }

    info!("Shutting down");
    controller.stop();
    Ok(())
}
