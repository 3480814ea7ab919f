use std::thread::sleep;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use copley_serial_link::simulation::SimulatedPorts;
use copley_serial_link::stdio_helper::*;
use copley_serial_link::{Axis, LinkConfig, MotorController, PortProvider, terminal_exit, terminal_start};
use tracing_subscriber::EnvFilter;

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                             Globals
// —————————————————————————————————————————————————————————————————————————————————————————————————

const SIM_PORT: &str = "SIM0";
const FRAME_INTERVAL: Duration = Duration::from_millis(10);

const HELP: &str = "\
Commands
==============
connect [port]      open port, or scan all ports
disconnect          close the port
status              ping the controller
init <x|y>          absolute mode, amplifier on, home
disable <x|y>       amplifier off
move <x|y> <counts> absolute move
pos <x|y>           read actual position
clear               clear latched faults
diag                link diagnostics
help                this text
quit                exit";

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Args
// —————————————————————————————————————————————————————————————————————————————————————————————————

#[derive(Parser, Debug)]
#[command(name = "copley-link", version, about = "Copley binary serial link console")]
struct Args {
    /// Serial port. All ports are scanned when omitted
    port: Option<String>,

    /// Talk to a simulated amplifier instead of a serial port
    #[arg(long)]
    simulate: bool,

    #[arg(long, default_value_t = 9600)]
    baud: u32,

    /// Response timeout in milliseconds
    #[arg(long, default_value_t = 15_000)]
    timeout_ms: u64,

    /// Receive poll interval in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Main
// —————————————————————————————————————————————————————————————————————————————————————————————————

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level)?;

    let config = LinkConfig::default()
        .with_baud_rate(args.baud)
        .with_response_timeout(Duration::from_millis(args.timeout_ms))
        .with_poll_interval(Duration::from_millis(args.poll_ms));

    println!("\n=== Copley Serial Link Started ===\n");

    if args.simulate {
        println!("Simulated amplifier on {SIM_PORT}");
        let motors = MotorController::with_provider(SimulatedPorts::with_controller(SIM_PORT), config);
        let port = args.port.or_else(|| Some(SIM_PORT.to_string()));
        return run(motors, port);
    }

    println!("Available Ports");
    println!("==============");
    match serialport::available_ports() {
        Ok(ports) if !ports.is_empty() => {
            for port in &ports {
                println!("{}", port.port_name);
            }
        }
        _ => println!("No Ports"),
    }
    println!("______________\n");

    run(MotorController::new(config), args.port)
}

fn init_tracing(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log level")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    Ok(())
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                             Console
// —————————————————————————————————————————————————————————————————————————————————————————————————

fn run<P: PortProvider>(mut motors: MotorController<P>, port: Option<String>) -> Result<()> {
    terminal_start!().context("Failed to set up terminal")?;

    println!("Press Ctrl+C to Exit, type 'help' for commands\n");

    execute(&mut motors, ConsoleCommand::Connect(port));

    let mut console = Console::new("COPLEY");

    loop {
        if let Some(line) = console.poll_line()? {
            println!("{} {}", ">>:".green(), line.as_str().blue());

            match parse_command(&line) {
                Ok(ConsoleCommand::Quit) => {
                    motors.disconnect();
                    terminal_exit!();
                }
                Ok(command) => execute(&mut motors, command),
                Err(msg) => println!("{}", msg.red()),
            }
        }

        console.render(&status_line(&motors));
        sleep(FRAME_INTERVAL);
    }
}

fn status_line<P: PortProvider>(motors: &MotorController<P>) -> String {
    let port = motors.session().port_name().unwrap_or("-");
    format!(
        "{} {} X:{} Y:{}",
        motors.status(),
        port,
        motors.last_known_position(Axis::X),
        motors.last_known_position(Axis::Y)
    )
}

// ———————————————————————————————————————————— Commands ———————————————————————————————————————————

#[derive(Debug, PartialEq, Eq)]
enum ConsoleCommand {
    Connect(Option<String>),
    Disconnect,
    Status,
    Init(Axis),
    Disable(Axis),
    Move(Axis, i32),
    Position(Axis),
    ClearFaults,
    Diagnostics,
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<ConsoleCommand, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or("").to_ascii_lowercase();

    let mut axis = || -> Result<Axis, String> {
        let word = words.next().ok_or("Missing axis (x or y)")?;
        word.parse::<Axis>().map_err(|_| format!("Unknown axis: {word}"))
    };

    let command = match verb.as_str() {
        "connect" => ConsoleCommand::Connect(line.split_whitespace().nth(1).map(str::to_string)),
        "disconnect" => ConsoleCommand::Disconnect,
        "status" => ConsoleCommand::Status,
        "init" => ConsoleCommand::Init(axis()?),
        "disable" => ConsoleCommand::Disable(axis()?),
        "pos" | "position" => ConsoleCommand::Position(axis()?),
        "move" => {
            let target = axis()?;
            let counts = line
                .split_whitespace()
                .nth(2)
                .ok_or("Missing position")?
                .parse::<i32>()
                .map_err(|e| format!("Bad position: {e}"))?;
            ConsoleCommand::Move(target, counts)
        }
        "clear" => ConsoleCommand::ClearFaults,
        "diag" => ConsoleCommand::Diagnostics,
        "help" | "?" => ConsoleCommand::Help,
        "quit" | "exit" => ConsoleCommand::Quit,
        "" => return Err("Empty command".into()),
        other => return Err(format!("Unknown command: {other}")),
    };

    Ok(command)
}

fn execute<P: PortProvider>(motors: &mut MotorController<P>, command: ConsoleCommand) {
    match command {
        ConsoleCommand::Connect(port) => {
            match &port {
                Some(name) => println!("Connecting to port: {name}"),
                None => println!("Searching for controller ..."),
            }
            if motors.connect(port.as_deref()) {
                println!("\nConnected!");
                println!("==============\n");
            }
            else {
                println!("{}", "No Copley controller found".red());
            }
        }
        ConsoleCommand::Disconnect => {
            motors.disconnect();
            println!("Disconnected");
        }
        ConsoleCommand::Status => {
            let live = motors.is_connected();
            println!("{} (ping {})", motors.status(), if live { "ok" } else { "failed" });
        }
        ConsoleCommand::Init(axis) => {
            motors.initialize_axis(axis);
            println!("Axis {axis} initialised");
        }
        ConsoleCommand::Disable(axis) => {
            motors.disable_axis(axis);
            println!("Axis {axis} disabled");
        }
        ConsoleCommand::Move(axis, counts) => {
            motors.move_axis(axis, counts);
            println!("Axis {axis} moving to {counts}");
        }
        ConsoleCommand::Position(axis) => {
            println!("Axis {axis}: {}", motors.get_position(axis));
        }
        ConsoleCommand::ClearFaults => {
            motors.clear_faults();
            println!("Faults cleared");
        }
        ConsoleCommand::Diagnostics => {
            println!("{:#?}", motors.diagnostics());
        }
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => {}
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Tests
// —————————————————————————————————————————————————————————————————————————————————————————————————
