//! Interactive PMBus access through an external i2c tool binary.
//!
//! Usage: `cargo run --example i2ctool [pcie-device] [i2c-address]`
//!
//! The tool binary is taken from `PMBUS_I2CTOOL` (default `./i2ctool`). Log output is
//! controlled by `PMBUS_LOG`, e.g. `PMBUS_LOG=pmbus_telemetry=trace`.

use std::{env, process::Command};

use inquire::{CustomType, Select};
use pmbus_telemetry::{
    Direction, Outcome, Page, PmbusEngine, Transport,
    register::{Address, Width},
    transport::{RawValue, bytes_from_word},
};
use strum::IntoEnumIterator;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _};

const PCIE_DEVICE: &str = "0000:c1:00.0";
const I2C_ADDRESS: u8 = 0x5C;
const I2C_BUS: u8 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The binary could not be started.
    #[error("could not start i2c tool: {0}")]
    Spawn(#[source] std::io::Error),
    /// The binary exited unsuccessfully.
    #[error("i2c tool failed: {0}")]
    Failed(String),
    /// No value could be found in the output.
    #[error("no value in i2c tool output: {0:?}")]
    Parse(String),
}

impl embedded_io::Error for ToolError {
    fn kind(&self) -> embedded_io::ErrorKind {
        match self {
            ToolError::Spawn(err) => match err.kind() {
                std::io::ErrorKind::NotFound => embedded_io::ErrorKind::NotFound,
                std::io::ErrorKind::PermissionDenied => embedded_io::ErrorKind::PermissionDenied,
                std::io::ErrorKind::TimedOut => embedded_io::ErrorKind::TimedOut,
                _ => embedded_io::ErrorKind::Other,
            },
            ToolError::Failed(_) => embedded_io::ErrorKind::Other,
            ToolError::Parse(_) => embedded_io::ErrorKind::InvalidData,
        }
    }
}

/// Runs the i2c tool once per transfer.
pub struct I2cTool {
    binary: String,
    device: String,
    address: u8,
    bus: u8,
}

impl I2cTool {
    fn run(&self, address: Address, extra: &[String]) -> Result<String, ToolError> {
        // The tool takes the register address as one number, most significant byte first.
        let command = address.command_phase();
        let register = command
            .iter()
            .fold(0u32, |acc, byte| (acc << 8) | *byte as u32);
        let output = Command::new(&self.binary)
            .args(["-d", self.device.as_str()])
            .args(["-a".to_string(), self.address.to_string()])
            .args(["-r".to_string(), register.to_string()])
            .args(["-t", "pmbus"])
            .args(["-b".to_string(), self.bus.to_string()])
            .args(["--reg-addr-len".to_string(), command.len().to_string()])
            .args(extra)
            .output()
            .map_err(ToolError::Spawn)?;
        if !output.status.success() {
            return Err(ToolError::Failed(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// First hex (`0x..`) or decimal number in the tool output.
fn parse_value(output: &str) -> Option<u16> {
    let tokens = output.split(|c: char| c.is_whitespace() || c == ',' || c == ':');
    let mut decimal = None;
    for token in tokens {
        if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
            if let Ok(value) = u16::from_str_radix(hex, 16) {
                return Some(value);
            }
        } else if decimal.is_none() {
            decimal = token.parse().ok();
        }
    }
    decimal
}

impl Transport for I2cTool {
    type Error = ToolError;

    fn read_raw(
        &mut self,
        _page_selected: bool,
        address: Address,
        width: Width,
    ) -> Result<RawValue, Self::Error> {
        let output = self.run(address, &["-l".into(), width.bytes().to_string()])?;
        let value = parse_value(&output).ok_or(ToolError::Parse(output))?;
        Ok(bytes_from_word(value, width))
    }

    fn write_raw(
        &mut self,
        address: Address,
        payload: &[u8],
        width: Width,
    ) -> Result<(), Self::Error> {
        let value = payload
            .iter()
            .rev()
            .fold(0u16, |acc, byte| (acc << 8) | *byte as u16);
        self.run(
            address,
            &[
                "-w".into(),
                value.to_string(),
                "--write-len".into(),
                width.bytes().to_string(),
            ],
        )
        .map(|_| ())
    }
}

fn main() {
    let filter = env::var("PMBUS_LOG")
        .unwrap_or_else(|_| "pmbus_telemetry=info".into())
        .parse::<tracing_subscriber::filter::targets::Targets>()
        .expect("Invalid PMBUS_LOG filter");
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let device = env::args().nth(1).unwrap_or_else(|| PCIE_DEVICE.into());
    let address = env::args()
        .nth(2)
        .and_then(|a| u8::from_str_radix(a.trim_start_matches("0x"), 16).ok())
        .unwrap_or(I2C_ADDRESS);
    let transport = I2cTool {
        binary: env::var("PMBUS_I2CTOOL").unwrap_or_else(|_| "./i2ctool".into()),
        device,
        address,
        bus: I2C_BUS,
    };
    let mut engine = PmbusEngine::new(transport);

    let page = Select::new("Rail:", Page::iter().collect())
        .prompt()
        .expect("Failed to select rail");
    let names: Vec<&str> = engine.register_map().entries().map(|e| e.name).collect();
    let command = Select::new("Command:", names)
        .prompt()
        .expect("Failed to select command");
    let entry = engine
        .register_map()
        .resolve(command)
        .expect("Selected command is in the map");

    let mut directions = Vec::new();
    if entry.width == Width::Zero {
        directions.push("send");
    } else {
        if entry.access.readable() {
            directions.push("read");
        }
        if entry.access.writable() {
            directions.push("write");
        }
    }
    let direction = match Select::new("Direction:", directions)
        .prompt()
        .expect("Failed to select direction")
    {
        "send" => Direction::Send,
        "write" => Direction::Write(
            CustomType::<f64>::new("Value:")
                .prompt()
                .expect("Failed to read value"),
        ),
        _ => Direction::Read,
    };

    match engine.execute(command, page, direction) {
        Ok(Outcome::Status(status)) => {
            println!("{status}");
            for bit in status.render_detailed() {
                let marker = if bit.active { "*" } else { " " };
                println!(
                    "  {marker} bit {:2} {:<16} {:<8} {}",
                    bit.bit, bit.name, bit.severity, bit.description
                );
            }
        }
        Ok(outcome) => println!("{command} on {page}: {outcome}"),
        Err(err) => {
            eprintln!("{command} on {page} failed: {err}");
            std::process::exit(1);
        }
    }
}
