use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use labnode_client::{ClientConfig, FeedbackDirection};
use labnode_transport::{Endpoint, DEFAULT_BAUD_RATE, DEFAULT_PORT};

use crate::exit::{client_error, CliError, CliResult};
use crate::output::OutputFormat;

pub mod exec;
pub mod info;
pub mod read;
pub mod version;
pub mod watch;
pub mod write;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Identify the device and print its versions and serial number.
    Info(InfoArgs),
    /// Read one quantity from the device.
    Read(ReadArgs),
    /// Change one controller parameter.
    Write(WriteArgs),
    /// Send a raw request and print the response.
    Exec(ExecArgs),
    /// Poll a quantity until interrupted, reconnecting as needed.
    Watch(WatchArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub async fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Info(args) => info::run(args, format).await,
        Command::Read(args) => read::run(args, format).await,
        Command::Write(args) => write::run(args, format).await,
        Command::Exec(args) => exec::run(args, format).await,
        Command::Watch(args) => watch::run(args, format).await,
        Command::Version(args) => version::run(args, format),
    }
}

/// Where and how to reach the device.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectArgs {
    /// Device host name or address.
    #[arg(long, env = "LABNODE_HOST")]
    pub host: Option<String>,
    /// Device TCP port.
    #[arg(long, env = "LABNODE_PORT")]
    pub port: Option<u16>,
    /// Serial TTY to use instead of TCP (e.g. /dev/ttyACM0).
    #[arg(long, value_name = "TTY")]
    pub serial: Option<String>,
    /// Serial baud rate.
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Connect and request timeout (e.g. 3s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
    /// JSON client configuration; --host/--port/--serial/--timeout override it.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl ConnectArgs {
    pub fn client_config(&self) -> CliResult<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_json_file(path)
                .map_err(|err| client_error("loading config", err))?,
            None => ClientConfig::default(),
        };

        if let Some(tty) = &self.serial {
            config.endpoint = Endpoint::Serial {
                tty: tty.clone(),
                baud_rate: self.baud,
            };
        } else if self.host.is_some() || self.port.is_some() {
            let (host, port) = match &config.endpoint {
                Endpoint::Tcp { host, port } => (host.clone(), *port),
                Endpoint::Serial { .. } => ("localhost".to_string(), DEFAULT_PORT),
            };
            config.endpoint = Endpoint::tcp(
                self.host.clone().unwrap_or(host),
                self.port.unwrap_or(port),
            );
        }

        if let Some(timeout) = &self.timeout {
            let timeout = parse_duration(timeout)?;
            config.connect_timeout = timeout;
            config.request_timeout = timeout;
        }

        config
            .validate()
            .map_err(|err| client_error("invalid configuration", err))?;
        Ok(config)
    }
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Quantity {
    /// Board temperature in °C.
    Temperature,
    /// Relative humidity in %rH.
    Humidity,
    Mac,
    AutoResume,
    /// Fallback sensor offset in K.
    CalibrationOffset,
    Serial,
}

impl Quantity {
    pub fn name(self) -> &'static str {
        match self {
            Quantity::Temperature => "temperature",
            Quantity::Humidity => "humidity",
            Quantity::Mac => "mac",
            Quantity::AutoResume => "auto_resume",
            Quantity::CalibrationOffset => "calibration_offset",
            Quantity::Serial => "serial",
        }
    }
}

#[derive(Args, Debug)]
pub struct ReadArgs {
    pub quantity: Quantity,
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum Parameter {
    /// Setpoint, Q16.16.
    Setpoint,
    /// Proportional gain, Q16.16.
    Kp,
    /// Integral gain, Q16.16.
    Ki,
    /// Derivative gain, Q16.16.
    Kd,
    /// DAC output, only while the controller is disabled.
    Output,
    Enabled,
    /// Fallback timeout in ms.
    Timeout,
    LowerLimit,
    UpperLimit,
    /// DAC gain x2 (0..10 V).
    Gain,
    /// Feedback direction: negative or positive.
    Direction,
    AutoResume,
    /// Fallback sensor offset in K.
    CalibrationOffset,
}

#[derive(Args, Debug)]
pub struct WriteArgs {
    pub parameter: Parameter,
    /// New value: integer, float (calibration-offset), bool, or negative/positive.
    #[arg(allow_hyphen_values = true)]
    pub value: String,
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Args, Debug)]
pub struct ExecArgs {
    /// Function id (0-255).
    pub function: u8,
    /// Request payload as hex (e.g. 00000100).
    #[arg(long, default_value = "")]
    pub payload: String,
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Args, Debug)]
pub struct WatchArgs {
    pub quantity: Quantity,
    /// Time between samples (e.g. 1s, 250ms).
    #[arg(long, default_value = "1s")]
    pub interval: String,
    /// Stop after N samples.
    #[arg(long)]
    pub count: Option<usize>,
    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_bool(input: &str) -> CliResult<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(CliError::usage(format!("invalid boolean: {other}"))),
    }
}

pub fn parse_direction(input: &str) -> CliResult<FeedbackDirection> {
    match input.trim().to_ascii_lowercase().as_str() {
        "negative" | "neg" | "0" => Ok(FeedbackDirection::Negative),
        "positive" | "pos" | "1" => Ok(FeedbackDirection::Positive),
        other => Err(CliError::usage(format!(
            "invalid feedback direction: {other} (expected negative or positive)"
        ))),
    }
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::usage("duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::usage(format!("invalid duration: {input}")))?;

    if value == 0 {
        return Err(CliError::usage("duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

pub fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !matches!(c, ' ' | ':' | '_'))
        .collect();
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CliError::usage(format!("invalid hex payload: {input}")));
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::usage(format!("odd number of hex digits: {input}")));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| CliError::usage(format!("invalid hex payload: {input}")))
        })
        .collect()
}
