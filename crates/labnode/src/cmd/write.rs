use std::str::FromStr;

use clap::ValueEnum;
use labnode_client::{LabnodeClient, PidController, Version};
use serde_json::Value;

use crate::cmd::{parse_bool, parse_direction, Parameter, WriteArgs};
use crate::exit::{client_error, CliError, CliResult, SUCCESS};
use crate::output::{OutputFormat, Report};

/// A parsed, typed value ready to send.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Setting {
    Setpoint(i32),
    Kp(i32),
    Ki(i32),
    Kd(i32),
    Output(i32),
    Enabled(bool),
    Timeout(u32),
    LowerLimit(u32),
    UpperLimit(u32),
    Gain(bool),
    Direction(labnode_client::FeedbackDirection),
    AutoResume(bool),
    CalibrationOffset(f32),
}

impl Setting {
    fn parse(parameter: Parameter, raw: &str) -> CliResult<Self> {
        Ok(match parameter {
            Parameter::Setpoint => Setting::Setpoint(number(raw)?),
            Parameter::Kp => Setting::Kp(number(raw)?),
            Parameter::Ki => Setting::Ki(number(raw)?),
            Parameter::Kd => Setting::Kd(number(raw)?),
            Parameter::Output => Setting::Output(number(raw)?),
            Parameter::Enabled => Setting::Enabled(parse_bool(raw)?),
            Parameter::Timeout => Setting::Timeout(number(raw)?),
            Parameter::LowerLimit => Setting::LowerLimit(number(raw)?),
            Parameter::UpperLimit => Setting::UpperLimit(number(raw)?),
            Parameter::Gain => Setting::Gain(parse_bool(raw)?),
            Parameter::Direction => Setting::Direction(parse_direction(raw)?),
            Parameter::AutoResume => Setting::AutoResume(parse_bool(raw)?),
            Parameter::CalibrationOffset => {
                let value: f32 = number(raw)?;
                if !value.is_finite() {
                    return Err(CliError::usage(format!("invalid calibration offset: {raw}")));
                }
                Setting::CalibrationOffset(value)
            }
        })
    }

    async fn apply(self, pid: &PidController) -> labnode_client::Result<()> {
        match self {
            Setting::Setpoint(v) => pid.set_setpoint(v).await,
            Setting::Kp(v) => pid.set_kp(v).await,
            Setting::Ki(v) => pid.set_ki(v).await,
            Setting::Kd(v) => pid.set_kd(v).await,
            Setting::Output(v) => pid.set_output(v).await,
            Setting::Enabled(v) => pid.set_enabled(v).await,
            Setting::Timeout(v) => pid.set_timeout(v).await,
            Setting::LowerLimit(v) => pid.set_lower_output_limit(v).await,
            Setting::UpperLimit(v) => pid.set_upper_output_limit(v).await,
            Setting::Gain(v) => pid.set_dac_gain(v).await,
            Setting::Direction(v) => pid.set_feedback_direction(v).await,
            Setting::AutoResume(v) => pid.set_auto_resume(v).await,
            Setting::CalibrationOffset(v) => pid.set_calibration_offset(v).await,
        }
    }

    fn json(self) -> Value {
        match self {
            Setting::Setpoint(v)
            | Setting::Kp(v)
            | Setting::Ki(v)
            | Setting::Kd(v)
            | Setting::Output(v) => Value::from(v),
            Setting::Timeout(v) | Setting::LowerLimit(v) | Setting::UpperLimit(v) => Value::from(v),
            Setting::Enabled(v) | Setting::Gain(v) | Setting::AutoResume(v) => Value::from(v),
            Setting::Direction(v) => serde_json::to_value(v).unwrap_or(Value::Null),
            Setting::CalibrationOffset(v) => Value::from(f64::from(v)),
        }
    }
}

pub async fn run(args: WriteArgs, format: OutputFormat) -> CliResult<i32> {
    // Reject bad values before touching the network.
    let setting = Setting::parse(args.parameter, &args.value)?;
    let config = args.connect.client_config()?;

    let client = LabnodeClient::connect_with(config)
        .await
        .map_err(|err| client_error("connect failed", err))?;
    let pid = PidController::new(client, Version::default());
    let applied = setting.apply(&pid).await;
    pid.close().await;
    applied.map_err(|err| client_error("write failed", err))?;

    Report::new()
        .field("parameter", parameter_name(args.parameter))
        .field("value", setting.json())
        .field("applied", true)
        .print(format);
    Ok(SUCCESS)
}

fn parameter_name(parameter: Parameter) -> String {
    parameter
        .to_possible_value()
        .map(|value| value.get_name().to_string())
        .unwrap_or_default()
}

fn number<T: FromStr>(raw: &str) -> CliResult<T> {
    let raw = raw.trim();
    raw.parse()
        .map_err(|_| CliError::usage(format!("invalid numeric value: {raw}")))
}
