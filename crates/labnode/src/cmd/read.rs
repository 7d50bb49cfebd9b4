use labnode_client::{LabnodeClient, PidController, Version};
use serde_json::Value;

use crate::cmd::{Quantity, ReadArgs};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{mac, now_unix_millis, OutputFormat, Report};

pub async fn run(args: ReadArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.connect.client_config()?;
    let client = LabnodeClient::connect_with(config)
        .await
        .map_err(|err| client_error("connect failed", err))?;
    // Reads need no identification round trip.
    let pid = PidController::new(client, Version::default());

    let value = read_quantity(&pid, args.quantity).await;
    pid.close().await;
    let value = value.map_err(|err| client_error("read failed", err))?;

    Report::new()
        .field("quantity", args.quantity.name())
        .field("value", value)
        .field("timestamp_ms", now_unix_millis())
        .print(format);
    Ok(SUCCESS)
}

/// Fetch one quantity as a JSON value.
pub async fn read_quantity(pid: &PidController, quantity: Quantity) -> labnode_client::Result<Value> {
    Ok(match quantity {
        Quantity::Temperature => rounded(pid.get_board_temperature().await?),
        Quantity::Humidity => rounded(pid.get_humidity().await?),
        Quantity::Mac => Value::from(mac(&pid.get_mac_address().await?)),
        Quantity::AutoResume => Value::from(pid.get_auto_resume().await?),
        Quantity::CalibrationOffset => rounded(f64::from(pid.get_calibration_offset().await?)),
        Quantity::Serial => Value::from(pid.get_serial().await?),
    })
}

fn rounded(value: f64) -> Value {
    Value::from((value * 1000.0).round() / 1000.0)
}
