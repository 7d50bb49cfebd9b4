use labnode_client::{connect_device, DeviceKind, PidController};
use tracing::debug;

use crate::cmd::InfoArgs;
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{OutputFormat, Report};

pub async fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let config = args.connect.client_config()?;
    let endpoint = config.endpoint.to_string();
    debug!(%endpoint, "querying device info");

    let pid = connect_device(config)
        .await
        .map_err(|err| client_error("connect failed", err))?;
    let collected = collect(&pid, endpoint).await;
    pid.close().await;

    let report = collected.map_err(|err| client_error("query failed", err))?;
    report.print(format);
    Ok(SUCCESS)
}

async fn collect(pid: &PidController, endpoint: String) -> labnode_client::Result<Report> {
    let software = pid.get_software_version().await?;
    let hardware = pid.get_hardware_version().await?;
    let serial = pid.get_serial().await?;

    Ok(Report::new()
        .field("endpoint", endpoint)
        .field("device", DeviceKind::PidController.to_string())
        .field("api_version", pid.api_version().to_string())
        .field("software_version", software.to_string())
        .field("hardware_version", hardware.to_string())
        .field("serial", serial))
}
