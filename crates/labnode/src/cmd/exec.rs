use labnode_client::LabnodeClient;
use labnode_frame::{FunctionId, Response};
use serde_json::Value;

use crate::cmd::{parse_hex, ExecArgs};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{hex, print_raw, OutputFormat, Report};

pub async fn run(args: ExecArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = parse_hex(&args.payload)?;
    let config = args.connect.client_config()?;
    let function = args.function;

    let response = LabnodeClient::scoped(config, |client| async move {
        client.execute(function, payload, None).await
    })
    .await
    .map_err(|err| client_error("exec failed", err))?;

    match format {
        OutputFormat::Raw => print_raw(response.payload.as_ref()),
        _ => report(&response).print(format),
    }
    Ok(SUCCESS)
}

fn report(response: &Response) -> Report {
    let name = FunctionId::try_from(response.function)
        .map(|id| Value::from(format!("{id:?}")))
        .unwrap_or(Value::Null);
    Report::new()
        .field("sequence", response.sequence)
        .field("function", response.function)
        .field("function_name", name)
        .field("status", response.status.0)
        .field("payload_size", response.payload.len())
        .field("payload", hex(response.payload.as_ref()))
}
