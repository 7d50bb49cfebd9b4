use labnode_client::{
    ClientError, ClientEvent, LabnodeClient, PidController, ReconnectConfig, Version,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::cmd::read::read_quantity;
use crate::cmd::{parse_duration, WatchArgs};
use crate::exit::{client_error, CliError, CliResult, SUCCESS, TRANSPORT_ERROR};
use crate::output::{now_unix_millis, OutputFormat, Report};

pub async fn run(args: WatchArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let mut config = args.connect.client_config()?;
    if !config.reconnect.enabled {
        config.reconnect = ReconnectConfig::enabled();
    }

    let client = LabnodeClient::connect_with(config)
        .await
        .map_err(|err| client_error("connect failed", err))?;
    let mut events = client.subscribe();
    let pid = PidController::new(client, Version::default());

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut samples = 0usize;
    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(samples, "interrupted");
                break Ok(SUCCESS);
            }
            event = events.recv() => match event {
                Ok(ClientEvent::ReconnectFailed { next_delay: None, error, attempt }) => {
                    break Err(CliError::new(
                        TRANSPORT_ERROR,
                        format!("device unreachable after {attempt} reconnect attempts: {error}"),
                    ));
                }
                Ok(event) => debug!(?event, "client event"),
                Err(RecvError::Lagged(missed)) => warn!(missed, "client events dropped"),
                Err(RecvError::Closed) => break Ok(SUCCESS),
            },
            _ = ticker.tick() => match read_quantity(&pid, args.quantity).await {
                Ok(value) => {
                    Report::new()
                        .field("quantity", args.quantity.name())
                        .field("value", value)
                        .field("timestamp_ms", now_unix_millis())
                        .print(format);
                    samples += 1;
                    if args.count.is_some_and(|count| samples >= count) {
                        break Ok(SUCCESS);
                    }
                }
                // The reconnect policy is at work; try again next tick.
                Err(err) if err.is_retryable() || matches!(err, ClientError::NotConnected) => {
                    warn!(error = %err, "sample skipped");
                }
                Err(err) => break Err(client_error("read failed", err)),
            },
        }
    };

    pid.close().await;
    outcome
}
