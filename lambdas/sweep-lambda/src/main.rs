//! Scheduled reconciliation of the image bucket against the metadata table.

use aws_lambda_events::event::cloudwatch_events::CloudWatchEvent;
use gallery_atoms::media::sweep::sweep;
use gallery_shared::{telemetry, AppState, Config};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use std::sync::Arc;

async fn function_handler(
    event: LambdaEvent<CloudWatchEvent>,
    state: Arc<AppState>,
) -> Result<Value, Error> {
    tracing::info!(
        "🧹 Sweep triggered by {} (request {})",
        event.payload.source.as_deref().unwrap_or("manual invoke"),
        event.context.request_id
    );

    let report = sweep(&state.stores, &state.config.sweep).await?;
    Ok(serde_json::to_value(report)?)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    telemetry::init_tracing();

    let config = Config::from_env()?;
    let state = Arc::new(AppState::from_config(config).await);

    run(service_fn(move |event: LambdaEvent<CloudWatchEvent>| {
        let state = state.clone();
        async move { function_handler(event, state).await }
    }))
    .await
}
