use gallery_shared::{telemetry, AppState, Config};
use lambda_http::{run, service_fn, Error, Request};
use std::sync::Arc;

mod http_handler;

#[tokio::main]
async fn main() -> Result<(), Error> {
    telemetry::init_tracing();

    let config = Config::from_env()?;
    let state = Arc::new(AppState::from_config(config).await);

    run(service_fn(move |event: Request| {
        let state = state.clone();
        async move { http_handler::function_handler(event, state).await }
    }))
    .await
}
