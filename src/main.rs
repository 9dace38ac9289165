use anyhow::Result;
use horae::telemetry::HttpTelemetryClient;
use horae::{Config, Credentials, Dashboard, DashboardOptions};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    config.validate()?;

    horae::logging::init_logging(&config.logging)?;
    info!(
        "Horae {} starting with {} window(s)",
        env!("APP_VERSION"),
        config.dashboard.windows.len()
    );

    let credentials =
        Credentials::from_route(&config.session.route, config.telemetry.default_device())?;
    let client = HttpTelemetryClient::new(&config.telemetry)?;
    let options = DashboardOptions::from_config(&config, chrono::Utc::now())?;

    let (dashboard, handle) = Dashboard::new(options, credentials, Arc::new(client));
    let dashboard_task = dashboard.spawn();

    let config = Arc::new(config);
    if let Err(e) = horae::web::serve(handle, config).await {
        error!("Web server error: {}", e);
        dashboard_task.abort();
        return Err(e);
    }

    dashboard_task.abort();
    info!("Horae shutdown complete");
    Ok(())
}
