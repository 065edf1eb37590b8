// FuelEU Compliance Ledger - Web Server
// REST API with Axum

use anyhow::{Context, Result};
use fueleu_ledger::{api, logging, ComplianceService, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;
    logging::init_logger(config.log_format, config.verbose);

    println!("🌐 FuelEU Compliance Ledger - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let service = ComplianceService::open(&config.db_path)
        .with_context(|| format!("Failed to open database {:?}", config.db_path))?;
    tracing::info!(path = ?config.db_path, "database opened");

    let app = api::router(service);

    let addr = config.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   Routes:  http://{}/routes", addr);
    println!("   Banking: http://{}/banking", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .await
        .context("Server stopped with an error")?;

    Ok(())
}
