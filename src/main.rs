// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;

use fueleu_ledger::{
    load_routes_csv, load_ship_reports_csv, logging, ComplianceService, Config,
};

fn main() -> Result<()> {
    let config = Config::from_env()?;
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("import") => {
            logging::init_logger(config.log_format, config.verbose);
            let routes_csv = args
                .get(2)
                .context("usage: fueleu-ledger import <routes.csv> [reports.csv]")?;
            run_import(&config, Path::new(routes_csv), args.get(3).map(Path::new))?;
        }
        Some("history") => {
            logging::init_logger(config.log_format, config.verbose);
            let ship_id = args.get(2).context("usage: fueleu-ledger history <shipId>")?;
            run_history(&config, ship_id)?;
        }
        Some(other) => bail!("unknown command '{}' (expected import or history)", other),
        // UI mode (default); no log output over the dashboard
        None => run_ui_mode(&config)?,
    }

    Ok(())
}

fn open_service(config: &Config) -> Result<ComplianceService> {
    ComplianceService::open(&config.db_path)
        .with_context(|| format!("Failed to open database {:?}", config.db_path))
}

fn run_import(config: &Config, routes_csv: &Path, reports_csv: Option<&Path>) -> Result<()> {
    println!("🗄️  FuelEU Import - CSV → SQLite + WAL");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let service = open_service(config)?;
    println!("✓ Database ready: {:?}", config.db_path);

    // 1. Routes
    println!("\n📂 Loading routes...");
    let routes = load_routes_csv(routes_csv)?;
    println!("✓ Loaded {} routes from CSV", routes.len());

    let stats = service.import_routes(&routes)?;
    println!("✓ Inserted {} routes, skipped {} duplicates", stats.inserted, stats.skipped);

    // 2. Ship reports through the calculator
    if let Some(path) = reports_csv {
        println!("\n📂 Loading ship reports...");
        let reports = load_ship_reports_csv(path)?;
        println!("✓ Loaded {} reports from CSV", reports.len());

        let stats = service.import_ship_reports(&reports)?;
        println!("✓ Recorded {} compliance balances, rejected {}", stats.inserted, stats.skipped);
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Import complete");

    Ok(())
}

fn run_history(config: &Config, ship_id: &str) -> Result<()> {
    let service = open_service(config)?;

    let history = service.list_history(ship_id)?;
    println!("🏦 Banking history of {}", ship_id);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    if history.is_empty() {
        println!("  (no entries)");
    }
    for entry in &history {
        let movement = if entry.is_banking() { "banked " } else { "applied" };
        println!(
            "  #{:<4} {}  {}  {:>18.2} gCO2e  {}",
            entry.id,
            entry.year,
            movement,
            entry.amount_gco2eq,
            entry.created_at.to_rfc3339()
        );
    }

    let events = service.ship_events(ship_id)?;
    println!("\n📜 Audit trail ({} events)", events.len());
    for event in &events {
        println!(
            "  {}  {:<20} {}  by {}",
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.data,
            event.actor
        );
    }

    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &Config) -> Result<()> {
    println!("🖥️  Loading FuelEU Compliance Ledger...\n");

    if !config.db_path.exists() {
        eprintln!("❌ Database not found at {:?}", config.db_path);
        eprintln!("   Run: fueleu-ledger import fixtures/routes.csv fixtures/ship_reports.csv");
        eprintln!("   to import data first.");
        std::process::exit(1);
    }

    let service = open_service(config)?;
    let mut app = ui::App::new(service);

    println!("Starting UI... (Press 'q' to quit)\n");
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");

    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &Config) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin fueleu-server --features server");
    std::process::exit(1);
}
