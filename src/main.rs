use std::sync::Arc;

use mimalloc::MiMalloc;
use tracing::info;

use flashsale_loadtest::client::build_client;
use flashsale_loadtest::config::Config;
use flashsale_loadtest::logging::{init_tracing, LogFormat};
use flashsale_loadtest::metrics::{start_metrics_server, OutcomeMetrics};
use flashsale_loadtest::report::RunReport;
use flashsale_loadtest::scheduler::Scheduler;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Prints helpful configuration documentation.
fn print_config_help() {
    eprintln!("All settings are optional; defaults reproduce the 15k-VU flash-sale burst.");
    eprintln!();
    eprintln!("Plan:");
    eprintln!("  PLAN_FILE               - YAML plan file; env variables override its values");
    eprintln!(
        "  TARGET_URL              - Transaction endpoint (default: http://localhost:8080/transaction)"
    );
    eprintln!("  NUM_VUS                 - Number of virtual users (default: 15000, must be > 0)");
    eprintln!("  ITERATIONS_PER_VU       - Attempts per virtual user (default: 1, must be > 0)");
    eprintln!("  USER_IDS                - Comma-separated user IDs to draw from (use \\, for literal commas)");
    eprintln!("  WALLET_ID               - Wallet/event ID sent with every transaction");
    eprintln!("  AMOUNT                  - Transaction amount (default: 1)");
    eprintln!("  RANDOM_SEED             - Seed for user selection (default: random, logged)");
    eprintln!();
    eprintln!("Launch:");
    eprintln!("  LAUNCH_POLICY           - burst or ramp (default: burst)");
    eprintln!("  RAMP_DURATION           - Spread launches over this duration (ramp only, required for ramp)");
    eprintln!("  LAUNCH_DEADLINE         - Stop launching new virtual users after this duration");
    eprintln!();
    eprintln!("HTTP client:");
    eprintln!("  REQUEST_TIMEOUT         - Whole-request timeout: 500ms, 30s, 2m (default: 30s)");
    eprintln!("  CONNECT_TIMEOUT         - Connect timeout (default: 10s)");
    eprintln!("  SKIP_TLS_VERIFY         - Skip TLS certificate verification (default: false)");
    eprintln!("  RESOLVE_TARGET_ADDR     - DNS override: hostname:ip:port");
    eprintln!("  CUSTOM_HEADERS          - Comma-separated Name:Value headers");
    eprintln!();
    eprintln!("Observability:");
    eprintln!("  METRICS_PORT            - Serve Prometheus metrics on this port during the run");
    eprintln!("  METRIC_NAMESPACE        - Prometheus metric namespace (default: flashsale_loadtest)");
    eprintln!("  RUST_LOG                - Log filter (default: info)");
    eprintln!("  LOG_FORMAT              - text or json (default: text)");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing(LogFormat::from_env())?;

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}\n", e);
            print_config_help();
            std::process::exit(1);
        }
    };

    let client_result = build_client(&config.client)?;
    config.print_summary();

    let metrics = Arc::new(OutcomeMetrics::new(&config.metric_namespace)?);

    let metrics_server = config.metrics_port.map(|port| {
        let metrics = metrics.clone();
        tokio::spawn(async move {
            start_metrics_server(port, metrics).await;
        })
    });

    let scheduler = Scheduler::new(
        Arc::new(config.plan.clone()),
        Arc::new(client_result.client),
        metrics.clone(),
    );
    let result = scheduler.run().await;

    let report = RunReport::from(&result);
    println!("\n--- RESULTS ---\n{}", report);
    println!("\n--- REPORT (JSON) ---\n{}", report.to_json()?);
    println!("\n--- FINAL METRICS ---\n{}", metrics.gather_text());
    println!("--- END OF FINAL METRICS ---\n");

    if let Some(server) = metrics_server {
        server.abort();
    }
    info!("Load test complete");

    Ok(())
}
