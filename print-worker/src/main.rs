use print_worker::{Config, init_logger};
use thermal_printer::{NetworkPrinter, Printer};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Environment (.env is optional)
    dotenv::dotenv().ok();
    let config = Config::from_env();

    // 2. Logging
    init_logger(&config.log_level, config.log_dir.as_deref());
    for warning in &config.warnings {
        tracing::warn!("{}", warning);
    }
    tracing::info!(
        mode = %config.mode,
        queue = %config.queue_url,
        printer = %config.printer,
        "Print worker starting"
    );

    // 3. Components
    let worker = match config.build_worker() {
        Ok(worker) => worker,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return Err(e.into());
        }
    };

    // Reachability is informational only, the printer may come up later
    NetworkPrinter::new(config.printer.clone())
        .is_online()
        .await;

    // 4. Poll until Ctrl-C
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        tracing::info!("Shutdown requested, finishing current cycle");
        signal.cancel();
    });

    worker.run(shutdown).await;
    tracing::info!("Print worker stopped");
    Ok(())
}
