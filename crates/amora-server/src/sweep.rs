use std::time::Duration;

use tracing::{info, warn};

use amora_core::ChatRequestWorkflow;

/// Background task that expires pending chat requests past their deadline.
pub async fn run_sweep_loop(workflow: ChatRequestWorkflow, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let workflow = workflow.clone();
        match tokio::task::spawn_blocking(move || workflow.sweep_expired()).await {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Sweep: expired {} chat requests", count);
                }
            }
            Ok(Err(e)) => warn!("Sweep error: {}", e),
            Err(e) => warn!("Sweep task panicked: {}", e),
        }
    }
}
