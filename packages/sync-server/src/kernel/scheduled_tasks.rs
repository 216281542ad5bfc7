//! Scheduled background tasks using tokio-cron-scheduler.
//!
//! The only schedule is the Marketplace B poll: every five minutes, plus one
//! immediate cycle at startup so a fresh deployment does not wait for the
//! first cron tick. The poller's single-flight guard makes the overlap
//! between the startup cycle and an early tick harmless.

use std::sync::Arc;

use anyhow::Result;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::kernel::poller::MarketplaceBPoller;

pub async fn start_scheduler(poller: Arc<MarketplaceBPoller>) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let cron_poller = poller.clone();
    let poll_job = Job::new_async("0 */5 * * * *", move |_uuid, _lock| {
        let poller = cron_poller.clone();
        Box::pin(async move {
            if let Err(e) = poller.run_cycle().await {
                tracing::error!("Poll cycle failed: {}", e);
            }
        })
    })?;

    scheduler.add(poll_job).await?;
    scheduler.start().await?;

    // Startup cycle.
    tokio::spawn(async move {
        if let Err(e) = poller.run_cycle().await {
            tracing::error!("Startup poll cycle failed: {}", e);
        }
    });

    tracing::info!("Scheduled tasks started (marketplace poll every 5 minutes)");
    Ok(scheduler)
}
