//! Producer/consumer demo
//!
//! Loads settings (environment, then `resilex.{toml,json}` / `config.*`,
//! then built-in defaults), starts a worker pool and feeds it jobs from
//! several producers. Some jobs fail once and succeed on retry; every tenth
//! job fails permanently and exhausts its retries.
//!
//! Run with:
//! ```bash
//! RUST_LOG=info cargo run -p resilex-infra --example producer_consumer
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use prometheus::Registry;
use resilex_infra::observability;
use resilex_infra::{config, InfraError, Settings};
use tracing::{info, warn};

const PRODUCERS: u32 = 3;
const JOBS_PER_PRODUCER: u32 = 20;

#[derive(Debug, thiserror::Error)]
enum JobError {
    #[error("job {0} hit a transient fault")]
    Transient(u32),
    #[error("job {0} hit a permanent fault")]
    Permanent(u32),
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = match config::load() {
        Ok(settings) => settings,
        Err(InfraError::NoConfigFile) => Settings::default(),
        Err(e) => return Err(e.into()),
    };
    observability::init_from_config(&settings.logging)?;
    info!(?settings, "Starting producer/consumer demo");

    let registry = Registry::new();
    let pool = Arc::new(settings.start_worker_pool(observability::observer(&registry)?)?);

    let mut producers = Vec::new();
    for producer in 0..PRODUCERS {
        let pool = Arc::clone(&pool);
        producers.push(tokio::spawn(async move {
            let mut handles = Vec::new();
            for seq in 0..JOBS_PER_PRODUCER {
                let job = producer * JOBS_PER_PRODUCER + seq;
                let attempts = Arc::new(AtomicU32::new(0));
                let submitted = pool
                    .submit(move || {
                        let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                        async move {
                            match job % 10 {
                                0 => Err(JobError::Permanent(job)),
                                3 | 7 if attempt == 1 => Err(JobError::Transient(job)),
                                _ => Ok(job),
                            }
                        }
                    })
                    .await;
                match submitted {
                    Ok(handle) => handles.push((job, handle)),
                    Err(e) => warn!(job, error = %e, "Job not accepted"),
                }
            }

            let mut succeeded = 0u32;
            for (job, handle) in handles {
                match handle.await {
                    Ok(_) => succeeded += 1,
                    Err(e) => warn!(job, error = %e, "Job failed"),
                }
            }
            succeeded
        }));
    }

    let mut succeeded = 0;
    for producer in producers {
        succeeded += producer.await?;
    }

    let stats = pool.shutdown().await;
    info!(
        succeeded,
        %stats,
        breaker = %pool.executor().breaker().state(),
        "Demo finished"
    );
    println!("{}", observability::encode_text(&registry)?);
    Ok(())
}
