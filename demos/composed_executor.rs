//! Composed executor example.
//!
//! This example shows how to:
//! - Load an executor from a JSON configuration
//! - Run many concurrent calls through every layer
//! - Tell the library's rejections apart from operation errors
//!
//! Run with: cargo run --example composed_executor

use bulwark::prelude::*;
use std::io;
use std::sync::Arc;
use std::time::Duration;

const CONFIG: &str = r#"{
    "rate_limiter": { "rate": 20.0, "burst": 5, "wait": true, "max_wait": 200 },
    "bulkhead": { "max_concurrent": 3, "max_wait": 100 },
    "circuit_breaker": { "failure_threshold": 4, "cooldown": 1000 },
    "retry": { "max_attempts": 3, "initial_delay": 20, "backoff": "exponential" },
    "timeout": { "duration": 150 }
}"#;

/// Simulated remote call with variable latency and an occasional error.
async fn lookup(id: u32, token: CancellationToken) -> Result<String, io::Error> {
    let latency = Duration::from_millis(fastrand::u64(10..200));
    tokio::select! {
        _ = token.cancelled() => Err(io::Error::new(io::ErrorKind::Interrupted, "abandoned")),
        _ = tokio::time::sleep(latency) => {
            if fastrand::f64() < 0.2 {
                Err(io::Error::other(format!("lookup {id} failed")))
            } else {
                Ok(format!("record-{id}"))
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bulwark=debug")),
        )
        .init();

    println!("=== Composed Executor Example ===\n");

    let config = ResilienceConfig::from_json(CONFIG)?;
    let executor = Arc::new(config.build_executor()?);
    let token = CancellationToken::new();

    let tasks: Vec<_> = (0..12)
        .map(|id| {
            let executor = Arc::clone(&executor);
            let token = token.clone();
            tokio::spawn(async move {
                let result = executor
                    .execute(&token, move |attempt| lookup(id, attempt))
                    .await;
                (id, result)
            })
        })
        .collect();

    for task in tasks {
        let (id, result) = task.await?;
        match result {
            Ok(record) => println!("#{id:02}: {record}"),
            Err(Error::Resilience(kind)) => println!("#{id:02}: rejected ({})", kind.name()),
            Err(Error::Operation(e)) => println!("#{id:02}: operation error: {e}"),
        }
    }

    println!("\nMetrics:");
    println!("{}", serde_json::to_string_pretty(&executor.metrics())?);

    println!("\n=== Example Complete ===");
    Ok(())
}
