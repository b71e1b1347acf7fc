//! Circuit breaker example demonstrating failure isolation.
//!
//! This example shows how to:
//! - Configure failure thresholds and the cooldown
//! - Observe state transitions through a callback
//! - Handle open circuit rejections
//! - Monitor circuit breaker metrics
//!
//! Run with: cargo run --example with_circuit_breaker

use bulwark::prelude::*;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Simulated dependency that fails its first `failures` calls.
struct FlakyService {
    calls: AtomicU32,
    failures: u32,
}

impl FlakyService {
    async fn call(&self) -> Result<&'static str, io::Error> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if n < self.failures {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"))
        } else {
            Ok("pong")
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Circuit Breaker Example ===\n");

    let service = Arc::new(FlakyService {
        calls: AtomicU32::new(0),
        failures: 4,
    });

    let config = CircuitBreakerConfig::default()
        .with_failure_threshold(3)
        .with_success_threshold(2)
        .with_cooldown(Duration::from_secs(2));

    println!("Circuit Breaker Configuration:");
    println!("  Failure threshold: {}", config.failure_threshold);
    println!("  Success threshold: {}", config.success_threshold);
    println!("  Cooldown: {:?}", config.cooldown);
    println!();

    let breaker = CircuitBreaker::new(config)
        .with_name("flaky-service")
        .on_state_change(|from, to| println!("  >> transition {from} -> {to}"));

    let token = CancellationToken::new();

    println!("Sending requests to trigger the circuit breaker...\n");
    for i in 1..=6 {
        println!("Request #{}: state = {}", i, breaker.state());

        let service = Arc::clone(&service);
        match breaker
            .execute(&token, |_| async move { service.call().await })
            .await
        {
            Ok(reply) => println!("  success: {reply}"),
            Err(e) if e.is_circuit_open() => println!("  circuit OPEN, request rejected"),
            Err(e) => println!("  failed: {e}"),
        }
    }

    let metrics = breaker.metrics();
    println!(
        "\nMetrics: {} total, {} rejected, opened {} times (rejection rate {:.0}%)",
        metrics.total_requests,
        metrics.rejected_requests,
        metrics.times_opened,
        metrics.rejection_rate() * 100.0
    );

    println!("\nWaiting for the cooldown...");
    tokio::time::sleep(Duration::from_millis(2100)).await;
    println!("Current state: {}", breaker.state());

    println!("\n=== Demonstrating Recovery ===\n");
    for i in 1..=3 {
        let service = Arc::clone(&service);
        let result = breaker
            .execute(&token, |_| async move { service.call().await })
            .await;
        println!("Probe #{}: {:?} (state now {})", i, result.map_err(|e| e.to_string()), breaker.state());
    }

    println!("\nFinal metrics: {:?}", breaker.metrics());

    println!("\n=== Manual Control ===\n");
    breaker.force_open();
    println!("After force_open: {}", breaker.state());
    breaker.reset();
    println!("After reset: {}", breaker.state());

    println!("\n=== Example Complete ===");
    Ok(())
}
