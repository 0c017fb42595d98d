//! Example: retrying a flaky operation
//!
//! This example demonstrates:
//! 1. Fixed-delay retries with an attempt limit
//! 2. Exponential backoff with jitter
//! 3. Cancelling a retry loop from another task
//! 4. Recovering a panic inside the operation
//!
//! Run with:
//! ```bash
//! cargo run -p steadfast --example retry_demo
//! ```

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};
use steadfast::prelude::*;

/// A simulated service that fails the first few times
struct FlakyService {
    calls: Arc<AtomicU32>,
    fail_count: u32,
}

impl FlakyService {
    fn new(fail_count: u32) -> Self {
        Self {
            calls: Arc::new(AtomicU32::new(0)),
            fail_count,
        }
    }

    async fn call(&self) -> Result<String, Attempt<std::io::Error>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if call <= self.fail_count {
            println!("  Call {call}: FAILED (transient)");
            Err(std::io::Error::other(format!("transient error on call {call}"))).retryable()
        } else {
            println!("  Call {call}: SUCCESS");
            Ok("payload".to_string())
        }
    }

    fn total_calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Example 1: Fixed delay with an attempt limit
async fn example_fixed_delay() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 1: Fixed Delay ===\n");

    let retry = Retry::builder().base_delay(Duration::from_millis(50)).build();
    let service = FlakyService::new(2);

    let start = Instant::now();
    let payload = retry.ensure_times(5, || service.call()).await?;

    println!(
        "\nGot {payload:?} after {} calls in {:?}",
        service.total_calls(),
        start.elapsed()
    );
    Ok(())
}

/// Example 2: Exponential backoff with jitter, budget exhausted
async fn example_backoff() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 2: Exponential Backoff (budget exhausted) ===\n");

    let backoff = Backoff::new(Duration::from_millis(20), Duration::from_millis(200), 2.0).with_jitter(true);
    let retry = Retry::builder().backoff(backoff).build();
    let service = FlakyService::new(10);

    match retry.ensure_times(4, || service.call()).await {
        Ok(_) => println!("\nUnexpected success"),
        Err(err) => println!("\nGave up after {} calls: {err}", service.total_calls()),
    }
    Ok(())
}

/// Example 3: Cancel from another task
async fn example_cancel() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 3: Cancellation ===\n");

    let signal = CancelSignal::new();
    let retry = Retry::builder()
        .signal(signal.clone())
        .base_delay(Duration::from_secs(5))
        .build();
    let service = FlakyService::new(u32::MAX);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        signal.cancel_with("operator pressed ctrl-c");
    });

    let start = Instant::now();
    let err = retry
        .ensure(|| service.call())
        .await
        .expect_err("service never succeeds");
    println!("\nStopped after {:?}: {err}", start.elapsed());
    Ok(())
}

/// Example 4: Panic recovery
async fn example_panic() -> Result<(), Box<dyn Error>> {
    println!("\n=== Example 4: Panic Recovery ===\n");

    let retry = Retry::builder().recover_panics().build();
    let result = retry
        .ensure(|| async {
            let config: Option<&str> = None;
            Ok::<_, Attempt>(config.expect("config must be loaded").len())
        })
        .await;

    if let Err(err) = result {
        println!("Recovered: {err}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    example_fixed_delay().await?;
    example_backoff().await?;
    example_cancel().await?;
    example_panic().await?;
    Ok(())
}
