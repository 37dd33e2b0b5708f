//! Shows the retry executors and the dynamic timeout controller at work
//! against a scripted server.
//!
//! Run with: cargo run --example adaptive_retries

use std::time::Duration;

use undertow::testing::MockTransport;
use undertow::{RetryClient, RetryConfig, RetryOptions};

const URL: &str = "http://api.example.com/items";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("======================================");
    println!("      Adaptive Retries Example        ");
    println!("======================================");

    example_sequential().await;
    example_raced().await;
    example_adaptation().await;

    println!("\n======================================");
    println!("          Examples Complete           ");
    println!("======================================");
}

async fn example_sequential() {
    println!("\n--- Sequential retries ---");

    // Two overloaded responses, then a good one.
    let transport = MockTransport::new()
        .reply(Duration::from_millis(20), 503)
        .reply(Duration::from_millis(20), 502)
        .always(Duration::from_millis(20), 200);
    let client = RetryClient::new(transport);

    match client.fetch_with_retry(URL, &RetryOptions::new()).await {
        Ok(response) => println!("status {} after {} requests", response.status, client.transport().request_count()),
        Err(e) => println!("failed: {}", e),
    }
}

async fn example_raced() {
    println!("\n--- Raced retries ---");

    // The first request stalls; the second one is fast.
    let transport = MockTransport::new()
        .reply(Duration::from_millis(600), 200)
        .always(Duration::from_millis(30), 200);
    let client = RetryClient::new(transport);
    let options = RetryOptions::new().timeout(Duration::from_millis(100));

    let start = tokio::time::Instant::now();
    match client.fetch_with_raced_retries(URL, &options).await {
        Ok(response) => println!("status {} in {:?}", response.status, start.elapsed()),
        Err(e) => println!("failed: {}", e),
    }
}

async fn example_adaptation() {
    println!("\n--- Dynamic timeout ---");

    let transport = MockTransport::new().always(Duration::from_millis(80), 200);
    let client = RetryClient::with_config(
        transport,
        RetryConfig::default().with_timeout(Duration::from_millis(100)),
    );

    for round in 1..=5 {
        if let Err(e) = client.fetch_with_retry(URL, &RetryOptions::new()).await {
            println!("round {} failed: {}", round, e);
        }
        println!(
            "round {}: base timeout {:?}, mean response {:?}",
            round,
            client.state().timeout(),
            client.state().average_response_time()
        );
    }
}
