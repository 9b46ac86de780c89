use rust_decimal::Decimal;
use std::sync::Arc;
use token_swap_sdk::{
    token_icon_url, BalanceLedger, ExecutorConfig, FixedPriceSource, HttpPriceSource, PriceCache,
    PriceCacheConfig, PriceSource, SwapDesk, SwapRequest,
};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    println!("Token Swap Example");
    println!("==================");

    let config = PriceCacheConfig::from_env();

    // SWAP_DEMO_LIVE=1 uses the hosted price list instead of fixed prices
    let source: Arc<dyn PriceSource> = if std::env::var("SWAP_DEMO_LIVE").is_ok() {
        Arc::new(HttpPriceSource::new(&config)?)
    } else {
        Arc::new(FixedPriceSource::new([
            ("BTC", Decimal::from(45000)),
            ("ETH", Decimal::from(3000)),
            ("USDC", Decimal::from(1)),
        ]))
    };

    let (events, mut rx) = broadcast::channel(64);
    let cache = PriceCache::with_events(source, config, events.clone());
    let ledger = Arc::new(BalanceLedger::with_balances([
        ("ETH", Decimal::from(5)),
        ("USDC", Decimal::from(1000)),
    ]));
    let desk = SwapDesk::with_events(cache, ledger, ExecutorConfig::default(), events);

    tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            println!("  [{}] {}", event.event_type(), event);
        }
    });

    println!("\nAvailable tokens:");
    for token in desk.available_tokens().await? {
        println!("  {:<8} {}", token, token_icon_url(&token));
    }

    let requests = [
        ("ETH", "USDC", "1.5"),
        ("ETH", "BTC", "10"),
        ("USDC", "USDC", "5"),
        ("USDC", "ETH", "abc"),
        ("USDC", "BTC", "450"),
    ];

    for (from, to, amount) in requests {
        println!("\n{:-<50}", "");
        println!("{} {} -> {}", amount, from, to);

        let request = match SwapRequest::from_input(from, to, amount) {
            Ok(request) => request,
            Err(e) => {
                println!("  rejected: {}", e);
                continue;
            }
        };

        match desk.swap(request).await {
            Ok(receipt) => println!(
                "  received {} {} at rate {}",
                receipt.to_amount, receipt.to_token, receipt.rate
            ),
            Err(e) => println!("  failed: {}", e),
        }
    }

    println!("\n{:-<50}", "");
    println!("Final balances:");
    let view = desk.ledger().view().await;
    let mut balances: Vec<_> = view.balances.iter().collect();
    balances.sort();
    for (token, amount) in balances {
        println!("  {:<8} {}", token, amount);
    }

    let health = desk.cache().health_check().await;
    let metrics = desk.cache().fetch_metrics().await;
    println!(
        "\nPrice cache: {:?}, {} refreshes, p50 {}ms",
        health.status, metrics.total_refreshes, metrics.latency_p50_ms
    );

    Ok(())
}
