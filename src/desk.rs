//! Swap desk: the entry point a front end drives
//!
//! Ties the price cache, ledger, validator and executor together and runs
//! each request through its lifecycle:
//!
//! ```text
//! check input -> get prices -> [swap permit] -> re-fetch if stale -> balance view -> validate -> execute
//! ```
//!
//! Validation and execution happen under one ledger swap permit, so two
//! requests can never both pass validation against the same balance.

use crate::{
    cache::PriceCache,
    config::ExecutorConfig,
    error::{LifecycleError, SwapError},
    executor::SwapExecutor,
    ledger::BalanceLedger,
    lifecycle::SwapTicket,
    types::{SwapEvent, SwapQuote, SwapReceipt, SwapRequest},
    validator::SwapValidator,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

pub struct SwapDesk {
    cache: PriceCache,
    ledger: Arc<BalanceLedger>,
    validator: SwapValidator,
    executor: SwapExecutor,
    events: broadcast::Sender<SwapEvent>,
}

impl SwapDesk {
    /// Creates a desk; swap events go to a fresh channel
    pub fn new(cache: PriceCache, ledger: Arc<BalanceLedger>, config: ExecutorConfig) -> Self {
        let (events, _) = broadcast::channel(crate::constants::EVENT_CHANNEL_CAPACITY);
        Self::with_events(cache, ledger, config, events)
    }

    /// Creates a desk publishing swap events into `events`
    ///
    /// Pass the same sender the cache was built with to get price and swap
    /// events on one channel.
    pub fn with_events(
        cache: PriceCache,
        ledger: Arc<BalanceLedger>,
        config: ExecutorConfig,
        events: broadcast::Sender<SwapEvent>,
    ) -> Self {
        let executor = SwapExecutor::with_events(ledger.clone(), config, events.clone());

        Self {
            cache,
            ledger,
            validator: SwapValidator::new(),
            executor,
            events,
        }
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    pub fn ledger(&self) -> &Arc<BalanceLedger> {
        &self.ledger
    }

    pub fn executor(&self) -> &SwapExecutor {
        &self.executor
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SwapEvent> {
        self.events.subscribe()
    }

    /// Current balance of a token
    pub async fn balance(&self, token: &str) -> Decimal {
        self.ledger.get_balance(token).await
    }

    /// Currencies that can be quoted right now, sorted
    pub async fn available_tokens(&self) -> Result<Vec<String>, SwapError> {
        let snapshot = self.cache.get_prices().await?;
        Ok(snapshot
            .available_tokens()
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Prices a request against fresh prices and current balances
    ///
    /// The returned quote can be passed to [`SwapExecutor::execute`] later;
    /// funds are checked again at that point.
    pub async fn quote(&self, request: &SwapRequest) -> Result<SwapQuote, SwapError> {
        self.validator.check_request(request)?;
        let snapshot = self.cache.get_prices().await?;
        let balances = self.ledger.view().await;
        self.validator.validate(request, &snapshot, &balances)
    }

    /// Runs one request through validation and execution
    ///
    /// The returned ticket is always in a terminal state. A
    /// `LifecycleError` means the desk itself misdrove the ticket.
    pub async fn submit(&self, request: SwapRequest) -> Result<SwapTicket, LifecycleError> {
        let mut ticket = SwapTicket::new(request);
        ticket.begin_validation()?;

        if let Err(e) = self.validator.check_request(ticket.request()) {
            return self.rejected(ticket, e);
        }

        // Fetch outside the permit so a slow refresh does not stall other swaps
        let snapshot = match self.cache.get_prices().await {
            Ok(snapshot) => snapshot,
            Err(e) => return self.rejected(ticket, e.into()),
        };

        let permit = self.ledger.lock_swaps().await;

        // The wait for the permit may have outlived the snapshot
        let snapshot = if snapshot.is_stale() {
            tracing::debug!(
                age_ms = snapshot.age().as_millis() as u64,
                "Snapshot went stale waiting for swap permit"
            );
            match self.cache.get_prices().await {
                Ok(snapshot) => snapshot,
                Err(e) => return self.rejected(ticket, e.into()),
            }
        } else {
            snapshot
        };

        let balances = self.ledger.view().await;

        match self.validator.validate(ticket.request(), &snapshot, &balances) {
            Ok(quote) => ticket.quote(quote)?,
            Err(e) => return self.rejected(ticket, e),
        }

        let quote = ticket.begin_execution()?;
        match self.executor.execute_with_permit(&quote, &permit).await {
            Ok(receipt) => ticket.apply(receipt)?,
            Err(e) => ticket.fail(e)?,
        }

        Ok(ticket)
    }

    /// Submits a request and collapses the ticket into its outcome
    pub async fn swap(&self, request: SwapRequest) -> Result<SwapReceipt, SwapError> {
        let ticket = self.submit(request).await?;
        let state = ticket.state().name();

        match ticket.into_result() {
            Some(outcome) => outcome,
            None => Err(LifecycleError {
                from: state,
                to: "terminal",
            }
            .into()),
        }
    }

    fn rejected(
        &self,
        mut ticket: SwapTicket,
        reason: SwapError,
    ) -> Result<SwapTicket, LifecycleError> {
        tracing::info!(
            ticket = %ticket.id(),
            from = %ticket.request().from_token,
            to = %ticket.request().to_token,
            reason = %reason,
            "Swap rejected"
        );
        let _ = self.events.send(SwapEvent::SwapRejected {
            id: Uuid::new_v4(),
            from_token: ticket.request().from_token.clone(),
            to_token: ticket.request().to_token.clone(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });

        ticket.reject(reason)?;
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PriceCacheConfig;
    use crate::error::ProviderError;
    use crate::lifecycle::SwapState;
    use crate::provider::mock::MockSource;
    use crate::types::PriceRecord;
    use rust_decimal_macros::dec;

    fn desk_with(balances: &[(&str, Decimal)]) -> (SwapDesk, Arc<MockSource>) {
        let source = Arc::new(MockSource::new(vec![
            PriceRecord::new("BTC", dec!(45000)),
            PriceRecord::new("ETH", dec!(3000)),
            PriceRecord::new("USDC", dec!(1)),
        ]));
        let cache = PriceCache::new(source.clone(), PriceCacheConfig::default());
        let ledger = Arc::new(BalanceLedger::with_balances(
            balances.iter().map(|(t, a)| (t.to_string(), *a)),
        ));
        (
            SwapDesk::new(cache, ledger, ExecutorConfig::immediate()),
            source,
        )
    }

    #[tokio::test]
    async fn test_submit_applies_swap() {
        let (desk, _) = desk_with(&[("BTC", dec!(1))]);

        let ticket = desk
            .submit(SwapRequest::new("BTC", "ETH", dec!(1)))
            .await
            .unwrap();

        let receipt = ticket.receipt().unwrap();
        assert_eq!(receipt.rate, dec!(15));
        assert_eq!(receipt.to_amount, dec!(15));
        assert_eq!(desk.balance("BTC").await, dec!(0));
        assert_eq!(desk.balance("ETH").await, dec!(15));
    }

    #[tokio::test]
    async fn test_identical_tokens_do_not_touch_ledger_or_prices() {
        let (desk, source) = desk_with(&[("BTC", dec!(1))]);
        let mut events = desk.subscribe();

        let ticket = desk
            .submit(SwapRequest::new("BTC", "BTC", dec!(1)))
            .await
            .unwrap();

        assert_eq!(
            ticket.state(),
            &SwapState::Rejected(SwapError::IdenticalTokens("BTC".to_string()))
        );
        assert_eq!(desk.ledger().version().await, 0);
        assert_eq!(source.call_count(), 0);
        assert_eq!(events.recv().await.unwrap().event_type(), "SWAP_REJECTED");
    }

    #[tokio::test]
    async fn test_insufficient_funds_rejected() {
        let (desk, _) = desk_with(&[("ETH", dec!(5))]);

        let err = desk
            .swap(SwapRequest::new("ETH", "BTC", dec!(10)))
            .await
            .unwrap_err();

        assert_eq!(err.available(), Some(dec!(5)));
        assert_eq!(desk.balance("ETH").await, dec!(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_price_outage_rejects_with_fetch_error() {
        let (desk, source) = desk_with(&[("BTC", dec!(1))]);
        for _ in 0..3 {
            source.push_error(ProviderError::Timeout);
        }

        let err = desk
            .swap(SwapRequest::new("BTC", "ETH", dec!(1)))
            .await
            .unwrap_err();

        assert!(matches!(err, SwapError::Prices(_)));
        assert_eq!(desk.balance("BTC").await, dec!(1));
    }

    #[tokio::test]
    async fn test_quote_then_execute_and_reverse() {
        let (desk, _) = desk_with(&[("BTC", dec!(2))]);

        let quote = desk
            .quote(&SwapRequest::new("BTC", "ETH", dec!(1)))
            .await
            .unwrap();
        desk.executor().execute(&quote).await.unwrap();

        let back = desk.swap(quote.reversed()).await.unwrap();
        let tolerance = dec!(0.000000000001);
        assert!((back.to_amount - dec!(1)).abs() < tolerance);
        assert!((desk.balance("BTC").await - dec!(2)).abs() < tolerance);
        assert_eq!(desk.balance("ETH").await, dec!(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_stale_after_permit_wait_is_refreshed() {
        let (desk, source) = desk_with(&[("BTC", dec!(1))]);
        let desk = Arc::new(desk);

        let permit = desk.ledger().lock_swaps().await;
        let pending = {
            let desk = desk.clone();
            tokio::spawn(async move { desk.submit(SwapRequest::new("BTC", "ETH", dec!(1))).await })
        };

        while desk.cache().latest().await.is_none() {
            tokio::task::yield_now().await;
        }
        assert_eq!(source.call_count(), 1);

        // Queued behind another swap past the stale threshold
        tokio::time::advance(std::time::Duration::from_secs(301)).await;
        drop(permit);

        let ticket = pending.await.unwrap().unwrap();
        assert!(ticket.receipt().is_some());
        assert_eq!(source.call_count(), 2);
    }

    #[tokio::test]
    async fn test_available_tokens_sorted() {
        let (desk, _) = desk_with(&[]);
        assert_eq!(
            desk.available_tokens().await.unwrap(),
            vec!["BTC", "ETH", "USDC"]
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submits_serialize() {
        let (desk, _) = desk_with(&[("ETH", dec!(5))]);
        let desk = Arc::new(desk);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let desk = desk.clone();
                tokio::spawn(async move { desk.swap(SwapRequest::new("ETH", "USDC", dec!(1))).await })
            })
            .collect();

        let mut applied = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => applied += 1,
                Err(e) => assert_eq!(e.available(), Some(dec!(0))),
            }
        }

        assert_eq!(applied, 5);
        assert_eq!(desk.balance("ETH").await, dec!(0));
        assert_eq!(desk.balance("USDC").await, dec!(15000));
    }
}
