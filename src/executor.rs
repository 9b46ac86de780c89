//! Swap execution against a balance ledger

use crate::{
    config::ExecutorConfig,
    constants::EVENT_CHANNEL_CAPACITY,
    error::SwapError,
    ledger::{AppliedTransfer, BalanceLedger, SwapPermit, Transfer, TransferOutcome},
    types::{SwapEvent, SwapQuote, SwapReceipt},
};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::sleep;
use uuid::Uuid;

/// Applies validated quotes to a ledger
///
/// Each quote moves funds at most once: executing a quote whose id was
/// already applied returns the receipt of that first application without
/// touching the ledger.
pub struct SwapExecutor {
    ledger: Arc<BalanceLedger>,
    config: ExecutorConfig,
    events: broadcast::Sender<SwapEvent>,
}

impl SwapExecutor {
    /// Creates an executor with its own event channel
    pub fn new(ledger: Arc<BalanceLedger>, config: ExecutorConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self::with_events(ledger, config, events)
    }

    /// Creates an executor publishing into an existing event channel
    pub fn with_events(
        ledger: Arc<BalanceLedger>,
        config: ExecutorConfig,
        events: broadcast::Sender<SwapEvent>,
    ) -> Self {
        Self {
            ledger,
            config,
            events,
        }
    }

    pub fn ledger(&self) -> &Arc<BalanceLedger> {
        &self.ledger
    }

    /// Subscribes to execution events
    pub fn subscribe(&self) -> broadcast::Receiver<SwapEvent> {
        self.events.subscribe()
    }

    /// Debits and credits both sides of the quote as one ledger mutation
    ///
    /// Waits for the ledger's swap permit, so concurrent executions
    /// against one ledger commit one at a time. Funds are re-checked under
    /// the permit; a quote validated against an older balance fails with
    /// `InsufficientFunds` instead of overdrawing.
    pub async fn execute(&self, quote: &SwapQuote) -> Result<SwapReceipt, SwapError> {
        let permit = self.ledger.lock_swaps().await;
        self.execute_with_permit(quote, &permit).await
    }

    /// Executes while the caller already holds the ledger's swap permit
    pub(crate) async fn execute_with_permit(
        &self,
        quote: &SwapQuote,
        _permit: &SwapPermit<'_>,
    ) -> Result<SwapReceipt, SwapError> {
        let transfer = Transfer {
            id: quote.id(),
            from_token: quote.from_token().to_string(),
            debit: quote.from_amount(),
            to_token: quote.to_token().to_string(),
            credit: quote.to_amount(),
            rate: quote.rate(),
        };

        if !self.config.execution_delay.is_zero() {
            sleep(self.config.execution_delay).await;
        }

        match self.ledger.apply_transfer(&transfer).await {
            Ok(TransferOutcome::Applied { version, record }) => {
                let receipt = receipt_for(&record);

                tracing::info!(
                    quote_id = %receipt.quote_id,
                    from = %receipt.from_token,
                    to = %receipt.to_token,
                    from_amount = %receipt.from_amount,
                    to_amount = %receipt.to_amount,
                    rate = %receipt.rate,
                    ledger_version = version,
                    "Swap applied"
                );
                let _ = self.events.send(SwapEvent::SwapApplied {
                    id: Uuid::new_v4(),
                    receipt: receipt.clone(),
                });

                Ok(receipt)
            }
            Ok(TransferOutcome::Duplicate(record)) => {
                if record.transfer != transfer {
                    tracing::warn!(
                        quote_id = %quote.id(),
                        "Replayed quote differs from the applied one, returning the applied receipt"
                    );
                } else {
                    tracing::debug!(quote_id = %quote.id(), "Quote already applied, replaying receipt");
                }
                Ok(receipt_for(&record))
            }
            Err(e) => {
                let err = SwapError::from(e);
                if err.is_fatal() {
                    tracing::error!(quote_id = %quote.id(), error = %err, "Ledger invariant violated");
                } else {
                    tracing::warn!(quote_id = %quote.id(), error = %err, "Swap execution failed");
                }
                let _ = self.events.send(SwapEvent::SwapFailed {
                    id: Uuid::new_v4(),
                    quote_id: quote.id(),
                    reason: err.to_string(),
                    timestamp: Utc::now(),
                });

                Err(err)
            }
        }
    }
}

fn receipt_for(record: &AppliedTransfer) -> SwapReceipt {
    let transfer = &record.transfer;
    SwapReceipt {
        quote_id: transfer.id,
        from_token: transfer.from_token.clone(),
        to_token: transfer.to_token.clone(),
        from_amount: transfer.debit,
        to_amount: transfer.credit,
        rate: transfer.rate,
        applied_at: record.applied_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::types::{PriceRecord, PriceSnapshot, SwapRequest};
    use crate::validator::SwapValidator;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn prices() -> PriceSnapshot {
        PriceSnapshot::from_records(
            vec![
                PriceRecord::new("BTC", dec!(45000)),
                PriceRecord::new("ETH", dec!(3000)),
                PriceRecord::new("USDC", dec!(1)),
            ],
            Duration::from_secs(300),
        )
    }

    fn quote(from: &str, to: &str, from_amount: Decimal, to_amount: Decimal) -> SwapQuote {
        SwapQuote::new(
            Uuid::new_v4(),
            from,
            to,
            from_amount,
            to_amount,
            to_amount / from_amount,
        )
    }

    #[tokio::test]
    async fn test_execute_moves_funds_and_invalidates_view() {
        let ledger = Arc::new(BalanceLedger::with_balances([("BTC", dec!(2))]));
        let executor = SwapExecutor::new(ledger.clone(), ExecutorConfig::immediate());
        let before = ledger.view().await;

        let quote = SwapValidator::new()
            .validate(&SwapRequest::new("BTC", "ETH", dec!(1)), &prices(), &before)
            .unwrap();
        let receipt = executor.execute(&quote).await.unwrap();

        assert_eq!(receipt.rate, dec!(15));
        assert_eq!(receipt.to_amount, dec!(15));
        assert_eq!(receipt.quote_id, quote.id());

        let after = ledger.view().await;
        assert!(!Arc::ptr_eq(&before, &after));
        assert_eq!(after.balance("BTC"), dec!(1));
        assert_eq!(after.balance("ETH"), dec!(15));
    }

    #[tokio::test]
    async fn test_replay_applies_once() {
        let ledger = Arc::new(BalanceLedger::with_balances([("BTC", dec!(2))]));
        let executor = SwapExecutor::new(ledger.clone(), ExecutorConfig::immediate());
        let q = quote("BTC", "ETH", dec!(1), dec!(15));

        let first = executor.execute(&q).await.unwrap();
        let second = executor.execute(&q).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(ledger.get_balance("BTC").await, dec!(1));
        assert_eq!(ledger.get_balance("ETH").await, dec!(15));
        assert_eq!(ledger.version().await, 1);
    }

    #[tokio::test]
    async fn test_replay_returns_applied_receipt_not_replayed_amounts() {
        let ledger = Arc::new(BalanceLedger::with_balances([("BTC", dec!(2))]));
        let executor = SwapExecutor::new(ledger.clone(), ExecutorConfig::immediate());
        let q = quote("BTC", "ETH", dec!(1), dec!(15));
        let first = executor.execute(&q).await.unwrap();

        let altered = SwapQuote::new(q.id(), "BTC", "ETH", dec!(1), dec!(999), dec!(999));
        let replay = executor.execute(&altered).await.unwrap();

        assert_eq!(replay, first);
        assert_eq!(replay.to_amount, dec!(15));
        assert_eq!(replay.rate, dec!(15));
        assert_eq!(ledger.get_balance("ETH").await, dec!(15));
    }

    #[tokio::test]
    async fn test_replay_across_executors_on_one_ledger() {
        let ledger = Arc::new(BalanceLedger::with_balances([("BTC", dec!(2))]));
        let a = SwapExecutor::new(ledger.clone(), ExecutorConfig::immediate());
        let b = SwapExecutor::new(ledger.clone(), ExecutorConfig::immediate());
        let q = quote("BTC", "ETH", dec!(1), dec!(15));

        let first = a.execute(&q).await.unwrap();
        let second = b.execute(&q).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(ledger.get_balance("BTC").await, dec!(1));
    }

    #[tokio::test]
    async fn test_stale_quote_cannot_overdraw() {
        let ledger = Arc::new(BalanceLedger::with_balances([("ETH", dec!(5))]));
        let executor = SwapExecutor::new(ledger.clone(), ExecutorConfig::immediate());
        let mut events = executor.subscribe();

        // Both quoted against the same opening balance
        let first = quote("ETH", "USDC", dec!(4), dec!(12000));
        let second = quote("ETH", "USDC", dec!(4), dec!(12000));

        executor.execute(&first).await.unwrap();
        let err = executor.execute(&second).await.unwrap_err();

        assert_eq!(err.available(), Some(dec!(1)));
        assert_eq!(ledger.get_balance("ETH").await, dec!(1));
        assert_eq!(ledger.get_balance("USDC").await, dec!(12000));

        assert_eq!(events.recv().await.unwrap().event_type(), "SWAP_APPLIED");
        assert_eq!(events.recv().await.unwrap().event_type(), "SWAP_FAILED");
    }

    #[tokio::test]
    async fn test_credit_overflow_is_fatal_and_atomic() {
        let ledger = Arc::new(BalanceLedger::with_balances([
            ("BTC", dec!(2)),
            ("ETH", Decimal::MAX),
        ]));
        let executor = SwapExecutor::new(ledger.clone(), ExecutorConfig::immediate());

        let err = executor
            .execute(&quote("BTC", "ETH", dec!(1), dec!(15)))
            .await
            .unwrap_err();

        assert!(err.is_fatal());
        assert!(matches!(
            err,
            SwapError::Ledger(LedgerError::InvariantViolation(_))
        ));
        assert_eq!(ledger.get_balance("BTC").await, dec!(2));
        assert_eq!(ledger.get_balance("ETH").await, Decimal::MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execution_delay_applies_before_commit() {
        let ledger = Arc::new(BalanceLedger::with_balances([("BTC", dec!(2))]));
        let executor = Arc::new(SwapExecutor::new(ledger.clone(), ExecutorConfig::default()));
        let q = quote("BTC", "ETH", dec!(1), dec!(15));

        let pending = {
            let executor = executor.clone();
            let q = q.clone();
            tokio::spawn(async move { executor.execute(&q).await })
        };

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert_eq!(ledger.get_balance("BTC").await, dec!(2));

        pending.await.unwrap().unwrap();
        assert_eq!(ledger.get_balance("BTC").await, dec!(1));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_concurrent_swaps_never_overdraw(
            opening_eth in 1u64..50,
            opening_usdc in 1u64..50_000,
            swaps in proptest::collection::vec((any::<bool>(), 1u64..40), 1..24),
        ) {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(4)
                .build()
                .unwrap();

            rt.block_on(async {
                let ledger = Arc::new(BalanceLedger::with_balances([
                    ("ETH", Decimal::from(opening_eth)),
                    ("USDC", Decimal::from(opening_usdc)),
                ]));
                let executor = Arc::new(SwapExecutor::new(ledger.clone(), ExecutorConfig::immediate()));
                let snapshot = Arc::new(PriceSnapshot::from_records(
                    vec![PriceRecord::new("ETH", dec!(3000)), PriceRecord::new("USDC", dec!(1))],
                    Duration::from_secs(300),
                ));

                // Every request is validated against the same opening view
                let opening = ledger.view().await;
                let handles: Vec<_> = swaps
                    .iter()
                    .filter_map(|(eth_to_usdc, units)| {
                        let request = if *eth_to_usdc {
                            SwapRequest::new("ETH", "USDC", Decimal::from(*units))
                        } else {
                            SwapRequest::new("USDC", "ETH", Decimal::from(*units * 1000))
                        };
                        SwapValidator::new().validate(&request, &snapshot, &opening).ok()
                    })
                    .map(|quote| {
                        let executor = executor.clone();
                        tokio::spawn(async move { executor.execute(&quote).await })
                    })
                    .collect();

                for handle in handles {
                    let _ = handle.await.unwrap();
                }

                let view = ledger.view().await;
                for balance in view.balances.values() {
                    assert!(*balance >= Decimal::ZERO, "balance went negative: {}", balance);
                }
            });
        }
    }
}
