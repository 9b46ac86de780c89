//! In-memory balance ledger
//!
//! The ledger is the single source of truth for funds. Balances are only
//! mutated by the swap executor through crate-internal primitives; callers
//! outside the crate read through [`BalanceLedger::get_balance`] and
//! [`BalanceLedger::view`].

use crate::{error::LedgerError, types::BalanceView};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

/// Exclusive right to validate and commit one swap against a ledger
pub type SwapPermit<'a> = MutexGuard<'a, ()>;

/// A debit of one token paired with a credit of another, applied as one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    /// Idempotency key; a transfer id is applied at most once
    pub id: Uuid,
    pub from_token: String,
    pub debit: Decimal,
    pub to_token: String,
    pub credit: Decimal,
    /// Rate the transfer was priced at; recorded, never used for balances
    pub rate: Decimal,
}

/// A transfer as it was committed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedTransfer {
    pub transfer: Transfer,
    pub applied_at: DateTime<Utc>,
}

/// Result of applying a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Both sides committed; the ledger moved to `version`
    Applied { version: u64, record: AppliedTransfer },
    /// The transfer id was applied before; nothing changed. Carries the
    /// record of the first application, not the replayed request.
    Duplicate(AppliedTransfer),
}

#[derive(Debug, Default)]
struct LedgerState {
    balances: HashMap<String, Decimal>,
    version: u64,
    /// Every committed transfer by id. Kept for the life of the ledger so a
    /// replay of any id is recognised; grows by one entry per swap.
    applied: HashMap<Uuid, AppliedTransfer>,
    view: Option<Arc<BalanceView>>,
}

impl LedgerState {
    fn balance(&self, token: &str) -> Decimal {
        self.balances.get(token).copied().unwrap_or(Decimal::ZERO)
    }

    /// Adds `amount` to a token balance, creating the entry if needed
    fn credit(&mut self, token: &str, amount: Decimal) -> Result<Decimal, LedgerError> {
        ensure_positive(amount)?;

        let updated = self
            .balance(token)
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Overflow {
                token: token.to_string(),
            })?;

        self.balances.insert(token.to_string(), updated);
        Ok(updated)
    }

    /// Removes `amount` from a token balance
    fn debit(&mut self, token: &str, amount: Decimal) -> Result<Decimal, LedgerError> {
        ensure_positive(amount)?;

        let available = self.balance(token);
        if amount > available {
            return Err(LedgerError::InsufficientFunds {
                token: token.to_string(),
                requested: amount,
                available,
            });
        }

        let updated = available - amount;
        self.balances.insert(token.to_string(), updated);
        Ok(updated)
    }

    fn commit(&mut self) -> u64 {
        self.version += 1;
        self.view = None;
        self.version
    }
}

/// Token balances held by one account
///
/// Memory grows with the number of applied swaps: every transfer id is
/// remembered so that replays stay idempotent.
#[derive(Debug, Default)]
pub struct BalanceLedger {
    state: RwLock<LedgerState>,
    swap_lock: Mutex<()>,
}

impl BalanceLedger {
    /// Creates an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger seeded with opening balances
    ///
    /// Negative opening balances are clamped to zero.
    pub fn with_balances<S: Into<String>>(
        balances: impl IntoIterator<Item = (S, Decimal)>,
    ) -> Self {
        let balances = balances
            .into_iter()
            .map(|(token, amount)| (token.into(), amount.max(Decimal::ZERO)))
            .collect();

        Self {
            state: RwLock::new(LedgerState {
                balances,
                ..LedgerState::default()
            }),
            swap_lock: Mutex::new(()),
        }
    }

    /// Current balance of a token, zero when the token was never credited
    pub async fn get_balance(&self, token: &str) -> Decimal {
        self.state.read().await.balance(token)
    }

    /// Number of committed mutations
    pub async fn version(&self) -> u64 {
        self.state.read().await.version
    }

    /// Snapshot of all balances
    ///
    /// Cached until the next mutation, so repeated reads between swaps
    /// share one allocation.
    pub async fn view(&self) -> Arc<BalanceView> {
        if let Some(view) = self.state.read().await.view.clone() {
            return view;
        }

        let mut state = self.state.write().await;
        if let Some(view) = state.view.clone() {
            return view;
        }

        let view = Arc::new(BalanceView {
            balances: state.balances.clone(),
            version: state.version,
            taken_at: Utc::now(),
        });
        state.view = Some(view.clone());
        view
    }

    /// Waits for the exclusive right to run a swap against this ledger
    pub async fn lock_swaps(&self) -> SwapPermit<'_> {
        self.swap_lock.lock().await
    }

    /// Applies both sides of a transfer under one write guard
    ///
    /// Debits then credits. If the credit fails the debit is restored before
    /// the guard is released, so readers never see one side without the
    /// other.
    pub(crate) async fn apply_transfer(
        &self,
        transfer: &Transfer,
    ) -> Result<TransferOutcome, LedgerError> {
        ensure_positive(transfer.credit)?;

        if transfer.from_token == transfer.to_token {
            return Err(LedgerError::InvariantViolation(format!(
                "transfer {} debits and credits {}",
                transfer.id, transfer.from_token
            )));
        }

        let mut state = self.state.write().await;

        if let Some(record) = state.applied.get(&transfer.id) {
            return Ok(TransferOutcome::Duplicate(record.clone()));
        }

        let before = state.balance(&transfer.from_token);
        state.debit(&transfer.from_token, transfer.debit)?;

        if let Err(e) = state.credit(&transfer.to_token, transfer.credit) {
            state.balances.insert(transfer.from_token.clone(), before);
            return Err(LedgerError::InvariantViolation(format!(
                "credit of {} {} failed after debit of {} {}: {}",
                transfer.credit, transfer.to_token, transfer.debit, transfer.from_token, e
            )));
        }

        let record = AppliedTransfer {
            transfer: transfer.clone(),
            applied_at: Utc::now(),
        };
        state.applied.insert(transfer.id, record.clone());
        let version = state.commit();

        Ok(TransferOutcome::Applied { version, record })
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::NonPositiveAmount(amount));
    }
    Ok(())
}
