//! Swap lifecycle state machine
//!
//! ```text
//! Idle -> Validating -> Rejected
//!                    -> Quoted -> Executing -> Applied
//!                                           -> Failed
//! ```

use crate::{
    error::{LifecycleError, SwapError},
    types::{SwapQuote, SwapReceipt, SwapRequest},
};
use uuid::Uuid;

/// State of one swap request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapState {
    Idle,
    Validating,
    Rejected(SwapError),
    Quoted(SwapQuote),
    Executing(SwapQuote),
    Applied(SwapReceipt),
    Failed(SwapError),
}

impl SwapState {
    pub fn name(&self) -> &'static str {
        match self {
            SwapState::Idle => "idle",
            SwapState::Validating => "validating",
            SwapState::Rejected(_) => "rejected",
            SwapState::Quoted(_) => "quoted",
            SwapState::Executing(_) => "executing",
            SwapState::Applied(_) => "applied",
            SwapState::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SwapState::Rejected(_) | SwapState::Applied(_) | SwapState::Failed(_)
        )
    }
}

/// One swap request moving through its lifecycle
#[derive(Debug, Clone)]
pub struct SwapTicket {
    id: Uuid,
    request: SwapRequest,
    state: SwapState,
}

impl SwapTicket {
    pub fn new(request: SwapRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            state: SwapState::Idle,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &SwapRequest {
        &self.request
    }

    pub fn state(&self) -> &SwapState {
        &self.state
    }

    /// Receipt, once applied
    pub fn receipt(&self) -> Option<&SwapReceipt> {
        match &self.state {
            SwapState::Applied(receipt) => Some(receipt),
            _ => None,
        }
    }

    /// Rejection or failure reason, once terminal
    pub fn error(&self) -> Option<&SwapError> {
        match &self.state {
            SwapState::Rejected(err) | SwapState::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Collapses a terminal ticket into its outcome, `None` while in progress
    pub fn into_result(self) -> Option<Result<SwapReceipt, SwapError>> {
        match self.state {
            SwapState::Applied(receipt) => Some(Ok(receipt)),
            SwapState::Rejected(err) | SwapState::Failed(err) => Some(Err(err)),
            _ => None,
        }
    }

    pub fn begin_validation(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            SwapState::Idle => {
                self.state = SwapState::Validating;
                Ok(())
            }
            _ => Err(self.illegal("validating")),
        }
    }

    pub fn reject(&mut self, reason: SwapError) -> Result<(), LifecycleError> {
        match self.state {
            SwapState::Validating => {
                self.state = SwapState::Rejected(reason);
                Ok(())
            }
            _ => Err(self.illegal("rejected")),
        }
    }

    pub fn quote(&mut self, quote: SwapQuote) -> Result<(), LifecycleError> {
        match self.state {
            SwapState::Validating => {
                self.state = SwapState::Quoted(quote);
                Ok(())
            }
            _ => Err(self.illegal("quoted")),
        }
    }

    /// Moves a quoted ticket to executing and hands back its quote
    pub fn begin_execution(&mut self) -> Result<SwapQuote, LifecycleError> {
        match &self.state {
            SwapState::Quoted(quote) => {
                let quote = quote.clone();
                self.state = SwapState::Executing(quote.clone());
                Ok(quote)
            }
            _ => Err(self.illegal("executing")),
        }
    }

    pub fn apply(&mut self, receipt: SwapReceipt) -> Result<(), LifecycleError> {
        match self.state {
            SwapState::Executing(_) => {
                self.state = SwapState::Applied(receipt);
                Ok(())
            }
            _ => Err(self.illegal("applied")),
        }
    }

    pub fn fail(&mut self, reason: SwapError) -> Result<(), LifecycleError> {
        match self.state {
            SwapState::Executing(_) => {
                self.state = SwapState::Failed(reason);
                Ok(())
            }
            _ => Err(self.illegal("failed")),
        }
    }

    fn illegal(&self, to: &'static str) -> LifecycleError {
        LifecycleError {
            from: self.state.name(),
            to,
        }
    }
}
