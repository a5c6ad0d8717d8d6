//! Error taxonomy for ledger operations.

use thiserror::Error;

use crate::Amount;
use crate::model::{ExpenseId, GroupId, Participant, SettlementId, UserId};

/// Top-level error returned by [`LedgerEngine`](super::LedgerEngine) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    NotFound(#[from] NotFound),

    /// Reconciliation hit an error mid-flight; every change was rolled
    /// back. Surfaced hard because partial reconciliation would orphan
    /// balance history.
    #[error("reconciliation rolled back: {0}")]
    RolledBack(#[source] Box<EngineError>),
}

/// Malformed input. Never retried.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("amount {0} must be greater than 0")]
    NonPositiveAmount(Amount),

    #[error("split share for {0:?} cannot be negative")]
    NegativeShare(Participant),

    #[error("split total {split_total} does not match expense amount {amount}")]
    SplitMismatch { split_total: Amount, amount: Amount },

    #[error("user {0} cannot settle with themselves")]
    SelfSettlement(UserId),

    #[error("user {0} is not a member of group {1}")]
    NotGroupMember(UserId, GroupId),

    #[error("payee {0} is not a member of group {1}")]
    PayeeNotMember(UserId, GroupId),

    #[error("participant {0:?} is not part of group {1}")]
    ParticipantNotInGroup(Participant, GroupId),

    #[error("user {0} does not owe anything in this group")]
    NothingOwed(UserId),

    #[error("user {0} is not owed anything in this group")]
    PayeeNotOwed(UserId),

    #[error("amount {requested} exceeds the due balance of {due}")]
    ExceedsDue { requested: Amount, due: Amount },

    #[error("settlement {0} is already completed")]
    AlreadyCompleted(SettlementId),

    #[error("user {0} is not the payer of expense {1}")]
    NotExpensePayer(UserId, ExpenseId),
}

/// A referenced record is absent.
#[derive(Debug, Error)]
pub enum NotFound {
    #[error("group {0} not found")]
    Group(GroupId),

    #[error("user {0} not found")]
    User(UserId),

    #[error("expense {0} not found")]
    Expense(ExpenseId),

    #[error("settlement {0} not found")]
    Settlement(SettlementId),

    #[error("pending member {0} not found")]
    PendingMember(crate::model::PendingId),
}
