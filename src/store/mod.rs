//! Storage seams consumed by the engine.
//!
//! Each trait covers one external collaborator: the participant directory,
//! the expense store, the settlement store, the credit audit/state store,
//! and the best-effort activity feed. [`LedgerStore`] bundles them and adds
//! the snapshot/restore seam reconciliation uses for all-or-nothing
//! rollback when the backing store has no multi-record transactions.

use thiserror::Error;

use crate::model::{
    Activity, CreditRecord, CreditState, Expense, ExpenseId, Group, GroupId, Participant,
    PendingId, PendingMember, Settlement, SettlementId, UserId, UserProfile,
};

mod memory;
pub use memory::{MemSnapshot, MemStore};

/// Failure to persist an activity entry. Callers treat this as
/// non-blocking: log and continue.
#[derive(Debug, Error)]
pub enum ActivityError {
    #[error("activity log is full")]
    LogFull,
}

/// Groups, registered users, and pending members.
pub trait DirectoryStore {
    fn group(&self, id: GroupId) -> Option<&Group>;
    fn group_mut(&mut self, id: GroupId) -> Option<&mut Group>;
    fn user(&self, id: UserId) -> Option<&UserProfile>;
    fn pending_member(&self, id: PendingId) -> Option<&PendingMember>;
    fn pending_member_mut(&mut self, id: PendingId) -> Option<&mut PendingMember>;
    /// Look up a pending member by phone number, invited ones only.
    fn invited_member_by_phone(&self, phone: &str) -> Option<&PendingMember>;
}

/// Expense records for a group.
pub trait ExpenseStore {
    /// Persist an expense, assigning and returning its id.
    fn insert_expense(&mut self, expense: Expense) -> ExpenseId;
    fn expense(&self, id: ExpenseId) -> Option<&Expense>;
    fn expense_mut(&mut self, id: ExpenseId) -> Option<&mut Expense>;
    fn remove_expense(&mut self, id: ExpenseId) -> Option<Expense>;
    /// All expenses for a group, in creation order.
    fn group_expenses(&self, group: GroupId) -> Vec<&Expense>;
    /// Ids of expenses referencing a participant as payer or split entry.
    fn expenses_with_participant(&self, participant: Participant) -> Vec<ExpenseId>;
}

/// Settlement records for a group.
pub trait SettlementStore {
    /// Persist a settlement, assigning and returning its id.
    fn insert_settlement(&mut self, settlement: Settlement) -> SettlementId;
    fn settlement(&self, id: SettlementId) -> Option<&Settlement>;
    fn settlement_mut(&mut self, id: SettlementId) -> Option<&mut Settlement>;
    /// Completed settlements for a group, in creation order.
    fn group_completed_settlements(&self, group: GroupId) -> Vec<&Settlement>;
    /// Pending settlements where the user is the debtor, in creation order.
    fn debtor_pending_settlements(&self, user: UserId) -> Vec<SettlementId>;
}

/// Credit score state and its append-only audit log.
pub trait CreditStore {
    /// Current credit state, defaulting for users never scored before.
    fn credit_state(&self, user: UserId) -> CreditState;
    fn set_credit_state(&mut self, user: UserId, state: CreditState);

    /// Append an audit record unless an equal (user, settlement, reason)
    /// record already exists. Returns `false` without writing on a
    /// duplicate.
    ///
    /// The uniqueness key applies only when `related_settlement` is set
    /// and the reason is subject to dedup ([`crate::model::ScoreReason::dedups`]);
    /// other records always append. Check and append are one call so the
    /// suppression guarantee lives in the store, not in the caller.
    fn append_credit_checked(&mut self, record: CreditRecord) -> bool;

    /// A page of the user's audit history, most recent first, plus the
    /// total number of records for the user.
    fn credit_history(&self, user: UserId, limit: usize, skip: usize)
    -> (Vec<&CreditRecord>, usize);
}

/// Best-effort activity feed.
pub trait ActivityStore {
    fn append_activity(&mut self, activity: Activity) -> Result<(), ActivityError>;
}

/// Everything the engine needs from persistence.
pub trait LedgerStore:
    DirectoryStore + ExpenseStore + SettlementStore + CreditStore + ActivityStore
{
    /// Opaque copy of the state reconciliation may touch.
    type Snapshot;

    fn snapshot(&self) -> Self::Snapshot;
    fn restore(&mut self, snapshot: Self::Snapshot);
}
