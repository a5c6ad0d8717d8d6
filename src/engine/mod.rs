//! Ledger engine: expense and settlement operations over pluggable
//! storage, plus balance and settlement-plan queries.
//!
//! The engine owns its store and mutates it through `&mut self`, so one
//! engine instance is a single writer: per-user score updates and the
//! duplicate-suppression check cannot race. Commands can also be fed from
//! an async stream via [`LedgerEngine::run`].

use std::collections::HashSet;

use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::Amount;
use crate::model::{
    Activity, ActivityKind, Category, Expense, ExpenseId, GroupId, Participant, PendingStatus,
    Settlement, SettlementId, SettlementStatus, SplitEntry, Timestamp, UserId, days_between,
};
use crate::store::LedgerStore;

pub mod balance;
mod credit;
mod error;
mod matcher;
mod reconcile;

pub use balance::{
    BalanceEntry, BalanceMap, BalanceStatus, BalanceSummary, GroupBalances, compute_balances,
};
pub use credit::{CreditOutcome, PenaltyResult, STREAK_TARGET, credit_tier};
pub use error::{EngineError, NotFound, ValidationError};
pub use matcher::{ClaimDirection, PendingClaim, SettlementPlan, Transfer, match_settlements};
pub use reconcile::{PendingPreview, ReconciliationOutcome};

/// Splits may drift from the expense amount by one minor unit, the
/// residue of splitting an indivisible total evenly.
const SPLIT_TOLERANCE: Amount = Amount::from_scaled(1);

/// A ledger operation, as fed by the ingestion surface.
#[derive(Debug, Clone)]
pub enum Command {
    AddExpense {
        group: GroupId,
        payer: UserId,
        amount: Amount,
        category: Category,
        splits: Vec<(Participant, Amount)>,
        at: Timestamp,
    },
    DeleteExpense {
        expense: ExpenseId,
        actor: UserId,
        at: Timestamp,
    },
    RecordSettlement {
        group: GroupId,
        from: UserId,
        to: UserId,
        amount: Amount,
        days_delayed: i64,
        at: Timestamp,
    },
    ReminderIgnored {
        user: UserId,
        settlement: SettlementId,
        at: Timestamp,
    },
    ScanDelays {
        user: UserId,
        at: Timestamp,
    },
    Reconcile {
        phone: String,
        user: UserId,
        at: Timestamp,
    },
}

/// The ledger engine. Owns a store and applies operations to it.
pub struct LedgerEngine<S> {
    store: S,
}

impl<S> LedgerEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}

/// Command dispatch
impl<S: LedgerStore> LedgerEngine<S> {
    /// Run the engine over a stream of commands.
    pub async fn run(&mut self, mut stream: impl Stream<Item = Command> + Unpin) {
        while let Some(command) = stream.next().await {
            // a failed command should not stop the engine
            let _ = self.apply(command);
        }
    }

    /// Apply a single command on top of the current state.
    pub fn apply(&mut self, command: Command) -> Result<(), EngineError> {
        match command {
            Command::AddExpense {
                group,
                payer,
                amount,
                category,
                splits,
                at,
            } => {
                let result = self.add_expense(group, payer, amount, category, splits, at);
                Self::log_result("expense", &result);
                result?;
            }
            Command::DeleteExpense { expense, actor, at } => {
                let result = self.delete_expense(expense, actor, at);
                Self::log_result("expense deletion", &result);
                result?;
            }
            Command::RecordSettlement {
                group,
                from,
                to,
                amount,
                days_delayed,
                at,
            } => {
                let result = self.record_settlement(group, from, to, amount, days_delayed, at);
                Self::log_result("settlement", &result);
                result?;
            }
            Command::ReminderIgnored {
                user,
                settlement,
                at,
            } => {
                let result = self.apply_reminder_ignored(user, settlement, at);
                Self::log_result("reminder penalty", &result);
                result?;
            }
            Command::ScanDelays { user, at } => {
                let result = self.scan_pending_delays(user, at);
                Self::log_result("delay scan", &result);
                result?;
            }
            Command::Reconcile { phone, user, at } => {
                let result = self.reconcile_pending_member(&phone, user, at);
                Self::log_result("reconciliation", &result);
                result?;
            }
        }
        Ok(())
    }

    /// Small helper to log `apply` results
    fn log_result<T>(operation: &str, result: &Result<T, EngineError>) {
        match result {
            Ok(_) => info!("{operation} applied"),
            Err(e) => info!(reason = %e, "{operation} skipped"),
        }
    }
}

/// Expense operations
impl<S: LedgerStore> LedgerEngine<S> {
    /// Record a shared expense paid by a registered member.
    ///
    /// Every split participant must belong to the group (pending ones
    /// still invited), shares must be non-negative, and the shares must
    /// sum to the amount within [`SPLIT_TOLERANCE`].
    pub fn add_expense(
        &mut self,
        group_id: GroupId,
        payer: UserId,
        amount: Amount,
        category: Category,
        splits: Vec<(Participant, Amount)>,
        now: Timestamp,
    ) -> Result<ExpenseId, EngineError> {
        if amount <= Amount::ZERO {
            return Err(ValidationError::NonPositiveAmount(amount).into());
        }
        let group = self.store.group(group_id).ok_or(NotFound::Group(group_id))?;
        if !group.has_member(payer) {
            return Err(ValidationError::NotGroupMember(payer, group_id).into());
        }

        let mut split_total = Amount::ZERO;
        let mut has_pending = false;
        let mut entries = Vec::with_capacity(splits.len());
        for (participant, share) in splits {
            if share < Amount::ZERO {
                return Err(ValidationError::NegativeShare(participant).into());
            }
            match participant {
                Participant::Registered(user) => {
                    if self.store.user(user).is_none() {
                        return Err(NotFound::User(user).into());
                    }
                    if !group.has_member(user) {
                        return Err(
                            ValidationError::ParticipantNotInGroup(participant, group_id).into()
                        );
                    }
                }
                Participant::Pending(pending) => {
                    let member = self
                        .store
                        .pending_member(pending)
                        .ok_or(NotFound::PendingMember(pending))?;
                    if member.status != PendingStatus::Invited
                        || !group.has_pending_member(pending)
                    {
                        return Err(
                            ValidationError::ParticipantNotInGroup(participant, group_id).into()
                        );
                    }
                    has_pending = true;
                }
            }
            split_total += share;
            entries.push(SplitEntry { participant, share });
        }

        if (split_total - amount).abs() > SPLIT_TOLERANCE {
            return Err(ValidationError::SplitMismatch { split_total, amount }.into());
        }

        let id = self.store.insert_expense(Expense {
            id: 0,
            group: group_id,
            payer: Participant::Registered(payer),
            amount,
            splits: entries,
            category,
            has_pending_participants: has_pending,
            created_at: now,
        });
        info!(group = group_id, payer, expense = id, amount = %amount, "expense added");
        self.log_activity(Activity {
            actor: payer,
            group: group_id,
            kind: ActivityKind::ExpenseAdded(id),
            at: now,
        });
        Ok(id)
    }

    /// Hard-delete an expense. Only the payer may do this.
    pub fn delete_expense(
        &mut self,
        expense_id: ExpenseId,
        actor: UserId,
        now: Timestamp,
    ) -> Result<(), EngineError> {
        let expense = self
            .store
            .expense(expense_id)
            .ok_or(NotFound::Expense(expense_id))?;
        if expense.payer != Participant::Registered(actor) {
            return Err(ValidationError::NotExpensePayer(actor, expense_id).into());
        }
        let group = expense.group;

        self.store.remove_expense(expense_id);
        info!(expense = expense_id, actor, "expense deleted");
        self.log_activity(Activity {
            actor,
            group,
            kind: ActivityKind::ExpenseDeleted(expense_id),
            at: now,
        });
        Ok(())
    }

    /// Expenses for a group, newest first, optionally filtered by category.
    pub fn expense_history(
        &self,
        group_id: GroupId,
        category: Option<Category>,
        limit: usize,
    ) -> Result<Vec<Expense>, EngineError> {
        if self.store.group(group_id).is_none() {
            return Err(NotFound::Group(group_id).into());
        }
        Ok(self
            .store
            .group_expenses(group_id)
            .into_iter()
            .rev()
            .filter(|e| category.is_none_or(|c| e.category == c))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Settlement operations
impl<S: LedgerStore> LedgerEngine<S> {
    /// Record a completed settlement and score the debtor.
    ///
    /// `days_delayed` is how long the underlying debt was outstanding;
    /// exactly one scoring reason is derived from it.
    pub fn record_settlement(
        &mut self,
        group_id: GroupId,
        from: UserId,
        to: UserId,
        amount: Amount,
        days_delayed: i64,
        now: Timestamp,
    ) -> Result<(SettlementId, CreditOutcome), EngineError> {
        self.validate_settlement(group_id, from, to, amount)?;

        let id = self.store.insert_settlement(Settlement {
            id: 0,
            group: group_id,
            from,
            to,
            amount,
            status: SettlementStatus::Completed,
            last_penalty_tier: Default::default(),
            credit_score_processed: false,
            reminder_count: 0,
            created_at: now,
            completed_at: Some(now),
        });

        let outcome = self.score_settlement_completion(from, days_delayed, id, now)?;
        if let Some(settlement) = self.store.settlement_mut(id) {
            settlement.credit_score_processed = true;
        }

        info!(group = group_id, from, to, settlement = id, amount = %amount, "settlement recorded");
        self.log_activity(Activity {
            actor: from,
            group: group_id,
            kind: ActivityKind::SettlementRecorded(id),
            at: now,
        });
        Ok((id, outcome))
    }

    /// Record a settlement that is promised but not confirmed yet. It ages
    /// under the delay penalty scanner until completed.
    pub fn record_pending_settlement(
        &mut self,
        group_id: GroupId,
        from: UserId,
        to: UserId,
        amount: Amount,
        now: Timestamp,
    ) -> Result<SettlementId, EngineError> {
        self.validate_settlement(group_id, from, to, amount)?;

        let id = self.store.insert_settlement(Settlement {
            id: 0,
            group: group_id,
            from,
            to,
            amount,
            status: SettlementStatus::Pending,
            last_penalty_tier: Default::default(),
            credit_score_processed: false,
            reminder_count: 0,
            created_at: now,
            completed_at: None,
        });
        info!(group = group_id, from, to, settlement = id, amount = %amount, "pending settlement recorded");
        Ok(id)
    }

    /// Confirm a pending settlement. The delay is measured from its
    /// creation, and the debtor is scored accordingly.
    pub fn complete_settlement(
        &mut self,
        settlement_id: SettlementId,
        now: Timestamp,
    ) -> Result<CreditOutcome, EngineError> {
        let (from, group, created_at) = {
            let settlement = self
                .store
                .settlement(settlement_id)
                .ok_or(NotFound::Settlement(settlement_id))?;
            if settlement.status == SettlementStatus::Completed {
                return Err(ValidationError::AlreadyCompleted(settlement_id).into());
            }
            (settlement.from, settlement.group, settlement.created_at)
        };

        let days_delayed = days_between(created_at, now);
        if let Some(settlement) = self.store.settlement_mut(settlement_id) {
            settlement.status = SettlementStatus::Completed;
            settlement.completed_at = Some(now);
        }

        let outcome = self.score_settlement_completion(from, days_delayed, settlement_id, now)?;
        if let Some(settlement) = self.store.settlement_mut(settlement_id) {
            settlement.credit_score_processed = true;
        }

        info!(settlement = settlement_id, from, days_delayed, "settlement completed");
        self.log_activity(Activity {
            actor: from,
            group,
            kind: ActivityKind::SettlementRecorded(settlement_id),
            at: now,
        });
        Ok(outcome)
    }

    /// Completed settlements for a group, most recent first.
    pub fn settlement_history(
        &self,
        group_id: GroupId,
        limit: usize,
    ) -> Result<Vec<Settlement>, EngineError> {
        if self.store.group(group_id).is_none() {
            return Err(NotFound::Group(group_id).into());
        }
        let mut all: Vec<Settlement> = self
            .store
            .group_completed_settlements(group_id)
            .into_iter()
            .cloned()
            .collect();
        all.sort_by(|a, b| b.completed_at.cmp(&a.completed_at).then(b.id.cmp(&a.id)));
        all.truncate(limit);
        Ok(all)
    }

    fn validate_settlement(
        &self,
        group_id: GroupId,
        from: UserId,
        to: UserId,
        amount: Amount,
    ) -> Result<(), EngineError> {
        if amount <= Amount::ZERO {
            return Err(ValidationError::NonPositiveAmount(amount).into());
        }
        if from == to {
            return Err(ValidationError::SelfSettlement(from).into());
        }
        let group = self.store.group(group_id).ok_or(NotFound::Group(group_id))?;
        if !group.has_member(from) {
            return Err(ValidationError::NotGroupMember(from, group_id).into());
        }
        if !group.has_member(to) {
            return Err(ValidationError::PayeeNotMember(to, group_id).into());
        }

        // Overpayment guard: the payer must be a net debtor, the payee a
        // net creditor, and the amount within what actually flows between
        // them.
        let balances = self.balances_for(group_id)?;
        let from_balance = balances
            .get(&Participant::Registered(from))
            .copied()
            .unwrap_or(Amount::ZERO);
        let to_balance = balances
            .get(&Participant::Registered(to))
            .copied()
            .unwrap_or(Amount::ZERO);

        if from_balance > Amount::ZERO {
            return Err(ValidationError::NothingOwed(from).into());
        }
        if to_balance < Amount::ZERO {
            return Err(ValidationError::PayeeNotOwed(to).into());
        }
        let due = from_balance.abs().min(to_balance);
        if amount > due {
            return Err(ValidationError::ExceedsDue {
                requested: amount,
                due,
            }
            .into());
        }
        Ok(())
    }
}

/// Queries
impl<S: LedgerStore> LedgerEngine<S> {
    /// Net balances for a group, split into active and pending views.
    pub fn group_balances(&self, group_id: GroupId) -> Result<GroupBalances, EngineError> {
        let group = self.store.group(group_id).ok_or(NotFound::Group(group_id))?;
        let members = group.members.clone();
        let pending_members = group.pending_members.clone();
        let balances = self.balances_for(group_id)?;

        let active = members
            .iter()
            .map(|&user| {
                let balance = balances
                    .get(&Participant::Registered(user))
                    .copied()
                    .unwrap_or(Amount::ZERO);
                BalanceEntry {
                    participant: Participant::Registered(user),
                    name: self
                        .store
                        .user(user)
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| format!("user-{user}")),
                    balance,
                    status: BalanceStatus::of(balance),
                }
            })
            .collect();

        let pending: Vec<BalanceEntry> = pending_members
            .iter()
            .map(|&id| {
                let balance = balances
                    .get(&Participant::Pending(id))
                    .copied()
                    .unwrap_or(Amount::ZERO);
                BalanceEntry {
                    participant: Participant::Pending(id),
                    name: self
                        .store
                        .pending_member(id)
                        .map(|pm| pm.display_name.clone())
                        .unwrap_or_else(|| format!("pending-{id}")),
                    balance,
                    status: BalanceStatus::of(balance),
                }
            })
            .collect();

        let total_expenses = self
            .store
            .group_expenses(group_id)
            .iter()
            .map(|e| e.amount)
            .sum();
        let pending_amount = pending.iter().map(|entry| entry.balance.abs()).sum();

        Ok(GroupBalances {
            active,
            pending,
            summary: BalanceSummary {
                total_expenses,
                pending_amount,
            },
        })
    }

    /// Suggested transfers for a group: ready ones between registered
    /// members, blocked claims for pending members.
    pub fn settlement_plan(&self, group_id: GroupId) -> Result<SettlementPlan, EngineError> {
        let group = self.store.group(group_id).ok_or(NotFound::Group(group_id))?;
        let current: HashSet<Participant> = group
            .members
            .iter()
            .map(|&u| Participant::Registered(u))
            .chain(group.pending_members.iter().map(|&p| Participant::Pending(p)))
            .collect();
        let balances = self.balances_for(group_id)?;
        Ok(match_settlements(&balances, &current))
    }

    /// Balance map over a consistent snapshot of the group's expenses and
    /// completed settlements.
    fn balances_for(&self, group_id: GroupId) -> Result<BalanceMap, EngineError> {
        let group = self.store.group(group_id).ok_or(NotFound::Group(group_id))?;
        let participants: Vec<Participant> = group
            .members
            .iter()
            .map(|&u| Participant::Registered(u))
            .chain(group.pending_members.iter().map(|&p| Participant::Pending(p)))
            .collect();
        Ok(compute_balances(
            participants,
            self.store.group_expenses(group_id),
            self.store.group_completed_settlements(group_id),
        ))
    }

    fn log_activity(&mut self, activity: Activity) {
        // Feed writes never block the money path.
        if let Err(e) = self.store.append_activity(activity) {
            warn!(error = %e, "activity entry dropped");
        }
    }
}
