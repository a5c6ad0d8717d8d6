//! Ledger aggregation: folding expenses and completed settlements into
//! per-participant net balances.

use std::collections::BTreeMap;

use crate::Amount;
use crate::model::{Expense, Participant, Settlement};

/// Net balance per participant. Positive means "is owed money", negative
/// means "owes money". Keyed by [`Participant`] so iteration order is
/// deterministic.
pub type BalanceMap = BTreeMap<Participant, Amount>;

/// Fold expenses and completed settlements into net balances.
///
/// Every listed participant starts at exactly zero. The payer is credited
/// the full expense amount and each split entry debited its share; a
/// completed settlement credits the debtor (less debt) and debits the
/// creditor (less owed). Participants only referenced by historical
/// records, such as members who have since left, are admitted into the map
/// rather than dropped, so money stays conserved; callers decide whether
/// to surface them.
pub fn compute_balances<'a>(
    participants: impl IntoIterator<Item = Participant>,
    expenses: impl IntoIterator<Item = &'a Expense>,
    completed_settlements: impl IntoIterator<Item = &'a Settlement>,
) -> BalanceMap {
    let mut balances: BalanceMap = participants.into_iter().map(|p| (p, Amount::ZERO)).collect();

    for expense in expenses {
        *balances.entry(expense.payer).or_default() += expense.amount;
        for split in &expense.splits {
            *balances.entry(split.participant).or_default() -= split.share;
        }
    }

    for settlement in completed_settlements {
        *balances
            .entry(Participant::Registered(settlement.from))
            .or_default() += settlement.amount;
        *balances
            .entry(Participant::Registered(settlement.to))
            .or_default() -= settlement.amount;
    }

    balances
}

/// One row of a group balance report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceEntry {
    pub participant: Participant,
    pub name: String,
    pub balance: Amount,
    pub status: BalanceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceStatus {
    Owed,
    Owes,
    Settled,
}

impl BalanceStatus {
    pub fn of(balance: Amount) -> Self {
        if balance > Amount::ZERO {
            BalanceStatus::Owed
        } else if balance < Amount::ZERO {
            BalanceStatus::Owes
        } else {
            BalanceStatus::Settled
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BalanceStatus::Owed => "owed",
            BalanceStatus::Owes => "owes",
            BalanceStatus::Settled => "settled",
        }
    }
}

/// Group balances split by participant kind, with totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBalances {
    pub active: Vec<BalanceEntry>,
    pub pending: Vec<BalanceEntry>,
    pub summary: BalanceSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceSummary {
    /// Sum of all expense amounts in the group.
    pub total_expenses: Amount,
    /// Sum of absolute balances held by pending members.
    pub pending_amount: Amount,
}
