//! Greedy settlement matching: turning net balances into a minimal set of
//! suggested transfers.

use std::collections::HashSet;

use crate::Amount;
use crate::model::{Participant, PendingId, UserId};

use super::balance::BalanceMap;

/// A suggested transfer between two registered users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub from: UserId,
    pub to: UserId,
    pub amount: Amount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimDirection {
    ToReceive,
    ToPay,
}

/// A non-zero balance held by a pending member. No authenticated identity
/// exists to move money to or from, so the claim waits for registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingClaim {
    pub participant: PendingId,
    pub amount: Amount,
    pub direction: ClaimDirection,
}

/// Output of the matcher: transfers that can happen now, and claims
/// blocked on registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    pub ready: Vec<Transfer>,
    pub blocked: Vec<PendingClaim>,
}

/// Pair debtors with creditors into a minimal set of transfers.
///
/// Only registered members of `current` participate in pairing; pending
/// members are reported as blocked claims, and participants outside
/// `current` (departed members still present in the balance map) are
/// excluded entirely.
///
/// Both sides are sorted descending by amount with a stable sort, so equal
/// amounts keep the id order of the balance map and repeated runs over the
/// same balances produce the same plan. The two-pointer walk advances at
/// least one side per transfer, so it emits at most
/// debtors + creditors - 1 transfers. Transfer count is minimal only under
/// the assumption that preserving original debt pairs does not matter.
pub fn match_settlements(balances: &BalanceMap, current: &HashSet<Participant>) -> SettlementPlan {
    struct Side {
        user: UserId,
        remaining: Amount,
    }

    let mut creditors: Vec<Side> = Vec::new();
    let mut debtors: Vec<Side> = Vec::new();
    let mut blocked = Vec::new();

    for (&participant, &balance) in balances {
        if !current.contains(&participant) {
            continue;
        }
        match participant {
            Participant::Registered(user) => {
                if balance > Amount::ZERO {
                    creditors.push(Side {
                        user,
                        remaining: balance,
                    });
                } else if balance < Amount::ZERO {
                    debtors.push(Side {
                        user,
                        remaining: balance.abs(),
                    });
                }
            }
            Participant::Pending(pending) => {
                if !balance.is_zero() {
                    blocked.push(PendingClaim {
                        participant: pending,
                        amount: balance.abs(),
                        direction: if balance > Amount::ZERO {
                            ClaimDirection::ToReceive
                        } else {
                            ClaimDirection::ToPay
                        },
                    });
                }
            }
        }
    }

    // Stable: ties keep the balance map's id order.
    debtors.sort_by(|a, b| b.remaining.cmp(&a.remaining));
    creditors.sort_by(|a, b| b.remaining.cmp(&a.remaining));

    let mut ready = Vec::new();
    let (mut i, mut j) = (0, 0);

    while i < debtors.len() && j < creditors.len() {
        let settle = debtors[i].remaining.min(creditors[j].remaining);

        if settle > Amount::ZERO {
            ready.push(Transfer {
                from: debtors[i].user,
                to: creditors[j].user,
                amount: settle,
            });
        }

        debtors[i].remaining -= settle;
        creditors[j].remaining -= settle;

        if debtors[i].remaining.is_zero() {
            i += 1;
        }
        if creditors[j].remaining.is_zero() {
            j += 1;
        }
    }

    SettlementPlan { ready, blocked }
}
