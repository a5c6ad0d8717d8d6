//! Reconciliation: migrating a pending member's balance history onto a
//! newly registered user.

use tracing::{error, info};

use crate::Amount;
use crate::model::{Participant, PendingStatus, Timestamp, UserId};
use crate::store::LedgerStore;

use super::LedgerEngine;
use super::error::{EngineError, NotFound};

/// Summary of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconciliationOutcome {
    /// False when no invited pending member matched the phone number.
    pub reconciled: bool,
    pub groups_joined: u32,
    pub expenses_updated: u32,
    /// Net balance carried over, accumulated across the rewritten records
    /// (payer credit, split debit).
    pub net_balance: Amount,
}

impl ReconciliationOutcome {
    fn nothing_to_do() -> Self {
        ReconciliationOutcome {
            reconciled: false,
            groups_joined: 0,
            expenses_updated: 0,
            net_balance: Amount::ZERO,
        }
    }
}

/// Pre-registration view of what a phone number would inherit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPreview {
    pub display_name: String,
    pub group_count: usize,
    /// Net balance across split shares (owing is negative).
    pub pending_balance: Amount,
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Move a pending member's group memberships and expense references
    /// onto the newly registered `user`, all-or-nothing.
    ///
    /// Every group membership moves from the pending list to the member
    /// list, every expense reference (payer or split entry) is rewritten
    /// to the registered identity, and the pending member is marked
    /// resolved. A failure at any step restores the pre-call state; a
    /// half-moved identity would silently orphan balance history.
    pub fn reconcile_pending_member(
        &mut self,
        phone: &str,
        user: UserId,
        now: Timestamp,
    ) -> Result<ReconciliationOutcome, EngineError> {
        if self.store.user(user).is_none() {
            return Err(NotFound::User(user).into());
        }
        let Some(pending) = self.store.invited_member_by_phone(phone) else {
            info!(phone, user, "no pending member to reconcile");
            return Ok(ReconciliationOutcome::nothing_to_do());
        };
        let pending_id = pending.id;

        let snapshot = self.store.snapshot();
        match self.reconcile_inner(pending_id, user, now) {
            Ok(outcome) => {
                info!(
                    phone,
                    user,
                    groups_joined = outcome.groups_joined,
                    expenses_updated = outcome.expenses_updated,
                    net_balance = %outcome.net_balance,
                    "pending member reconciled"
                );
                Ok(outcome)
            }
            Err(cause) => {
                self.store.restore(snapshot);
                error!(phone, user, %cause, "reconciliation failed, rolled back");
                Err(EngineError::RolledBack(Box::new(cause)))
            }
        }
    }

    /// What the phone number's pending member would inherit on
    /// registration, for display before the fact.
    pub fn pending_member_preview(&self, phone: &str) -> Option<PendingPreview> {
        let pending = self.store.invited_member_by_phone(phone)?;
        let identity = Participant::Pending(pending.id);

        let mut pending_balance = Amount::ZERO;
        for id in self.store.expenses_with_participant(identity) {
            let Some(expense) = self.store.expense(id) else {
                continue;
            };
            for split in &expense.splits {
                if split.participant == identity {
                    pending_balance -= split.share;
                }
            }
        }

        Some(PendingPreview {
            display_name: pending.display_name.clone(),
            group_count: pending.groups.len(),
            pending_balance,
        })
    }

    fn reconcile_inner(
        &mut self,
        pending_id: crate::model::PendingId,
        user: UserId,
        now: Timestamp,
    ) -> Result<ReconciliationOutcome, EngineError> {
        let old_identity = Participant::Pending(pending_id);
        let new_identity = Participant::Registered(user);

        let group_ids = self
            .store
            .pending_member(pending_id)
            .ok_or(NotFound::PendingMember(pending_id))?
            .groups
            .clone();

        let mut groups_joined = 0u32;
        for group_id in group_ids {
            let group = self
                .store
                .group_mut(group_id)
                .ok_or(NotFound::Group(group_id))?;
            group.pending_members.retain(|&p| p != pending_id);
            if !group.members.contains(&user) {
                group.members.push(user);
            }
            groups_joined += 1;
        }

        let mut expenses_updated = 0u32;
        let mut net_balance = Amount::ZERO;
        for expense_id in self.store.expenses_with_participant(old_identity) {
            let expense = self
                .store
                .expense_mut(expense_id)
                .ok_or(NotFound::Expense(expense_id))?;
            let mut modified = false;

            for split in &mut expense.splits {
                if split.participant == old_identity {
                    split.participant = new_identity;
                    net_balance -= split.share;
                    modified = true;
                }
            }
            if expense.payer == old_identity {
                expense.payer = new_identity;
                net_balance += expense.amount;
                modified = true;
            }

            if modified {
                expense.has_pending_participants = expense.payer.is_pending()
                    || expense.splits.iter().any(|s| s.participant.is_pending());
                expenses_updated += 1;
            }
        }

        let pending = self
            .store
            .pending_member_mut(pending_id)
            .ok_or(NotFound::PendingMember(pending_id))?;
        pending.status = PendingStatus::Resolved;
        pending.resolved_to = Some(user);
        pending.resolved_at = Some(now);

        Ok(ReconciliationOutcome {
            reconciled: true,
            groups_joined,
            expenses_updated,
            net_balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, Expense, SplitEntry};
    use crate::store::{DirectoryStore, ExpenseStore, MemStore};

    const PHONE: &str = "+919900112233";

    fn seeded_engine() -> LedgerEngine<MemStore> {
        let mut store = MemStore::new();
        store.add_user(1, "Asha");
        store.add_user(2, "Bela");
        store.add_user(5, "Nayan");
        store.add_group(1, "flat", vec![1, 2], vec![9]);
        store.add_group(2, "trip", vec![1], vec![9]);
        store.add_pending_member(9, PHONE, "Nayan (invited)", vec![1, 2]);

        // Group 1: Asha paid 900, three-way split with the pending member
        store.insert_expense(Expense {
            id: 0,
            group: 1,
            payer: Participant::Registered(1),
            amount: Amount::from_scaled(90_000),
            splits: vec![
                SplitEntry {
                    participant: Participant::Registered(1),
                    share: Amount::from_scaled(30_000),
                },
                SplitEntry {
                    participant: Participant::Registered(2),
                    share: Amount::from_scaled(30_000),
                },
                SplitEntry {
                    participant: Participant::Pending(9),
                    share: Amount::from_scaled(30_000),
                },
            ],
            category: Category::Other,
            has_pending_participants: true,
            created_at: 0,
        });
        // Group 2: the pending member fronted 200, split with Asha
        store.insert_expense(Expense {
            id: 0,
            group: 2,
            payer: Participant::Pending(9),
            amount: Amount::from_scaled(20_000),
            splits: vec![
                SplitEntry {
                    participant: Participant::Registered(1),
                    share: Amount::from_scaled(10_000),
                },
                SplitEntry {
                    participant: Participant::Pending(9),
                    share: Amount::from_scaled(10_000),
                },
            ],
            category: Category::Other,
            has_pending_participants: true,
            created_at: 0,
        });

        LedgerEngine::new(store)
    }

    #[test]
    fn reconciliation_moves_memberships_and_rewrites_expenses() {
        let mut engine = seeded_engine();
        let outcome = engine.reconcile_pending_member(PHONE, 5, 100).unwrap();

        assert!(outcome.reconciled);
        assert_eq!(outcome.groups_joined, 2);
        assert_eq!(outcome.expenses_updated, 2);
        // -300 (split) + 200 (payer) - 100 (split) = -200
        assert_eq!(outcome.net_balance, Amount::from_scaled(-20_000));

        let store = engine.store();
        for group_id in [1, 2] {
            let group = store.group(group_id).unwrap();
            assert!(group.members.contains(&5));
            assert!(group.pending_members.is_empty());
        }

        for expense in store.group_expenses(1).into_iter().chain(store.group_expenses(2)) {
            assert!(!expense.has_pending_participants);
            assert!(expense.payer != Participant::Pending(9));
            assert!(
                expense
                    .splits
                    .iter()
                    .all(|s| s.participant != Participant::Pending(9))
            );
        }

        let pending = store.pending_member(9).unwrap();
        assert_eq!(pending.status, PendingStatus::Resolved);
        assert_eq!(pending.resolved_to, Some(5));
        assert_eq!(pending.resolved_at, Some(100));
    }

    #[test]
    fn balances_are_identical_across_the_identity_transition() {
        let mut engine = seeded_engine();

        let before = crate::engine::balance::compute_balances(
            [
                Participant::Registered(1),
                Participant::Registered(2),
                Participant::Pending(9),
            ],
            engine.store().group_expenses(1),
            [],
        );

        engine.reconcile_pending_member(PHONE, 5, 100).unwrap();

        let after = crate::engine::balance::compute_balances(
            [
                Participant::Registered(1),
                Participant::Registered(2),
                Participant::Registered(5),
            ],
            engine.store().group_expenses(1),
            [],
        );

        assert_eq!(
            before[&Participant::Pending(9)],
            after[&Participant::Registered(5)]
        );
        assert_eq!(
            before[&Participant::Registered(1)],
            after[&Participant::Registered(1)]
        );
    }

    #[test]
    fn unknown_phone_reports_nothing_to_do() {
        let mut engine = seeded_engine();
        let outcome = engine.reconcile_pending_member("+910000000000", 5, 0).unwrap();

        assert!(!outcome.reconciled);
        assert_eq!(outcome.groups_joined, 0);
        assert_eq!(outcome.expenses_updated, 0);
        assert_eq!(outcome.net_balance, Amount::ZERO);
    }

    #[test]
    fn resolved_member_does_not_reconcile_twice() {
        let mut engine = seeded_engine();
        engine.reconcile_pending_member(PHONE, 5, 0).unwrap();
        let again = engine.reconcile_pending_member(PHONE, 5, 0).unwrap();
        assert!(!again.reconciled);
    }

    #[test]
    fn unknown_user_is_rejected_before_any_mutation() {
        let mut engine = seeded_engine();
        let result = engine.reconcile_pending_member(PHONE, 99, 0);
        assert!(matches!(
            result,
            Err(EngineError::NotFound(NotFound::User(99)))
        ));
        assert_eq!(
            engine.store().pending_member(9).unwrap().status,
            PendingStatus::Invited
        );
    }

    #[test]
    fn mid_flight_failure_rolls_everything_back() {
        let mut engine = seeded_engine();
        // Corrupt the membership list so the second group lookup fails
        // after the first group has already been rewritten.
        engine
            .store_mut()
            .pending_member_mut(9)
            .unwrap()
            .groups = vec![1, 77];

        let result = engine.reconcile_pending_member(PHONE, 5, 0);
        assert!(matches!(result, Err(EngineError::RolledBack(_))));

        // Fully before: group 1 untouched, pending member still invited.
        let store = engine.store();
        let group = store.group(1).unwrap();
        assert_eq!(group.members, vec![1, 2]);
        assert_eq!(group.pending_members, vec![9]);
        assert_eq!(
            store.pending_member(9).unwrap().status,
            PendingStatus::Invited
        );
        let expense = &store.group_expenses(1)[0];
        assert!(expense.has_pending_participants);
    }

    #[test]
    fn preview_reports_inherited_balance() {
        let engine = seeded_engine();
        let preview = engine.pending_member_preview(PHONE).unwrap();

        assert_eq!(preview.display_name, "Nayan (invited)");
        assert_eq!(preview.group_count, 2);
        // Owes 300 in group 1 and 100 of their own fronted expense
        assert_eq!(preview.pending_balance, Amount::from_scaled(-40_000));
    }

    #[test]
    fn preview_is_none_for_unknown_phone() {
        let engine = seeded_engine();
        assert!(engine.pending_member_preview("+910000000000").is_none());
    }
}
