//! In-memory reference implementation of the storage seams.

use std::collections::{HashMap, HashSet};

use super::{
    ActivityError, ActivityStore, CreditStore, DirectoryStore, ExpenseStore, LedgerStore,
    SettlementStore,
};
use crate::model::{
    Activity, CreditRecord, CreditState, Expense, ExpenseId, Group, GroupId, Participant,
    PendingId, PendingMember, PendingStatus, ScoreReason, Settlement, SettlementId, UserId,
    UserProfile,
};

/// HashMap-backed store.
///
/// Also carries the setup surface (users, groups, pending members) that the
/// surrounding application would manage through its own CRUD layer.
#[derive(Debug, Default)]
pub struct MemStore {
    users: HashMap<UserId, UserProfile>,
    groups: HashMap<GroupId, Group>,
    pending: HashMap<PendingId, PendingMember>,
    expenses: HashMap<ExpenseId, Expense>,
    next_expense: ExpenseId,
    settlements: HashMap<SettlementId, Settlement>,
    next_settlement: SettlementId,
    credit_states: HashMap<UserId, CreditState>,
    credit_log: Vec<CreditRecord>,
    /// Dedup index over the log (insertion is check-and-append).
    credit_keys: HashSet<(UserId, SettlementId, ScoreReason)>,
    activities: Vec<Activity>,
    activity_capacity: Option<usize>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, id: UserId, name: impl Into<String>) {
        self.users.insert(id, UserProfile {
            id,
            name: name.into(),
        });
    }

    /// Create the user with a placeholder name if unknown.
    pub fn ensure_user(&mut self, id: UserId) {
        self.users
            .entry(id)
            .or_insert_with(|| UserProfile {
                id,
                name: format!("user-{id}"),
            });
    }

    pub fn add_group(
        &mut self,
        id: GroupId,
        name: impl Into<String>,
        members: Vec<UserId>,
        pending_members: Vec<PendingId>,
    ) {
        self.groups.insert(id, Group {
            id,
            name: name.into(),
            members,
            pending_members,
        });
    }

    pub fn add_pending_member(
        &mut self,
        id: PendingId,
        phone: impl Into<String>,
        display_name: impl Into<String>,
        groups: Vec<GroupId>,
    ) {
        self.pending.insert(id, PendingMember {
            id,
            phone: phone.into(),
            display_name: display_name.into(),
            groups,
            status: PendingStatus::Invited,
            resolved_to: None,
            resolved_at: None,
        });
    }

    /// Create the pending member with placeholder identity if unknown, and
    /// record the group membership.
    pub fn ensure_pending_member(&mut self, id: PendingId, group: GroupId) {
        let entry = self.pending.entry(id).or_insert_with(|| PendingMember {
            id,
            phone: format!("+000{id}"),
            display_name: format!("pending-{id}"),
            groups: Vec::new(),
            status: PendingStatus::Invited,
            resolved_to: None,
            resolved_at: None,
        });
        if !entry.groups.contains(&group) {
            entry.groups.push(group);
        }
    }

    /// Cap the activity feed. Appends beyond the cap fail, which callers
    /// treat as non-blocking.
    pub fn limit_activity_log(&mut self, capacity: usize) {
        self.activity_capacity = Some(capacity);
    }

    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn credit_log(&self) -> &[CreditRecord] {
        &self.credit_log
    }
}

impl DirectoryStore for MemStore {
    fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    fn group_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.get_mut(&id)
    }

    fn user(&self, id: UserId) -> Option<&UserProfile> {
        self.users.get(&id)
    }

    fn pending_member(&self, id: PendingId) -> Option<&PendingMember> {
        self.pending.get(&id)
    }

    fn pending_member_mut(&mut self, id: PendingId) -> Option<&mut PendingMember> {
        self.pending.get_mut(&id)
    }

    fn invited_member_by_phone(&self, phone: &str) -> Option<&PendingMember> {
        self.pending
            .values()
            .find(|pm| pm.phone == phone && pm.status == PendingStatus::Invited)
    }
}

impl ExpenseStore for MemStore {
    fn insert_expense(&mut self, mut expense: Expense) -> ExpenseId {
        self.next_expense += 1;
        expense.id = self.next_expense;
        self.expenses.insert(expense.id, expense);
        self.next_expense
    }

    fn expense(&self, id: ExpenseId) -> Option<&Expense> {
        self.expenses.get(&id)
    }

    fn expense_mut(&mut self, id: ExpenseId) -> Option<&mut Expense> {
        self.expenses.get_mut(&id)
    }

    fn remove_expense(&mut self, id: ExpenseId) -> Option<Expense> {
        self.expenses.remove(&id)
    }

    fn group_expenses(&self, group: GroupId) -> Vec<&Expense> {
        let mut all: Vec<&Expense> = self.expenses.values().filter(|e| e.group == group).collect();
        all.sort_by_key(|e| e.id);
        all
    }

    fn expenses_with_participant(&self, participant: Participant) -> Vec<ExpenseId> {
        let mut ids: Vec<ExpenseId> = self
            .expenses
            .values()
            .filter(|e| {
                e.payer == participant || e.splits.iter().any(|s| s.participant == participant)
            })
            .map(|e| e.id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

impl SettlementStore for MemStore {
    fn insert_settlement(&mut self, mut settlement: Settlement) -> SettlementId {
        self.next_settlement += 1;
        settlement.id = self.next_settlement;
        self.settlements.insert(settlement.id, settlement);
        self.next_settlement
    }

    fn settlement(&self, id: SettlementId) -> Option<&Settlement> {
        self.settlements.get(&id)
    }

    fn settlement_mut(&mut self, id: SettlementId) -> Option<&mut Settlement> {
        self.settlements.get_mut(&id)
    }

    fn group_completed_settlements(&self, group: GroupId) -> Vec<&Settlement> {
        let mut all: Vec<&Settlement> = self
            .settlements
            .values()
            .filter(|s| s.group == group && s.status == crate::model::SettlementStatus::Completed)
            .collect();
        all.sort_by_key(|s| s.id);
        all
    }

    fn debtor_pending_settlements(&self, user: UserId) -> Vec<SettlementId> {
        let mut ids: Vec<SettlementId> = self
            .settlements
            .values()
            .filter(|s| s.from == user && s.status == crate::model::SettlementStatus::Pending)
            .map(|s| s.id)
            .collect();
        ids.sort_unstable();
        ids
    }
}

impl CreditStore for MemStore {
    fn credit_state(&self, user: UserId) -> CreditState {
        self.credit_states.get(&user).copied().unwrap_or_default()
    }

    fn set_credit_state(&mut self, user: UserId, state: CreditState) {
        self.credit_states.insert(user, state);
    }

    fn append_credit_checked(&mut self, record: CreditRecord) -> bool {
        if record.reason.dedups()
            && let Some(settlement) = record.related_settlement
            && !self
                .credit_keys
                .insert((record.user, settlement, record.reason))
        {
            return false;
        }
        self.credit_log.push(record);
        true
    }

    fn credit_history(
        &self,
        user: UserId,
        limit: usize,
        skip: usize,
    ) -> (Vec<&CreditRecord>, usize) {
        let total = self.credit_log.iter().filter(|r| r.user == user).count();
        let page = self
            .credit_log
            .iter()
            .rev()
            .filter(|r| r.user == user)
            .skip(skip)
            .take(limit)
            .collect();
        (page, total)
    }
}

impl ActivityStore for MemStore {
    fn append_activity(&mut self, activity: Activity) -> Result<(), ActivityError> {
        if let Some(capacity) = self.activity_capacity
            && self.activities.len() >= capacity
        {
            return Err(ActivityError::LogFull);
        }
        self.activities.push(activity);
        Ok(())
    }
}

/// Clone of the collections reconciliation rewrites.
#[derive(Debug, Clone)]
pub struct MemSnapshot {
    groups: HashMap<GroupId, Group>,
    expenses: HashMap<ExpenseId, Expense>,
    pending: HashMap<PendingId, PendingMember>,
}

impl LedgerStore for MemStore {
    type Snapshot = MemSnapshot;

    fn snapshot(&self) -> MemSnapshot {
        MemSnapshot {
            groups: self.groups.clone(),
            expenses: self.expenses.clone(),
            pending: self.pending.clone(),
        }
    }

    fn restore(&mut self, snapshot: MemSnapshot) {
        self.groups = snapshot.groups;
        self.expenses = snapshot.expenses;
        self.pending = snapshot.pending;
    }
}
