//! Core domain types for the expense ledger.

use crate::Amount;

/// Registered user identifier.
pub type UserId = u32;

/// Group identifier.
pub type GroupId = u32;

/// Expense identifier.
pub type ExpenseId = u32;

/// Settlement identifier.
pub type SettlementId = u32;

/// Pending (not yet registered) member identifier.
pub type PendingId = u32;

/// Unix timestamp in seconds.
pub type Timestamp = i64;

pub const SECS_PER_DAY: i64 = 86_400;

/// Whole days elapsed between two timestamps, floored.
pub fn days_between(earlier: Timestamp, later: Timestamp) -> i64 {
    (later - earlier).div_euclid(SECS_PER_DAY)
}

/// A balance-bearing identity: either a registered user or an invited
/// contact who has not registered yet.
///
/// Pending participants take part in balance arithmetic exactly like
/// registered users; only money movement is restricted to registered ones.
/// The `Ord` impl gives collections keyed by participant a stable order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Participant {
    Registered(UserId),
    Pending(PendingId),
}

impl Participant {
    pub fn is_pending(self) -> bool {
        matches!(self, Participant::Pending(_))
    }
}

/// One participant's share of an expense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitEntry {
    pub participant: Participant,
    pub share: Amount,
}

/// Expense category, for history filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Category {
    Food,
    Transport,
    Entertainment,
    Utilities,
    Rent,
    Shopping,
    Health,
    #[default]
    Other,
}

/// A shared expense: one payer, split across participants.
///
/// Immutable once created; the only lifecycle transition is hard deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expense {
    pub id: ExpenseId,
    pub group: GroupId,
    pub payer: Participant,
    pub amount: Amount,
    pub splits: Vec<SplitEntry>,
    pub category: Category,
    pub has_pending_participants: bool,
    pub created_at: Timestamp,
}

/// Settlement lifecycle state. Completed settlements stop aging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SettlementStatus {
    Pending,
    #[default]
    Completed,
}

/// Highest delay-penalty threshold already applied to a settlement.
///
/// Only ever increases for the life of a settlement record, which is what
/// prevents double-penalizing the same aging debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PenaltyTier {
    #[default]
    None,
    Day3,
    Day7,
    Day15,
}

impl PenaltyTier {
    /// Days outstanding at which this tier starts to apply.
    pub fn min_days(self) -> i64 {
        match self {
            PenaltyTier::None => 0,
            PenaltyTier::Day3 => 3,
            PenaltyTier::Day7 => 7,
            PenaltyTier::Day15 => 15,
        }
    }

    pub fn reason(self) -> Option<ScoreReason> {
        match self {
            PenaltyTier::None => None,
            PenaltyTier::Day3 => Some(ScoreReason::DelayedGt3),
            PenaltyTier::Day7 => Some(ScoreReason::DelayedGt7),
            PenaltyTier::Day15 => Some(ScoreReason::DelayedGt15),
        }
    }
}

/// A recorded payment between two registered users.
///
/// From/to are `UserId` rather than [`Participant`]: money never moves to
/// or from an unregistered identity, so the restriction lives in the type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    pub id: SettlementId,
    pub group: GroupId,
    /// The debtor paying off the debt.
    pub from: UserId,
    /// The creditor receiving the payment.
    pub to: UserId,
    pub amount: Amount,
    pub status: SettlementStatus,
    pub last_penalty_tier: PenaltyTier,
    pub credit_score_processed: bool,
    pub reminder_count: u32,
    pub created_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

/// Why a credit score changed. Deltas are fixed, not configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreReason {
    /// Settled within 24h.
    OnTimeSettlement,
    /// Settled within 3 days.
    SettlementWithin3d,
    /// Five positive events in a row.
    ConsecutiveBonus,
    /// More than 3 days late.
    DelayedGt3,
    /// More than 7 days late.
    DelayedGt7,
    /// More than 15 days late.
    DelayedGt15,
    /// A payment reminder went unanswered.
    ReminderIgnored,
}

impl ScoreReason {
    pub fn delta(self) -> i32 {
        match self {
            ScoreReason::OnTimeSettlement => 10,
            ScoreReason::SettlementWithin3d => 5,
            ScoreReason::ConsecutiveBonus => 20,
            ScoreReason::DelayedGt3 => -15,
            ScoreReason::DelayedGt7 => -25,
            ScoreReason::DelayedGt15 => -40,
            ScoreReason::ReminderIgnored => -10,
        }
    }

    /// The single reason scored when a settlement completes after
    /// `days_delayed` days. Exactly one reason per completion, no stacking.
    pub fn from_delay(days_delayed: i64) -> Self {
        if days_delayed <= 1 {
            ScoreReason::OnTimeSettlement
        } else if days_delayed <= 3 {
            ScoreReason::SettlementWithin3d
        } else if days_delayed <= 7 {
            ScoreReason::DelayedGt3
        } else if days_delayed <= 15 {
            ScoreReason::DelayedGt7
        } else {
            ScoreReason::DelayedGt15
        }
    }

    /// Whether events with this reason are subject to duplicate
    /// suppression on (user, settlement, reason).
    ///
    /// Reminder penalties are exempt: every ignored reminder is a distinct
    /// event, even against the same settlement.
    pub fn dedups(self) -> bool {
        !matches!(self, ScoreReason::ReminderIgnored)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScoreReason::OnTimeSettlement => "on_time_settlement",
            ScoreReason::SettlementWithin3d => "settlement_within_3d",
            ScoreReason::ConsecutiveBonus => "consecutive_bonus",
            ScoreReason::DelayedGt3 => "delayed_gt3",
            ScoreReason::DelayedGt7 => "delayed_gt7",
            ScoreReason::DelayedGt15 => "delayed_gt15",
            ScoreReason::ReminderIgnored => "reminder_ignored",
        }
    }
}

pub const SCORE_MIN: i32 = 300;
pub const SCORE_MAX: i32 = 900;
pub const SCORE_DEFAULT: i32 = 500;

/// Per-user credit standing. Mutated only by the credit score engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditState {
    /// Clamped to [`SCORE_MIN`], [`SCORE_MAX`].
    pub score: i32,
    /// Unbroken streak of positive non-bonus events.
    pub consecutive_on_time: u32,
}

impl Default for CreditState {
    fn default() -> Self {
        CreditState {
            score: SCORE_DEFAULT,
            consecutive_on_time: 0,
        }
    }
}

/// Append-only audit entry for one credit score change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreditRecord {
    pub user: UserId,
    pub old_score: i32,
    pub new_score: i32,
    /// Post-clamp delta actually applied (may be 0 at the score bounds).
    pub change: i32,
    pub reason: ScoreReason,
    pub related_settlement: Option<SettlementId>,
    pub recorded_at: Timestamp,
}

/// A registered user as seen by the participant directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
}

/// Resolution state of a pending member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingStatus {
    #[default]
    Invited,
    Resolved,
    Removed,
}

/// An invited contact identified by phone number, not yet registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMember {
    pub id: PendingId,
    /// E.164 phone number, the reconciliation key.
    pub phone: String,
    pub display_name: String,
    pub groups: Vec<GroupId>,
    pub status: PendingStatus,
    pub resolved_to: Option<UserId>,
    pub resolved_at: Option<Timestamp>,
}

/// A group of participants sharing expenses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub members: Vec<UserId>,
    pub pending_members: Vec<PendingId>,
}

impl Group {
    pub fn has_member(&self, user: UserId) -> bool {
        self.members.contains(&user)
    }

    pub fn has_pending_member(&self, pending: PendingId) -> bool {
        self.pending_members.contains(&pending)
    }
}

/// What an activity feed entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    ExpenseAdded(ExpenseId),
    ExpenseDeleted(ExpenseId),
    SettlementRecorded(SettlementId),
}

/// Best-effort activity feed entry. Failing to persist one never aborts
/// the operation that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activity {
    pub actor: UserId,
    pub group: GroupId,
    pub kind: ActivityKind,
    pub at: Timestamp,
}
