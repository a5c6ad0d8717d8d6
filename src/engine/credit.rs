//! Credit scoring: bounded per-user score, streak bonuses, delay
//! penalties, and the append-only audit trail behind them.

use tracing::info;

use crate::model::{
    CreditRecord, CreditState, PenaltyTier, SCORE_MAX, SCORE_MIN, ScoreReason, SettlementId,
    Timestamp, UserId, days_between,
};
use crate::store::LedgerStore;

use super::LedgerEngine;
use super::error::{EngineError, NotFound};

/// Positive non-bonus events in a row that trigger one bonus.
pub const STREAK_TARGET: u32 = 5;

/// Tiers walked highest-first so one scan applies only the highest newly
/// crossed threshold.
const DELAY_TIERS: [PenaltyTier; 3] = [PenaltyTier::Day15, PenaltyTier::Day7, PenaltyTier::Day3];

/// Result of one scoring event, bonus pass included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditOutcome {
    pub old_score: i32,
    pub new_score: i32,
    /// Net change actually applied, bonus included, zero on duplicates.
    pub change: i32,
    pub reason: ScoreReason,
    /// The event was already recorded for this settlement; nothing changed.
    pub duplicate: bool,
    pub bonus_awarded: bool,
}

/// One penalty applied by the delay scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PenaltyResult {
    pub settlement: SettlementId,
    pub days_delayed: i64,
    pub outcome: CreditOutcome,
}

/// Human label for a score.
pub fn credit_tier(score: i32) -> &'static str {
    if score >= 800 {
        "excellent"
    } else if score >= 650 {
        "good"
    } else if score >= 500 {
        "risky"
    } else {
        "unreliable"
    }
}

impl<S: LedgerStore> LedgerEngine<S> {
    /// Apply one scoring event to a user.
    ///
    /// Duplicate events (same user, settlement, and reason as an existing
    /// audit record) succeed with `duplicate: true` and change nothing.
    /// When the on-time streak reaches [`STREAK_TARGET`] the counter
    /// resets and a single bonus pass runs; the bonus pass itself can
    /// never chain another bonus.
    pub fn apply_score_event(
        &mut self,
        user: UserId,
        reason: ScoreReason,
        related_settlement: Option<SettlementId>,
        now: Timestamp,
    ) -> Result<CreditOutcome, EngineError> {
        let mut outcome = self.score_once(user, reason, related_settlement, now)?;
        if outcome.duplicate {
            return Ok(outcome);
        }

        let state = self.store.credit_state(user);
        if state.consecutive_on_time >= STREAK_TARGET {
            self.store.set_credit_state(user, CreditState {
                consecutive_on_time: 0,
                ..state
            });
            let bonus =
                self.score_once(user, ScoreReason::ConsecutiveBonus, related_settlement, now)?;
            if !bonus.duplicate {
                outcome.new_score = bonus.new_score;
                outcome.change = bonus.new_score - outcome.old_score;
                outcome.bonus_awarded = true;
            }
        }

        Ok(outcome)
    }

    /// Score a completed settlement for its debtor. Exactly one reason is
    /// chosen from the delay, no stacking.
    pub fn score_settlement_completion(
        &mut self,
        user: UserId,
        days_delayed: i64,
        settlement: SettlementId,
        now: Timestamp,
    ) -> Result<CreditOutcome, EngineError> {
        self.apply_score_event(user, ScoreReason::from_delay(days_delayed), Some(settlement), now)
    }

    /// Penalize a reminder the debtor ignored.
    ///
    /// Reminder penalties repeat: each ignored reminder is its own audit
    /// record even against the same settlement.
    pub fn apply_reminder_ignored(
        &mut self,
        user: UserId,
        settlement: SettlementId,
        now: Timestamp,
    ) -> Result<CreditOutcome, EngineError> {
        let record = self
            .store
            .settlement_mut(settlement)
            .ok_or(NotFound::Settlement(settlement))?;
        record.reminder_count += 1;

        self.apply_score_event(user, ScoreReason::ReminderIgnored, Some(settlement), now)
    }

    /// Sweep the user's outstanding settlements and apply newly crossed
    /// delay penalties.
    ///
    /// At most one tier fires per settlement per scan (the highest newly
    /// crossed one), and `last_penalty_tier` moves up with it so later
    /// scans never re-penalize the same threshold.
    pub fn scan_pending_delays(
        &mut self,
        user: UserId,
        now: Timestamp,
    ) -> Result<Vec<PenaltyResult>, EngineError> {
        if self.store.user(user).is_none() {
            return Err(NotFound::User(user).into());
        }

        let mut results = Vec::new();

        for id in self.store.debtor_pending_settlements(user) {
            let (created_at, last_tier) = {
                let s = self.store.settlement(id).ok_or(NotFound::Settlement(id))?;
                (s.created_at, s.last_penalty_tier)
            };
            let days_delayed = days_between(created_at, now);

            for tier in DELAY_TIERS {
                let Some(reason) = tier.reason() else { continue };
                if days_delayed >= tier.min_days() && last_tier < tier {
                    let outcome = self.apply_score_event(user, reason, Some(id), now)?;

                    let record = self.store.settlement_mut(id).ok_or(NotFound::Settlement(id))?;
                    record.last_penalty_tier = tier;

                    info!(
                        user,
                        settlement = id,
                        days_delayed,
                        tier = tier.min_days(),
                        "delay penalty applied"
                    );
                    results.push(PenaltyResult {
                        settlement: id,
                        days_delayed,
                        outcome,
                    });
                    break;
                }
            }
        }

        Ok(results)
    }

    /// A page of the user's credit history, most recent first, with the
    /// total record count.
    pub fn credit_history(
        &self,
        user: UserId,
        limit: usize,
        skip: usize,
    ) -> Result<(Vec<CreditRecord>, usize), EngineError> {
        if self.store.user(user).is_none() {
            return Err(NotFound::User(user).into());
        }
        let (page, total) = self.store.credit_history(user, limit, skip);
        Ok((page.into_iter().cloned().collect(), total))
    }

    /// Current score and tier label for a user.
    pub fn credit_standing(&self, user: UserId) -> Result<(i32, &'static str), EngineError> {
        if self.store.user(user).is_none() {
            return Err(NotFound::User(user).into());
        }
        let score = self.store.credit_state(user).score;
        Ok((score, credit_tier(score)))
    }

    fn score_once(
        &mut self,
        user: UserId,
        reason: ScoreReason,
        related_settlement: Option<SettlementId>,
        now: Timestamp,
    ) -> Result<CreditOutcome, EngineError> {
        if self.store.user(user).is_none() {
            return Err(NotFound::User(user).into());
        }

        let state = self.store.credit_state(user);
        let old_score = state.score;
        let new_score = (old_score + reason.delta()).clamp(SCORE_MIN, SCORE_MAX);
        let change = new_score - old_score;

        // Check-and-append is one store call, so two racing events cannot
        // both pass the duplicate check. The record keeps the post-clamp
        // delta, zero or not.
        let appended = self.store.append_credit_checked(CreditRecord {
            user,
            old_score,
            new_score,
            change,
            reason,
            related_settlement,
            recorded_at: now,
        });
        if !appended {
            return Ok(CreditOutcome {
                old_score,
                new_score: old_score,
                change: 0,
                reason,
                duplicate: true,
                bonus_awarded: false,
            });
        }

        let mut next = CreditState {
            score: new_score,
            ..state
        };
        if reason.delta() > 0 && reason != ScoreReason::ConsecutiveBonus {
            next.consecutive_on_time += 1;
        } else if reason.delta() < 0 {
            // Any penalty breaks the streak. A bonus leaves it alone: the
            // counter was already reset when the bonus fired.
            next.consecutive_on_time = 0;
        }
        self.store.set_credit_state(user, next);

        info!(
            user,
            reason = reason.as_str(),
            old_score,
            new_score,
            "credit score updated"
        );

        Ok(CreditOutcome {
            old_score,
            new_score,
            change,
            reason,
            duplicate: false,
            bonus_awarded: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Amount;
    use crate::model::{SECS_PER_DAY, SettlementStatus};
    use crate::store::{CreditStore, MemStore, SettlementStore};

    fn engine_with_user() -> LedgerEngine<MemStore> {
        let mut store = MemStore::new();
        store.add_user(1, "Asha");
        store.add_user(2, "Bela");
        LedgerEngine::new(store)
    }

    fn pending_settlement(engine: &mut LedgerEngine<MemStore>, created_at: Timestamp) -> SettlementId {
        engine.store_mut().insert_settlement(crate::model::Settlement {
            id: 0,
            group: 1,
            from: 1,
            to: 2,
            amount: Amount::from_scaled(10_000),
            status: SettlementStatus::Pending,
            last_penalty_tier: PenaltyTier::None,
            credit_score_processed: false,
            reminder_count: 0,
            created_at,
            completed_at: None,
        })
    }

    #[test]
    fn positive_event_raises_score_and_streak() {
        let mut engine = engine_with_user();
        let outcome = engine
            .apply_score_event(1, ScoreReason::OnTimeSettlement, Some(11), 0)
            .unwrap();

        assert_eq!(outcome.old_score, 500);
        assert_eq!(outcome.new_score, 510);
        assert_eq!(outcome.change, 10);
        assert!(!outcome.duplicate);
        assert!(!outcome.bonus_awarded);

        let state = engine.store().credit_state(1);
        assert_eq!(state.score, 510);
        assert_eq!(state.consecutive_on_time, 1);
    }

    #[test]
    fn negative_event_resets_streak() {
        let mut engine = engine_with_user();
        engine
            .apply_score_event(1, ScoreReason::OnTimeSettlement, Some(11), 0)
            .unwrap();
        engine
            .apply_score_event(1, ScoreReason::DelayedGt3, Some(12), 0)
            .unwrap();

        let state = engine.store().credit_state(1);
        assert_eq!(state.score, 495);
        assert_eq!(state.consecutive_on_time, 0);
    }

    #[test]
    fn score_never_leaves_bounds() {
        let mut engine = engine_with_user();
        for settlement in 0..30 {
            engine
                .apply_score_event(1, ScoreReason::DelayedGt15, Some(settlement), 0)
                .unwrap();
        }
        assert_eq!(engine.store().credit_state(1).score, SCORE_MIN);

        for settlement in 100..200 {
            engine
                .apply_score_event(1, ScoreReason::OnTimeSettlement, Some(settlement), 0)
                .unwrap();
        }
        assert_eq!(engine.store().credit_state(1).score, SCORE_MAX);
    }

    #[test]
    fn clamped_event_still_writes_audit_record() {
        let mut engine = engine_with_user();
        engine.store_mut().set_credit_state(1, CreditState {
            score: SCORE_MAX,
            consecutive_on_time: 0,
        });

        let outcome = engine
            .apply_score_event(1, ScoreReason::OnTimeSettlement, Some(11), 0)
            .unwrap();
        assert_eq!(outcome.change, 0);
        assert!(!outcome.duplicate);

        let (page, total) = engine.store().credit_history(1, 10, 0);
        assert_eq!(total, 1);
        assert_eq!(page[0].change, 0);
        assert_eq!(page[0].new_score, SCORE_MAX);
    }

    #[test]
    fn duplicate_event_changes_nothing() {
        let mut engine = engine_with_user();
        let first = engine
            .apply_score_event(1, ScoreReason::OnTimeSettlement, Some(11), 0)
            .unwrap();
        let second = engine
            .apply_score_event(1, ScoreReason::OnTimeSettlement, Some(11), 0)
            .unwrap();

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(second.change, 0);
        assert_eq!(second.new_score, first.new_score);

        let state = engine.store().credit_state(1);
        assert_eq!(state.score, 510);
        assert_eq!(state.consecutive_on_time, 1);
        assert_eq!(engine.store().credit_log().len(), 1);
    }

    #[test]
    fn fifth_positive_event_awards_bonus_and_resets_streak() {
        let mut engine = engine_with_user();
        for settlement in 1..=4 {
            engine
                .apply_score_event(1, ScoreReason::OnTimeSettlement, Some(settlement), 0)
                .unwrap();
        }
        assert_eq!(engine.store().credit_state(1).consecutive_on_time, 4);

        let fifth = engine
            .apply_score_event(1, ScoreReason::OnTimeSettlement, Some(5), 0)
            .unwrap();
        assert!(fifth.bonus_awarded);
        assert_eq!(fifth.reason, ScoreReason::OnTimeSettlement);
        // 500 + 5*10 + 20
        assert_eq!(fifth.new_score, 570);
        assert_eq!(fifth.change, 30);

        let state = engine.store().credit_state(1);
        assert_eq!(state.score, 570);
        assert_eq!(state.consecutive_on_time, 0);

        // One bonus audit record, tagged with the triggering settlement
        let bonus_records: Vec<_> = engine
            .store()
            .credit_log()
            .iter()
            .filter(|r| r.reason == ScoreReason::ConsecutiveBonus)
            .collect();
        assert_eq!(bonus_records.len(), 1);
        assert_eq!(bonus_records[0].related_settlement, Some(5));
    }

    #[test]
    fn sixth_positive_event_starts_fresh_streak() {
        let mut engine = engine_with_user();
        for settlement in 1..=5 {
            engine
                .apply_score_event(1, ScoreReason::OnTimeSettlement, Some(settlement), 0)
                .unwrap();
        }
        engine
            .apply_score_event(1, ScoreReason::OnTimeSettlement, Some(6), 0)
            .unwrap();

        assert_eq!(engine.store().credit_state(1).consecutive_on_time, 1);
    }

    #[test]
    fn reminder_ignored_repeats_and_counts_reminders() {
        let mut engine = engine_with_user();
        let settlement = pending_settlement(&mut engine, 0);

        let first = engine.apply_reminder_ignored(1, settlement, 0).unwrap();
        let second = engine.apply_reminder_ignored(1, settlement, 0).unwrap();

        assert!(!first.duplicate);
        assert!(!second.duplicate);
        assert_eq!(second.new_score, 480);
        assert_eq!(engine.store().settlement(settlement).unwrap().reminder_count, 2);
        assert_eq!(engine.store().credit_log().len(), 2);
    }

    #[test]
    fn reminder_ignored_unknown_settlement_fails() {
        let mut engine = engine_with_user();
        let result = engine.apply_reminder_ignored(1, 99, 0);
        assert!(matches!(
            result,
            Err(EngineError::NotFound(NotFound::Settlement(99)))
        ));
    }

    #[test]
    fn scan_applies_highest_newly_crossed_tier_only() {
        let mut engine = engine_with_user();
        let settlement = pending_settlement(&mut engine, 0);

        // 10 days out: the 7-day tier fires, not 3 and 7 both
        let results = engine.scan_pending_delays(1, 10 * SECS_PER_DAY).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].days_delayed, 10);
        assert_eq!(results[0].outcome.reason, ScoreReason::DelayedGt7);
        assert_eq!(results[0].outcome.change, -25);
        assert_eq!(
            engine.store().settlement(settlement).unwrap().last_penalty_tier,
            PenaltyTier::Day7
        );

        // 20 days out: only the 15-day tier is new
        let results = engine.scan_pending_delays(1, 20 * SECS_PER_DAY).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].outcome.reason, ScoreReason::DelayedGt15);
        assert_eq!(
            engine.store().settlement(settlement).unwrap().last_penalty_tier,
            PenaltyTier::Day15
        );

        // 25 days out: every tier already applied
        let results = engine.scan_pending_delays(1, 25 * SECS_PER_DAY).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn scan_is_idempotent_within_a_tier() {
        let mut engine = engine_with_user();
        let settlement = pending_settlement(&mut engine, 0);

        let first = engine.scan_pending_delays(1, 4 * SECS_PER_DAY).unwrap();
        let second = engine.scan_pending_delays(1, 5 * SECS_PER_DAY).unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].outcome.reason, ScoreReason::DelayedGt3);
        assert!(second.is_empty());
        assert_eq!(
            engine.store().settlement(settlement).unwrap().last_penalty_tier,
            PenaltyTier::Day3
        );
    }

    #[test]
    fn scan_ignores_settlements_below_first_tier() {
        let mut engine = engine_with_user();
        pending_settlement(&mut engine, 0);

        let results = engine.scan_pending_delays(1, 2 * SECS_PER_DAY).unwrap();
        assert!(results.is_empty());
        assert_eq!(engine.store().credit_state(1).score, 500);
    }

    #[test]
    fn scan_covers_each_outstanding_settlement_independently() {
        let mut engine = engine_with_user();
        let old = pending_settlement(&mut engine, 0);
        let recent = pending_settlement(&mut engine, 15 * SECS_PER_DAY);

        let results = engine.scan_pending_delays(1, 19 * SECS_PER_DAY).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].settlement, old);
        assert_eq!(results[0].outcome.reason, ScoreReason::DelayedGt15);
        assert_eq!(results[1].settlement, recent);
        assert_eq!(results[1].outcome.reason, ScoreReason::DelayedGt3);
    }

    #[test]
    fn delay_from_scoring_and_scanner_share_the_duplicate_guard() {
        let mut engine = engine_with_user();
        let settlement = pending_settlement(&mut engine, 0);

        // Scanner penalizes the 3-day tier first
        engine.scan_pending_delays(1, 5 * SECS_PER_DAY).unwrap();
        // Completion five days late maps to the same reason and is absorbed
        let outcome = engine
            .score_settlement_completion(1, 5, settlement, 5 * SECS_PER_DAY)
            .unwrap();

        assert!(outcome.duplicate);
        assert_eq!(engine.store().credit_log().len(), 1);
    }

    #[test]
    fn completion_delay_maps_through_reason_table() {
        let mut engine = engine_with_user();
        let outcome = engine.score_settlement_completion(1, 0, 11, 0).unwrap();
        assert_eq!(outcome.reason, ScoreReason::OnTimeSettlement);

        let outcome = engine.score_settlement_completion(1, 3, 12, 0).unwrap();
        assert_eq!(outcome.reason, ScoreReason::SettlementWithin3d);

        let outcome = engine.score_settlement_completion(1, 20, 13, 0).unwrap();
        assert_eq!(outcome.reason, ScoreReason::DelayedGt15);
    }

    #[test]
    fn unknown_user_is_rejected() {
        let mut engine = engine_with_user();
        let result = engine.apply_score_event(99, ScoreReason::OnTimeSettlement, None, 0);
        assert!(matches!(
            result,
            Err(EngineError::NotFound(NotFound::User(99)))
        ));
    }

    #[test]
    fn history_pages_and_counts() {
        let mut engine = engine_with_user();
        for settlement in 1..=7 {
            engine
                .apply_score_event(1, ScoreReason::OnTimeSettlement, Some(settlement), settlement as i64)
                .unwrap();
        }

        // 7 events plus the bonus at the fifth
        let (page, total) = engine.credit_history(1, 3, 0).unwrap();
        assert_eq!(total, 8);
        assert_eq!(page.len(), 3);
        assert_eq!(page[0].related_settlement, Some(7));
    }

    #[test]
    fn tier_labels() {
        assert_eq!(credit_tier(850), "excellent");
        assert_eq!(credit_tier(800), "excellent");
        assert_eq!(credit_tier(700), "good");
        assert_eq!(credit_tier(520), "risky");
        assert_eq!(credit_tier(499), "unreliable");
        assert_eq!(credit_tier(300), "unreliable");
    }

    #[test]
    fn standing_reports_score_and_tier() {
        let mut engine = engine_with_user();
        engine
            .apply_score_event(1, ScoreReason::DelayedGt15, Some(1), 0)
            .unwrap();
        assert_eq!(engine.credit_standing(1).unwrap(), (460, "unreliable"));
    }
}
