//! Withdrawal and payout rules.
//!
//! When the assigned paralegal withdraws, the server pauses the case with
//! reason `paralegal_withdrew`. Payout decisions (partial payout or closing
//! without release) stay hidden for a 24 hour hold, and a withdrawal before
//! any task was done is finalised by the server with a $0 payout.

use chrono::{DateTime, Duration, Utc};

use crate::constants::{PAUSE_REASON_WITHDRAWAL, WITHDRAWAL_HOLD_HOURS};
use crate::error::PayoutError;
use crate::lifecycle::normalize_status;
use crate::models::Case;

pub const ZERO_PAYOUT_BANNER: &str =
    "Paralegal withdrew before any tasks were completed. A $0 payout was issued.";

/// Locked escrow total minus any partial payout already issued.
pub fn remaining_cents(case: &Case) -> i64 {
    let locked = case.locked_total_cents.unwrap_or(0);
    let paid = case.partial_payout_cents.unwrap_or(0);
    (locked - paid).max(0)
}

/// Accepts `0 <= amount <= remaining`.
pub fn validate_partial_payout(amount_cents: i64, remaining_cents: i64) -> Result<i64, PayoutError> {
    if amount_cents < 0 {
        return Err(PayoutError::Negative);
    }
    if amount_cents > remaining_cents {
        return Err(PayoutError::ExceedsRemaining {
            amount: amount_cents,
            remaining: remaining_cents,
        });
    }
    Ok(amount_cents)
}

pub fn format_cents(cents: i64, currency: &str) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let amount = if abs % 100 == 0 {
        format!("{}", abs / 100)
    } else {
        format!("{}.{:02}", abs / 100, abs % 100)
    };
    if currency.eq_ignore_ascii_case("usd") {
        format!("{sign}${amount}")
    } else {
        format!("{sign}{amount} {}", currency.to_ascii_uppercase())
    }
}

/// Derived view of a paralegal withdrawal on one case.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WithdrawalView {
    pub withdrawn: bool,
    pub zero_payout: bool,
    pub finalized: bool,
    pub hold_active: bool,
    pub hold_remaining: Option<Duration>,
    pub remaining_cents: i64,
    pub show_partial: bool,
    pub show_reject: bool,
    pub show_relist: bool,
    pub banner: Option<String>,
}

impl WithdrawalView {
    /// `is_attorney` gates the payout controls; the banner is shown to everyone.
    pub fn evaluate(case: &Case, is_attorney: bool, now: DateTime<Utc>) -> Self {
        let pause_reason = case
            .pause_reason
            .as_deref()
            .map(|r| r.trim().to_ascii_lowercase())
            .unwrap_or_default();
        let status = normalize_status(&case.status);

        let withdrawn = pause_reason == PAUSE_REASON_WITHDRAWAL || case.withdrawn_at.is_some();
        if !withdrawn {
            return Self {
                remaining_cents: remaining_cents(case),
                ..Self::default()
            };
        }

        let total_tasks = case.tasks.len();
        let done_at_withdrawal = case
            .completed_tasks_at_withdrawal
            .map(|n| n as usize)
            .unwrap_or_else(|| case.completed_task_count());

        let zero_payout = done_at_withdrawal == 0;
        let finalized = zero_payout || case.withdrawal_finalized_at.is_some();

        let hold_remaining = case
            .withdrawn_at
            .or(case.paused_at)
            .map(|at| at + Duration::hours(WITHDRAWAL_HOLD_HOURS) - now)
            .filter(|left| *left > Duration::zero());
        let hold_active = hold_remaining.is_some();

        let paused_for_withdrawal = status == "paused" && pause_reason == PAUSE_REASON_WITHDRAWAL;
        let decision_open = is_attorney && paused_for_withdrawal && !hold_active && !finalized;
        let locked_by_state = matches!(status.as_str(), "disputed" | "completed" | "closed");

        let remaining = remaining_cents(case);
        let banner = if zero_payout {
            ZERO_PAYOUT_BANNER.to_string()
        } else if finalized {
            match case.partial_payout_cents.filter(|c| *c > 0) {
                Some(paid) => format!(
                    "Withdrawal finalized. {} was released to the paralegal.",
                    format_cents(paid, case.currency())
                ),
                None => "Withdrawal finalized. The case was closed without releasing funds."
                    .to_string(),
            }
        } else if let Some(left) = hold_remaining {
            format!(
                "Paralegal withdrew after completing {done_at_withdrawal} of {total_tasks} tasks. \
                 Payout decisions unlock in {}h {}m.",
                left.num_hours(),
                left.num_minutes() % 60
            )
        } else {
            format!(
                "Paralegal withdrew after completing {done_at_withdrawal} of {total_tasks} tasks. \
                 Issue a partial payout of up to {} or close the case without release.",
                format_cents(remaining, case.currency())
            )
        };

        Self {
            withdrawn,
            zero_payout,
            finalized,
            hold_active,
            hold_remaining,
            remaining_cents: remaining,
            show_partial: decision_open,
            show_reject: decision_open,
            show_relist: is_attorney && finalized && case.relisted_at.is_none() && !locked_by_state,
            banner: Some(banner),
        }
    }
}
