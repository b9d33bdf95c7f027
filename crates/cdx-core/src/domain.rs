use chrono::{DateTime, Duration, NaiveDateTime, Utc};

/// Hours between starting a farm and the claim window opening.
pub const FARM_MATURITY_HOURS: i64 = 4;

/// Wire format of `farmStartedAt` (ISO-8601, milliseconds, UTC).
const FARM_STARTED_AT_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

/// The per-account authentication state handed to every game API call.
///
/// `auth_data` is the short-lived web-app credential extracted from the
/// Telegram web view; `account_id` is the numeric Telegram user id sent
/// alongside it (`devAuthData` on the wire).
#[derive(Clone, Debug)]
pub struct Credential {
    pub account_id: i64,
    pub auth_data: String,
}

/// Immutable profile snapshot, fetched fresh on every iteration.
#[derive(Clone, Debug, PartialEq)]
pub struct ProfileSnapshot {
    pub available_taps: i64,
    /// Decimal on the wire, truncated to an integer. Zero means no farm is
    /// currently running.
    pub farm_reward: i64,
    pub balance: i64,
    pub farm_started_at: Option<DateTime<Utc>>,
}

/// Claim window derived from a profile snapshot. Never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FarmWindow {
    pub started_at: DateTime<Utc>,
    pub matures_at: DateTime<Utc>,
}

impl FarmWindow {
    pub fn after_start(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            matures_at: started_at + Duration::hours(FARM_MATURITY_HOURS),
        }
    }

    pub fn is_mature(&self, now: DateTime<Utc>) -> bool {
        now >= self.matures_at
    }

    /// Hours until maturity, rounded to 0.1 h. Negative once matured.
    pub fn hours_remaining(&self, now: DateTime<Utc>) -> f64 {
        let secs = (self.matures_at - now).num_seconds() as f64;
        (secs / 3600.0 * 10.0).round() / 10.0
    }
}

/// Parse the `farmStartedAt` wire timestamp into UTC.
pub fn parse_farm_started_at(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, FARM_STARTED_AT_FORMAT)
        .ok()
        .map(|naive| naive.and_utc())
}

/// The three phases every in-game task goes through, in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskPhase {
    Start,
    Check,
    Claim,
}

impl TaskPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPhase::Start => "start",
            TaskPhase::Check => "check",
            TaskPhase::Claim => "claim",
        }
    }
}

/// Per-task result of a batch run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Server answered `status: ok`.
    Accepted,
    /// Server answered with an unexpected status.
    Rejected,
    /// Transport or parse failure; aborts the rest of the batch.
    Failed(String),
}

/// Result of a farm claim attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// Server refused and supplied a reason.
    Refused(String),
    /// Response carried a status that is neither ok nor error.
    Unexpected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn farm_started_at_parses_wire_format() {
        let dt = parse_farm_started_at("2026-08-04T10:30:00.123Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2026-08-04T10:30:00.123+00:00");
    }

    #[test]
    fn farm_started_at_rejects_other_formats() {
        assert!(parse_farm_started_at("2026-08-04 10:30:00").is_none());
        assert!(parse_farm_started_at("not a date").is_none());
    }

    #[test]
    fn window_matures_four_hours_after_start() {
        let start = parse_farm_started_at("2026-08-04T10:00:00.000Z").unwrap();
        let window = FarmWindow::after_start(start);
        assert_eq!((window.matures_at - window.started_at).num_hours(), 4);
    }

    #[test]
    fn window_is_mature_exactly_at_boundary() {
        let start = parse_farm_started_at("2026-08-04T10:00:00.000Z").unwrap();
        let window = FarmWindow::after_start(start);
        assert!(!window.is_mature(window.matures_at - Duration::seconds(1)));
        assert!(window.is_mature(window.matures_at));
    }

    #[test]
    fn hours_remaining_rounds_to_tenths() {
        let start = parse_farm_started_at("2026-08-04T10:00:00.000Z").unwrap();
        let window = FarmWindow::after_start(start);
        let now = start + Duration::hours(1);
        assert_eq!(window.hours_remaining(now), 3.0);
        let now = start + Duration::minutes(75);
        assert_eq!(window.hours_remaining(now), 2.8);
    }
}
