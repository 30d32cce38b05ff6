//! Expiration status derived from a certificate's remaining days.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter};

/// Expiration status of a certificate relative to an alert threshold.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationStatus {
    #[strum(serialize = "ok")]
    Ok,
    #[strum(serialize = "expiring soon")]
    ExpiringSoon,
    #[strum(serialize = "expired")]
    Expired,
}

impl ExpirationStatus {
    /// Classifies a remaining-days count against `threshold_days`.
    ///
    /// A negative count is always `Expired`. A zero or negative threshold
    /// never produces `ExpiringSoon`.
    pub fn classify(days_until_expiration: i64, threshold_days: i64) -> Self {
        if days_until_expiration < 0 {
            ExpirationStatus::Expired
        } else if days_until_expiration < threshold_days {
            ExpirationStatus::ExpiringSoon
        } else {
            ExpirationStatus::Ok
        }
    }

    /// Numeric code used for gauges: 0 ok, 1 expiring soon, 2 expired.
    pub fn code(self) -> u8 {
        match self {
            ExpirationStatus::Ok => 0,
            ExpirationStatus::ExpiringSoon => 1,
            ExpirationStatus::Expired => 2,
        }
    }
}
