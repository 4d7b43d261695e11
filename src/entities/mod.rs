pub mod campaign_goal;
pub mod donation;
pub mod player;
pub mod sms_log;
pub mod sponsor;
pub mod team;

pub use campaign_goal::Entity as CampaignGoal;
pub use donation::Entity as Donation;
pub use player::Entity as Player;
pub use sms_log::Entity as SmsLog;
pub use sponsor::Entity as Sponsor;
pub use team::Entity as Team;

pub use sponsor::{SponsorStatus, COUNTED_STATUSES};

use sea_orm::{ActiveValue, Value};
use serde::{Deserialize, Serialize};

/// Recognition level derived from a contribution in dollars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum Tier {
    Platinum,
    Gold,
    Silver,
    Bronze,
    Supporter,
}

impl Tier {
    pub fn from_cents(cents: i64) -> Self {
        let dollars = cents.max(0) / 100;
        match dollars {
            d if d >= 5000 => Tier::Platinum,
            d if d >= 2500 => Tier::Gold,
            d if d >= 1000 => Tier::Silver,
            d if d >= 500 => Tier::Bronze,
            _ => Tier::Supporter,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Platinum => "Platinum",
            Tier::Gold => "Gold",
            Tier::Silver => "Silver",
            Tier::Bronze => "Bronze",
            Tier::Supporter => "Supporter",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whole cents to dollars.
pub fn dollars(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Dollars to cents, rounded to the nearest cent and never negative.
pub fn cents_from_dollars(dollars: f64) -> i64 {
    if !dollars.is_finite() || dollars <= 0.0 {
        return 0;
    }
    (dollars * 100.0).round() as i64
}

/// Current value of an active field, whether freshly set or loaded.
pub(crate) fn value_of<V>(field: &ActiveValue<V>) -> Option<V>
where
    V: Into<Value> + Clone,
{
    match field {
        ActiveValue::Set(v) | ActiveValue::Unchanged(v) => Some(v.clone()),
        ActiveValue::NotSet => None,
    }
}

/// A tier column counts as empty when it is unset, null or blank.
pub(crate) fn tier_is_empty(field: &ActiveValue<Option<String>>) -> bool {
    match value_of(field) {
        Some(Some(tier)) => tier.trim().is_empty(),
        _ => true,
    }
}
