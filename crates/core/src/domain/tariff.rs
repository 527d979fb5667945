use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// One retrieved tariff rate, optionally paired with the rate it replaced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TariffRecord {
    pub country: String,
    pub product_category: String,
    pub rate: Decimal,
    pub effective_date: NaiveDate,
    pub prior_rate: Option<Decimal>,
    pub prior_date: Option<NaiveDate>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increased,
    Decreased,
    Unchanged,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Increased => "increased",
            Self::Decreased => "decreased",
            Self::Unchanged => "unchanged",
        }
    }
}

impl TariffRecord {
    pub fn percentage(&self) -> Decimal {
        to_percentage(self.rate)
    }

    pub fn prior_percentage(&self) -> Option<Decimal> {
        self.prior_rate.map(to_percentage)
    }

    /// Absolute change against the prior rate, as a fraction.
    pub fn rate_change(&self) -> Option<Decimal> {
        self.prior_rate.map(|prior| self.rate - prior)
    }

    /// Change in percentage points (`12.5% - 10%` is `2.5`).
    pub fn change_points(&self) -> Option<Decimal> {
        self.rate_change().map(to_percentage)
    }

    /// Relative change in percent; undefined when the prior rate is zero.
    pub fn relative_change_pct(&self) -> Option<Decimal> {
        let prior = self.prior_rate?;
        if prior.is_zero() {
            return None;
        }
        Some(
            ((self.rate - prior) / prior * Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
                .normalize(),
        )
    }

    pub fn trend(&self) -> Option<Trend> {
        let prior = self.prior_rate?;
        Some(match self.rate.cmp(&prior) {
            std::cmp::Ordering::Greater => Trend::Increased,
            std::cmp::Ordering::Less => Trend::Decreased,
            std::cmp::Ordering::Equal => Trend::Unchanged,
        })
    }
}

fn to_percentage(rate: Decimal) -> Decimal {
    (rate * Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

/// Renders a fractional rate as a percent label, e.g. `0.125` -> `12.5%`.
pub fn percent_label(rate: Decimal) -> String {
    format!("{}%", to_percentage(rate))
}
