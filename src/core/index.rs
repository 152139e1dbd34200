//! Consumer-price index and housing-company price index store.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::BillingError;
use super::money::round_half_up;

/// Monthly point numbers of one year plus the officially published average.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexYear {
    #[serde(default)]
    pub months: BTreeMap<u32, Decimal>,
    #[serde(default)]
    pub published_average: Option<Decimal>,
}

/// Price indices used by index-adjusted rents and re-lease subventions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexStore {
    /// Cost-of-living index (1951:10 = 100) by year.
    #[serde(default)]
    pub consumer_price: BTreeMap<i32, IndexYear>,
    /// Housing-company share price index by region and year.
    #[serde(default)]
    pub housing_price: BTreeMap<String, BTreeMap<i32, Decimal>>,
}

impl IndexStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_monthly(
        &mut self,
        year: i32,
        month: u32,
        value: Decimal,
    ) -> Result<(), BillingError> {
        if !(1..=12).contains(&month) {
            return Err(BillingError::Validation(format!(
                "index month {month} is out of range"
            )));
        }
        self.consumer_price
            .entry(year)
            .or_default()
            .months
            .insert(month, value);
        Ok(())
    }

    pub fn set_yearly_average(&mut self, year: i32, value: Decimal) {
        self.consumer_price.entry(year).or_default().published_average = Some(value);
    }

    pub fn monthly(&self, year: i32, month: u32) -> Option<Decimal> {
        self.consumer_price.get(&year)?.months.get(&month).copied()
    }

    /// Published yearly average, or the mean of all twelve monthly numbers
    /// rounded half-up to one decimal. `None` while the year is incomplete.
    pub fn yearly_average(&self, year: i32) -> Option<Decimal> {
        let entry = self.consumer_price.get(&year)?;
        if let Some(avg) = entry.published_average {
            return Some(avg);
        }
        if entry.months.len() != 12 {
            return None;
        }
        let sum: Decimal = entry.months.values().copied().sum();
        Some(round_half_up(sum / Decimal::from(12), 1))
    }

    pub fn require_yearly_average(&self, year: i32) -> Result<Decimal, BillingError> {
        self.yearly_average(year)
            .ok_or_else(|| BillingError::not_found("consumer price index", year))
    }

    pub fn insert_housing(&mut self, region: impl Into<String>, year: i32, value: Decimal) {
        self.housing_price
            .entry(region.into())
            .or_default()
            .insert(year, value);
    }

    pub fn housing(&self, region: &str, year: i32) -> Option<Decimal> {
        self.housing_price.get(region)?.get(&year).copied()
    }

    pub fn require_housing(&self, region: &str, year: i32) -> Result<Decimal, BillingError> {
        self.housing(region, year).ok_or_else(|| {
            BillingError::not_found("housing price index", format!("{region}/{year}"))
        })
    }
}
