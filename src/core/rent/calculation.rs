//! Payable amount of a rent over a date range.
//!
//! The range is cut into rent-cycle years. Within a cycle year every source
//! of rent (fixed initial year rents, contract rents, the manual amount) is
//! expressed as a yearly amount and prorated over the covered part, then the
//! rent adjustments are applied per intended use in start-date order.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use chrono::Datelike;
use rust_decimal::Decimal;

use super::explanation::{Explanation, ExplanationItem, Subject};
use super::model::{
    AdjustmentAmountType, AdjustmentType, ContractRent, EqualizedRent, IndexAdjustedRent,
    IndexType, PayableRent, Rent, RentAdjustment, RentType, Subvention,
};
use crate::core::date_range::{
    DateRange, Span, fix_amount_for_overlap, subtract_range_from_range, subtract_ranges_from_ranges,
};
use crate::core::entities::{IntendedUseId, RentAdjustmentId};
use crate::core::error::BillingError;
use crate::core::index::IndexStore;
use crate::core::money::{floor_to_step, round_cents, round_half_up};

pub const DEFAULT_HOUSING_REGION: &str = "helsinki";

/// Read-only inputs of a rent calculation.
#[derive(Debug, Clone, Copy)]
pub struct RentContext<'a> {
    pub index: &'a IndexStore,
    /// Region of the housing-company price index used for re-lease subventions.
    pub housing_region: &'a str,
}

impl<'a> RentContext<'a> {
    pub fn new(index: &'a IndexStore) -> Self {
        Self {
            index,
            housing_region: DEFAULT_HOUSING_REGION,
        }
    }
}

/// Amounts consumed from `AmountTotal` adjustments during a calculation.
///
/// The usage is carried across consecutive periods and written back into
/// `amount_left` once the resulting invoices are persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdjustmentUsage {
    used: BTreeMap<RentAdjustmentId, Decimal>,
}

impl AdjustmentUsage {
    pub fn used(&self, adjustment: RentAdjustmentId) -> Decimal {
        self.used.get(&adjustment).copied().unwrap_or_default()
    }

    pub fn add(&mut self, adjustment: RentAdjustmentId, amount: Decimal) {
        *self.used.entry(adjustment).or_default() += amount;
    }

    pub fn merge(&mut self, other: &AdjustmentUsage) {
        for (id, amount) in &other.used {
            self.add(*id, *amount);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (RentAdjustmentId, Decimal)> + '_ {
        self.used.iter().map(|(id, amount)| (*id, *amount))
    }

    pub fn is_empty(&self) -> bool {
        self.used.values().all(|v| v.is_zero())
    }
}

/// Result of [`amount_for_period`]: unrounded amounts per intended use.
#[derive(Debug, Clone, PartialEq)]
pub struct RentAmount {
    pub amount: Decimal,
    pub buckets: BTreeMap<Option<IntendedUseId>, Decimal>,
    pub explanation: Explanation,
}

impl RentAmount {
    fn zero(rent: &Rent) -> Self {
        let mut explanation = Explanation::default();
        explanation.push(ExplanationItem::new(rent_subject(rent), Vec::new(), Decimal::ZERO));
        Self {
            amount: Decimal::ZERO,
            buckets: BTreeMap::new(),
            explanation,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Options {
    equalize: bool,
}

/// Payable amount of `rent` over `range` within a lease active over `lease_span`.
pub fn amount_for_period(
    rent: &Rent,
    lease_span: &Span,
    range: &DateRange,
    ctx: &RentContext<'_>,
    usage: &mut AdjustmentUsage,
) -> Result<RentAmount, BillingError> {
    calculate(rent, lease_span, range, ctx, usage, Options { equalize: true })
}

fn calculate(
    rent: &Rent,
    lease_span: &Span,
    range: &DateRange,
    ctx: &RentContext<'_>,
    usage: &mut AdjustmentUsage,
    opts: Options,
) -> Result<RentAmount, BillingError> {
    let Some(range) = rent
        .active_span(lease_span)
        .and_then(|active| active.clamp(range))
    else {
        return Ok(RentAmount::zero(rent));
    };

    let mut buckets: BTreeMap<Option<IntendedUseId>, Decimal> = BTreeMap::new();
    let mut root = ExplanationItem::new(rent_subject(rent), vec![range], Decimal::ZERO);

    match rent.rent_type {
        RentType::Free => {}
        RentType::OneTime => {
            let amount = rent.amount.unwrap_or_default();
            *buckets.entry(None).or_default() += amount;
            root.amount = amount;
        }
        RentType::Index | RentType::Index2022 | RentType::Fixed | RentType::Manual => {
            let first = rent.cycle.cycle_year_of(range.start);
            let last = rent.cycle.cycle_year_of(range.end);
            for year in first..=last {
                let cycle_range = rent.cycle.range(year)?;
                let Some(chunk) = cycle_range.overlap(&range) else {
                    continue;
                };
                let chunk_buckets = cycle_year_amounts(
                    rent,
                    year,
                    &cycle_range,
                    &chunk,
                    ctx,
                    usage,
                    opts,
                    &mut root,
                )?;
                for (bucket, amount) in chunk_buckets {
                    *buckets.entry(bucket).or_default() += amount;
                }
            }
        }
    }

    let amount: Decimal = buckets.values().copied().sum();
    root.amount = amount;
    let mut explanation = Explanation::default();
    explanation.push(root);
    Ok(RentAmount {
        amount,
        buckets,
        explanation,
    })
}

fn rent_subject(rent: &Rent) -> Subject {
    Subject::Rent {
        id: rent.id,
        rent_type: rent.rent_type,
    }
}

/// Yearly amount prorated over `part` of `cycle_range`.
fn prorate_yearly(yearly: Decimal, part: &DateRange, cycle_range: &DateRange) -> Decimal {
    if part == cycle_range {
        return yearly;
    }
    fix_amount_for_overlap(yearly, part, &subtract_range_from_range(cycle_range, part))
}

#[allow(clippy::too_many_arguments)]
fn cycle_year_amounts(
    rent: &Rent,
    year: i32,
    cycle_range: &DateRange,
    chunk: &DateRange,
    ctx: &RentContext<'_>,
    usage: &mut AdjustmentUsage,
    opts: Options,
    root: &mut ExplanationItem,
) -> Result<BTreeMap<Option<IntendedUseId>, Decimal>, BillingError> {
    let mut buckets: BTreeMap<Option<IntendedUseId>, Decimal> = BTreeMap::new();

    let fixed: Vec<_> = rent
        .fixed_initial_year_rents
        .iter()
        .filter_map(|f| f.span().clamp(chunk).map(|covered| (f, covered)))
        .collect();
    for (fiyr, covered) in &fixed {
        let amount = prorate_yearly(fiyr.amount, covered, cycle_range);
        *buckets.entry(fiyr.intended_use).or_default() += amount;
        root.sub_items.push(ExplanationItem::new(
            Subject::FixedInitialYearRent {
                id: fiyr.id,
                intended_use: fiyr.intended_use,
                yearly_amount: fiyr.amount,
            },
            vec![*covered],
            amount,
        ));
    }

    for contract_rent in &rent.contract_rents {
        let Some(active) = contract_rent.span().clamp(chunk) else {
            continue;
        };
        let overridden: Vec<DateRange> = fixed
            .iter()
            .filter(|(f, _)| f.applies_to(contract_rent.intended_use))
            .map(|(_, covered)| *covered)
            .collect();
        let parts = subtract_ranges_from_ranges(&[active], &overridden);
        if parts.is_empty() {
            continue;
        }

        let (yearly, index_item) = yearly_contract_amount(rent, contract_rent, year, ctx, opts)?;
        let amount: Decimal = parts
            .iter()
            .map(|part| prorate_yearly(yearly, part, cycle_range))
            .sum();
        *buckets.entry(contract_rent.intended_use).or_default() += amount;

        let mut item = ExplanationItem::new(
            Subject::ContractRent {
                id: contract_rent.id,
                intended_use: contract_rent.intended_use,
                yearly_amount: yearly,
            },
            parts,
            amount,
        );
        if let Some(index_item) = index_item {
            item = item.with_sub_item(index_item);
        }
        root.sub_items.push(item);
    }

    if rent.rent_type == RentType::Manual && rent.contract_rents.is_empty() {
        if let Some(yearly) = rent.amount {
            *buckets.entry(None).or_default() += prorate_yearly(yearly, chunk, cycle_range);
        }
    }

    apply_adjustments(rent, year, cycle_range, chunk, ctx, usage, &mut buckets, root)?;
    Ok(buckets)
}

/// Index-adjusted yearly amount of a contract rent for the cycle year
/// starting in `year`.
fn yearly_contract_amount(
    rent: &Rent,
    contract_rent: &ContractRent,
    year: i32,
    ctx: &RentContext<'_>,
    opts: Options,
) -> Result<(Decimal, Option<ExplanationItem>), BillingError> {
    let base = match rent.rent_type {
        RentType::Index => contract_rent.yearly_base_amount(),
        RentType::Index2022 => contract_rent
            .base_year_rent
            .unwrap_or_else(|| contract_rent.yearly_base_amount()),
        _ => return Ok((contract_rent.yearly_amount(), None)),
    };

    let ratio = match rent.equalization_span() {
        Some(window) if opts.equalize && rent.cycle.range(year)?.overlap(&window).is_some() => {
            equalized_ratio(rent, contract_rent, &window, ctx)?
        }
        _ => index_ratio(rent, contract_rent, year, ctx)?,
    };
    let number = ctx.index.require_yearly_average(year - 1)?;
    let amount = base * ratio;
    let item = ExplanationItem::new(
        Subject::Index {
            year: year - 1,
            number,
            ratio,
        },
        Vec::new(),
        amount,
    );
    Ok((amount, Some(item)))
}

/// Index ratio for the cycle year starting in `year`; the index of the
/// preceding calendar year applies.
pub fn index_ratio(
    rent: &Rent,
    contract_rent: &ContractRent,
    year: i32,
    ctx: &RentContext<'_>,
) -> Result<Decimal, BillingError> {
    match rent.rent_type {
        RentType::Index => {
            let elementary = rent.elementary_index.ok_or_else(|| {
                BillingError::Validation(format!("rent {} has no elementary index", rent.id))
            })?;
            if elementary.is_zero() {
                return Err(BillingError::Arithmetic(format!(
                    "rent {} has a zero elementary index",
                    rent.id
                )));
            }
            let mut number = ctx.index.require_yearly_average(year - 1)?;
            if let Some(step) = rent.index_rounding {
                number = floor_to_step(number, step);
            }
            let mut ratio = number / elementary;
            if rent.index_type == IndexType::Threshold {
                let rise = (ratio - Decimal::ONE) * Decimal::ONE_HUNDRED;
                if rent.x_value.is_some_and(|x| rise < x) {
                    ratio = Decimal::ONE;
                } else if let Some(cap) = rent.y_value.filter(|y| rise > *y) {
                    ratio = Decimal::ONE + cap / Decimal::ONE_HUNDRED;
                }
            }
            Ok(ratio)
        }
        RentType::Index2022 => {
            let base_year = contract_rent.index.ok_or_else(|| {
                BillingError::Validation(format!(
                    "contract rent {} has no base index year",
                    contract_rent.id
                ))
            })?;
            let base = ctx.index.require_yearly_average(base_year)?;
            if base.is_zero() {
                return Err(BillingError::Arithmetic(format!(
                    "index of base year {base_year} is zero"
                )));
            }
            let number = ctx.index.require_yearly_average(year - 1)?;
            Ok(round_half_up(number / base, 4))
        }
        _ => Ok(Decimal::ONE),
    }
}

/// Mean of the index ratios of all cycle years touching the equalization window.
fn equalized_ratio(
    rent: &Rent,
    contract_rent: &ContractRent,
    window: &DateRange,
    ctx: &RentContext<'_>,
) -> Result<Decimal, BillingError> {
    let first = rent.cycle.cycle_year_of(window.start);
    let last = rent.cycle.cycle_year_of(window.end);
    let mut sum = Decimal::ZERO;
    let mut count = 0u32;
    for year in first..=last {
        sum += index_ratio(rent, contract_rent, year, ctx)?;
        count += 1;
    }
    if count == 0 {
        return Ok(Decimal::ONE);
    }
    Ok(sum / Decimal::from(count))
}

#[allow(clippy::too_many_arguments)]
fn apply_adjustments(
    rent: &Rent,
    year: i32,
    cycle_range: &DateRange,
    chunk: &DateRange,
    ctx: &RentContext<'_>,
    usage: &mut AdjustmentUsage,
    buckets: &mut BTreeMap<Option<IntendedUseId>, Decimal>,
    root: &mut ExplanationItem,
) -> Result<(), BillingError> {
    let mut adjustments: Vec<&RentAdjustment> = rent.rent_adjustments.iter().collect();
    adjustments.sort_by_key(|a| (a.start_date, a.id));

    for adjustment in adjustments {
        let Some(overlap) = adjustment.span().clamp(chunk) else {
            continue;
        };
        for (bucket, value) in buckets.iter_mut() {
            if !adjustment.applies_to(*bucket) {
                continue;
            }
            let (delta, shown_value) = match adjustment.amount_type {
                AdjustmentAmountType::PercentPerYear => {
                    let percent = adjustment_percent(rent, adjustment, year, ctx)?;
                    let portion = if overlap == *chunk {
                        *value
                    } else {
                        fix_amount_for_overlap(
                            *value,
                            &overlap,
                            &subtract_range_from_range(chunk, &overlap),
                        )
                    };
                    (portion * percent / Decimal::ONE_HUNDRED, percent)
                }
                AdjustmentAmountType::AmountPerYear => {
                    let yearly = adjustment.full_amount.unwrap_or_default();
                    (prorate_yearly(yearly, &overlap, cycle_range), yearly)
                }
                AdjustmentAmountType::AmountTotal => {
                    let total = adjustment
                        .amount_left
                        .or(adjustment.full_amount)
                        .unwrap_or_default();
                    let left = (total - usage.used(adjustment.id)).max(Decimal::ZERO);
                    let take = match adjustment.adjustment_type {
                        AdjustmentType::Discount => left.min(*value),
                        AdjustmentType::Increase => left,
                    };
                    usage.add(adjustment.id, take);
                    (take, total)
                }
            };
            let before = *value;
            *value = (*value + adjustment.sign() * delta).max(Decimal::ZERO);
            root.sub_items.push(ExplanationItem::new(
                Subject::RentAdjustment {
                    id: adjustment.id,
                    adjustment_type: adjustment.adjustment_type,
                    amount_type: adjustment.amount_type,
                    value: shown_value,
                },
                vec![overlap],
                *value - before,
            ));
        }
    }
    Ok(())
}

/// Percent of a percent-per-year adjustment. Subventions apply to
/// INDEX2022 rents only.
pub fn adjustment_percent(
    rent: &Rent,
    adjustment: &RentAdjustment,
    year: i32,
    ctx: &RentContext<'_>,
) -> Result<Decimal, BillingError> {
    if rent.rent_type != RentType::Index2022 {
        return Ok(adjustment.full_amount.unwrap_or_default());
    }
    let base = match &adjustment.subvention {
        Some(Subvention::FormOfManagement {
            management_subventions,
        }) => management_subventions
            .iter()
            .map(|m| m.subvention_percent)
            .sum(),
        Some(Subvention::ReLease {
            base_percent,
            graduated_percent,
        }) => {
            let rise = housing_index_rise(ctx, adjustment.start_date.year(), year - 1)?;
            *base_percent + (*graduated_percent - rise).max(Decimal::ZERO)
        }
        None => adjustment.full_amount.unwrap_or_default(),
    };
    let temporary: Decimal = adjustment
        .temporary_subventions
        .iter()
        .map(|t| t.subvention_percent)
        .sum();
    Ok(base + temporary)
}

/// Rise of the housing-company price index from `from_year` to `to_year`, percent.
fn housing_index_rise(
    ctx: &RentContext<'_>,
    from_year: i32,
    to_year: i32,
) -> Result<Decimal, BillingError> {
    if to_year <= from_year {
        return Ok(Decimal::ZERO);
    }
    let from = ctx.index.require_housing(ctx.housing_region, from_year)?;
    let to = ctx.index.require_housing(ctx.housing_region, to_year)?;
    if from.is_zero() {
        return Err(BillingError::Arithmetic(format!(
            "housing price index of {from_year} is zero"
        )));
    }
    Ok((to / from - Decimal::ONE) * Decimal::ONE_HUNDRED)
}

/// Recompute the cached index-adjusted, payable and equalized amounts of
/// `rent` for the cycle years starting in `years`.
pub fn recalculate_cached_amounts(
    rent: &mut Rent,
    lease_span: &Span,
    years: RangeInclusive<i32>,
    ctx: &RentContext<'_>,
) -> Result<(), BillingError> {
    let mut index_adjusted = Vec::new();
    let mut payable: Vec<PayableRent> = Vec::new();
    let mut equalized = Vec::new();

    for year in years {
        let cycle_range = rent.cycle.range(year)?;
        let Some(active) = rent
            .active_span(lease_span)
            .and_then(|span| span.clamp(&cycle_range))
        else {
            continue;
        };

        if rent.rent_type.is_indexed() {
            for contract_rent in &rent.contract_rents {
                let Some(covered) = contract_rent.span().clamp(&active) else {
                    continue;
                };
                let (amount, _) = yearly_contract_amount(
                    rent,
                    contract_rent,
                    year,
                    ctx,
                    Options { equalize: true },
                )?;
                index_adjusted.push(IndexAdjustedRent {
                    intended_use: contract_rent.intended_use,
                    amount: round_cents(amount),
                    start_date: covered.start,
                    end_date: covered.end,
                    factor: index_ratio(rent, contract_rent, year, ctx)?,
                });
            }
        }

        let mut scratch = AdjustmentUsage::default();
        let cycle_amount = round_cents(
            calculate(
                rent,
                lease_span,
                &cycle_range,
                ctx,
                &mut scratch,
                Options { equalize: true },
            )?
            .amount,
        );
        let mut scratch = AdjustmentUsage::default();
        let calendar_year_rent = round_cents(
            calculate(rent, lease_span, &DateRange::year(year)?, ctx, &mut scratch, Options {
                equalize: true,
            })?
            .amount,
        );
        let difference_percent = payable
            .last()
            .filter(|prev| !prev.amount.is_zero())
            .map(|prev| {
                round_half_up(
                    (cycle_amount / prev.amount - Decimal::ONE) * Decimal::ONE_HUNDRED,
                    2,
                )
            });
        payable.push(PayableRent {
            amount: cycle_amount,
            start_date: active.start,
            end_date: active.end,
            difference_percent,
            calendar_year_rent,
        });

        if let Some(window) = rent.equalization_span() {
            if cycle_range.overlap(&window).is_some() {
                let mut scratch = AdjustmentUsage::default();
                let plain = round_cents(
                    calculate(rent, lease_span, &cycle_range, ctx, &mut scratch, Options {
                        equalize: false,
                    })?
                    .amount,
                );
                let factor = if plain.is_zero() {
                    Decimal::ONE
                } else {
                    round_half_up(cycle_amount / plain, 6)
                };
                equalized.push(EqualizedRent {
                    start_date: active.start,
                    end_date: active.end,
                    payable_amount: plain,
                    equalized_payable_amount: cycle_amount,
                    equalization_factor: factor,
                });
            }
        }
    }

    rent.index_adjusted_rents = index_adjusted;
    rent.payable_rents = payable;
    rent.equalized_rents = equalized;
    Ok(())
}
