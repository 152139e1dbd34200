//! Tenancy share resolution.
//!
//! A billing period is decomposed per tenant into the sub-ranges owned by
//! the contact billed for that tenant. Within a TENANT-role span an active
//! BILLING contact takes precedence; periods without any TENANT contact are
//! reported as gaps and are not billed.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::{Add, Mul};

use rust_decimal::Decimal;

use super::date_range::{DateRange, combine_ranges, subtract_ranges_from_ranges};
use super::entities::{ContactId, Tenant, TenantContactRole, TenantId};
use super::error::BillingError;

/// Exact rational share, always kept in lowest terms with a positive
/// denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fraction {
    num: i128,
    den: i128,
}

impl Fraction {
    pub const ZERO: Fraction = Fraction { num: 0, den: 1 };
    pub const ONE: Fraction = Fraction { num: 1, den: 1 };

    /// A zero denominator yields zero.
    pub fn new(num: i128, den: i128) -> Self {
        if den == 0 {
            return Self::ZERO;
        }
        let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
        let g = gcd(num.abs(), den).max(1);
        Self {
            num: num / g,
            den: den / g,
        }
    }

    pub fn numerator(&self) -> i128 {
        self.num
    }

    pub fn denominator(&self) -> i128 {
        self.den
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0
    }

    /// `amount * self`, unrounded.
    pub fn of(&self, amount: Decimal) -> Result<Decimal, BillingError> {
        let overflow = || BillingError::Arithmetic(format!("share {self} is out of range"));
        let num = Decimal::try_from_i128_with_scale(self.num, 0).map_err(|_| overflow())?;
        let den = Decimal::try_from_i128_with_scale(self.den, 0).map_err(|_| overflow())?;
        amount
            .checked_mul(num)
            .and_then(|v| v.checked_div(den))
            .ok_or_else(overflow)
    }
}

impl std::fmt::Display for Fraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl Add for Fraction {
    type Output = Fraction;

    fn add(self, rhs: Fraction) -> Fraction {
        Fraction::new(self.num * rhs.den + rhs.num * self.den, self.den * rhs.den)
    }
}

impl Mul for Fraction {
    type Output = Fraction;

    fn mul(self, rhs: Fraction) -> Fraction {
        Fraction::new(self.num * rhs.num, self.den * rhs.den)
    }
}

impl Fraction {
    /// `self / rhs`; dividing by zero yields zero.
    pub fn ratio_of(self, rhs: Fraction) -> Fraction {
        Fraction::new(self.num * rhs.den, self.den * rhs.num)
    }
}

impl std::iter::Sum for Fraction {
    fn sum<I: Iterator<Item = Fraction>>(iter: I) -> Fraction {
        iter.fold(Fraction::ZERO, Add::add)
    }
}

impl PartialOrd for Fraction {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Fraction {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.num * other.den).cmp(&(other.num * self.den))
    }
}

fn gcd(mut a: i128, mut b: i128) -> i128 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Attribution of a billing period to contacts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShareResolution {
    /// contact → tenant → disjoint, maximal sub-ranges.
    pub shares: BTreeMap<ContactId, BTreeMap<TenantId, Vec<DateRange>>>,
    /// Uncovered parts of the period per tenant.
    pub gaps: BTreeMap<TenantId, Vec<DateRange>>,
}

impl ShareResolution {
    /// All ranges attributed to `tenant`, across contacts.
    pub fn ranges_for_tenant(&self, tenant: TenantId) -> Vec<DateRange> {
        let ranges: Vec<DateRange> = self
            .shares
            .values()
            .filter_map(|by_tenant| by_tenant.get(&tenant))
            .flatten()
            .copied()
            .collect();
        combine_ranges(&ranges)
    }
}

/// Decompose `period` into per-contact, per-tenant sub-ranges.
pub fn resolve_shares<'a>(
    tenants: impl IntoIterator<Item = &'a Tenant>,
    period: &DateRange,
) -> ShareResolution {
    let mut resolution = ShareResolution::default();

    for tenant in tenants.into_iter().filter(|t| !t.deleted) {
        let mut tenant_contacts: Vec<_> = tenant
            .contacts_with_role(TenantContactRole::Tenant)
            .filter_map(|tc| tc.span().clamp(period).map(|r| (r, tc.contact)))
            .collect();
        tenant_contacts.sort_by_key(|(r, contact)| (r.start, *contact));

        let mut billing_contacts: Vec<_> = tenant
            .contacts_with_role(TenantContactRole::Billing)
            .filter_map(|bc| bc.span().clamp(period).map(|r| (r, bc.contact)))
            .collect();
        billing_contacts.sort_by_key(|(r, contact)| (r.start, *contact));

        let mut covered = Vec::new();
        for (tenant_range, tenant_contact) in &tenant_contacts {
            let mut remaining = vec![*tenant_range];
            for (billing_range, billing_contact) in &billing_contacts {
                let taken: Vec<DateRange> = remaining
                    .iter()
                    .filter_map(|r| r.overlap(billing_range))
                    .collect();
                if taken.is_empty() {
                    continue;
                }
                attribute(&mut resolution, *billing_contact, tenant.id, &taken);
                remaining = subtract_ranges_from_ranges(&remaining, &[*billing_range]);
            }
            if !remaining.is_empty() {
                attribute(&mut resolution, *tenant_contact, tenant.id, &remaining);
            }
            covered.push(*tenant_range);
        }

        let gaps = subtract_ranges_from_ranges(&[*period], &covered);
        if !gaps.is_empty() {
            resolution.gaps.insert(tenant.id, gaps);
        }
    }

    for by_tenant in resolution.shares.values_mut() {
        for ranges in by_tenant.values_mut() {
            *ranges = combine_ranges(ranges);
        }
    }
    resolution
}

fn attribute(
    resolution: &mut ShareResolution,
    contact: ContactId,
    tenant: TenantId,
    ranges: &[DateRange],
) {
    resolution
        .shares
        .entry(contact)
        .or_default()
        .entry(tenant)
        .or_default()
        .extend_from_slice(ranges);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entities::TenantContact;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn r(a: NaiveDate, b: NaiveDate) -> DateRange {
        DateRange::new(a, b).unwrap()
    }

    #[test]
    fn fraction_arithmetic() {
        let third = Fraction::new(1, 3);
        assert_eq!(third + third + third, Fraction::ONE);
        assert_eq!(Fraction::new(2, 4), Fraction::new(1, 2));
        assert_eq!(Fraction::new(1, 0), Fraction::ZERO);
        assert!(Fraction::new(1, 3) < Fraction::new(1, 2));
        assert_eq!(Fraction::new(1, 4).of(dec!(100)).unwrap(), dec!(25));
    }

    #[test]
    fn billing_contact_takes_middle_of_month() {
        let tenant = Tenant::new(1, 1, 1)
            .with_contact(TenantContact::new(1, 10, TenantContactRole::Tenant, None, None))
            .with_contact(TenantContact::new(
                2,
                20,
                TenantContactRole::Billing,
                Some(d(2020, 1, 10)),
                Some(d(2020, 1, 20)),
            ));
        let month = r(d(2020, 1, 1), d(2020, 1, 31));
        let res = resolve_shares([&tenant], &month);
        assert_eq!(
            res.shares[&10][&1],
            vec![r(d(2020, 1, 1), d(2020, 1, 9)), r(d(2020, 1, 21), d(2020, 1, 31))]
        );
        assert_eq!(res.shares[&20][&1], vec![r(d(2020, 1, 10), d(2020, 1, 20))]);
        assert!(res.gaps.is_empty());
        assert_eq!(res.ranges_for_tenant(1), vec![month]);
    }

    #[test]
    fn missing_tenant_contact_is_a_gap() {
        let tenant = Tenant::new(1, 1, 2).with_contact(TenantContact::new(
            1,
            10,
            TenantContactRole::Tenant,
            Some(d(2020, 1, 16)),
            None,
        ));
        let month = r(d(2020, 1, 1), d(2020, 1, 31));
        let res = resolve_shares([&tenant], &month);
        assert_eq!(res.shares[&10][&1], vec![r(d(2020, 1, 16), d(2020, 1, 31))]);
        assert_eq!(res.gaps[&1], vec![r(d(2020, 1, 1), d(2020, 1, 15))]);
    }

    #[test]
    fn same_contact_on_two_tenants() {
        let a = Tenant::new(1, 1, 2)
            .with_contact(TenantContact::new(1, 10, TenantContactRole::Tenant, None, None));
        let b = Tenant::new(2, 1, 2)
            .with_contact(TenantContact::new(2, 10, TenantContactRole::Tenant, None, None));
        let month = r(d(2020, 2, 1), d(2020, 2, 29));
        let res = resolve_shares([&a, &b], &month);
        assert_eq!(res.shares.len(), 1);
        assert_eq!(res.shares[&10].len(), 2);
    }
}
