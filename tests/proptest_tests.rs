//! Property-based tests for the date, share, rounding and reference rules.
//!
//! Run with: `cargo test --test proptest_tests`

use chrono::{Datelike, Days, NaiveDate, Weekday};
use mvj::core::calendar::{is_business_day, next_business_day};
use mvj::core::date_range::{combine_ranges, subtract_range_from_range};
use mvj::core::rent::{ContractRent, PeriodType, Rent, RentType};
use mvj::core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn day(offset: u64) -> NaiveDate {
    date(2000, 1, 1) + Days::new(offset)
}

// ── Proptest Strategies ─────────────────────────────────────────────────────

fn arb_date() -> impl Strategy<Value = NaiveDate> {
    (0u64..20_000).prop_map(day)
}

fn arb_range() -> impl Strategy<Value = DateRange> {
    (0u64..2_000, 0u64..400)
        .prop_map(|(start, len)| DateRange::new(day(start), day(start + len)).unwrap())
}

/// Contact windows of one tenant over 2020: the year is cut at the given
/// day offsets and every segment either has its own TENANT contact or none.
fn arb_tenant() -> impl Strategy<Value = (Vec<u64>, Vec<bool>, Option<(u64, u64)>)> {
    (
        prop::collection::btree_set(1u64..365, 0..5),
        prop::collection::vec(any::<bool>(), 6),
        prop::option::of((0u64..365, 0u64..120)),
    )
        .prop_map(|(cuts, present, billing)| (cuts.into_iter().collect(), present, billing))
}

fn build_tenant(cuts: &[u64], present: &[bool], billing: Option<(u64, u64)>) -> Tenant {
    let year_start = date(2020, 1, 1);
    let mut bounds = vec![0u64];
    bounds.extend_from_slice(cuts);
    bounds.push(366);

    let mut tenant = Tenant::new(1, 1, 1);
    for (i, pair) in bounds.windows(2).enumerate() {
        if !present[i] {
            continue;
        }
        let start = year_start + Days::new(pair[0]);
        let end = year_start + Days::new(pair[1] - 1);
        tenant = tenant.with_contact(TenantContact::new(
            10 + i as u64,
            100 + i as u64,
            TenantContactRole::Tenant,
            Some(start),
            Some(end),
        ));
    }
    if let Some((start, len)) = billing {
        let start = year_start + Days::new(start);
        tenant = tenant.with_contact(TenantContact::new(
            99,
            999,
            TenantContactRole::Billing,
            Some(start),
            Some(start + Days::new(len)),
        ));
    }
    tenant
}

#[cfg(feature = "laske")]
/// Weights 7, 3, 1 from the rightmost digit.
fn expected_check_digit(base: &str) -> u32 {
    let sum: u32 = base
        .chars()
        .rev()
        .zip([7, 3, 1].into_iter().cycle())
        .map(|(c, w)| c.to_digit(10).unwrap() * w)
        .sum();
    (10 - sum % 10) % 10
}

// ── Property Tests ──────────────────────────────────────────────────────────

proptest! {
    /// Every day of the period is attributed exactly once or reported as a gap.
    #[test]
    fn shares_cover_period_once((cuts, present, billing) in arb_tenant()) {
        let tenant = build_tenant(&cuts, &present, billing);
        let period = DateRange::year(2020).unwrap();
        let resolution = resolve_shares(std::slice::from_ref(&tenant), &period);

        let mut pieces: Vec<DateRange> = resolution
            .shares
            .values()
            .flat_map(|by_tenant| by_tenant.values().flatten().copied())
            .collect();
        pieces.extend(resolution.gaps.get(&tenant.id).into_iter().flatten().copied());

        let days: i64 = pieces.iter().map(DateRange::days).sum();
        prop_assert_eq!(days, period.days());
        prop_assert_eq!(combine_ranges(&pieces), vec![period]);
    }

    /// Generated rows add up to the rounded period amount to the cent.
    #[test]
    fn rounding_conserves_cents(
        cents in 1i64..50_000_000,
        denominators in prop::collection::vec(1u32..=7, 1..=4),
        month in 1u32..=12,
    ) {
        let mut store = Store::new();
        let mut unit = ServiceUnit::new(1, "MaKe", ServiceUnitKind::Make);
        unit.default_receivable_type_rent = Some(2);
        store.insert_service_unit(unit);
        store.insert_receivable_type(ReceivableType::new(2, "Maanvuokraus", 1));

        let mut lease = Lease::new(10, LeaseIdentifier {
            type_code: "A1".into(),
            municipality: 1,
            district: 4,
            sequence: 1,
        }, 1);
        lease.start_date = Some(date(2000, 1, 1));
        // Shares need not add up to one; every tenant is billed its own share.
        for (i, den) in denominators.iter().enumerate() {
            let id = i as u64;
            store.insert_contact(Contact::person(200 + id, "Testi", "Vuokralainen"));
            lease.tenants.push(Tenant::new(100 + id, 1, *den).with_contact(TenantContact::new(
                300 + id, 200 + id, TenantContactRole::Tenant, None, None,
            )));
        }
        let mut rent = Rent::new(50, RentType::Fixed);
        rent.due_dates_per_year = Some(12);
        rent.contract_rents.push(ContractRent {
            id: 51,
            intended_use: None,
            amount: Decimal::new(cents, 2),
            period: PeriodType::PerYear,
            base_amount: None,
            base_amount_period: None,
            base_year_rent: None,
            index: None,
            start_date: None,
            end_date: None,
        });
        lease.rents.push(rent);
        store.insert_lease(lease);

        let periods = calculate_invoice_data(
            &store, 10, &DateRange::month(2023, month).unwrap(), date(2023, 1, 1),
        ).unwrap();
        prop_assert_eq!(periods.len(), 1);
        let period = &periods[0];
        let rows: Decimal = period.invoices.iter().flat_map(|i| &i.rows).map(|r| r.amount).sum();
        prop_assert_eq!(rows, period.amount);
        let billed: Decimal = period.invoices.iter().map(|i| i.billed_amount).sum();
        prop_assert_eq!(billed, period.amount);
    }

    /// The next business day is later, a weekday, and nothing earlier
    /// qualifies.
    #[test]
    fn next_business_day_is_first_candidate(start in arb_date()) {
        for calendar in [CalendarKind::WeekdaysOnly, CalendarKind::FinnishBankHolidays] {
            let next = next_business_day(start, &calendar);
            prop_assert!(next > start);
            prop_assert!(!matches!(next.weekday(), Weekday::Sat | Weekday::Sun));
            prop_assert!(is_business_day(next, &calendar));
            let mut between = start + Days::new(1);
            while between < next {
                prop_assert!(!is_business_day(between, &calendar));
                between = between + Days::new(1);
            }
        }
    }

    /// subtract(A, B) joined with A ∩ B gives A back.
    #[test]
    fn subtract_then_overlap_restores(a in arb_range(), b in arb_range()) {
        let mut pieces = subtract_range_from_range(&a, &b);
        if let Some(common) = a.overlap(&b) {
            pieces.push(common);
        }
        prop_assert_eq!(combine_ranges(&pieces), vec![a]);
    }

    #[test]
    fn combine_is_idempotent(ranges in prop::collection::vec(arb_range(), 0..8)) {
        let once = combine_ranges(&ranges);
        prop_assert_eq!(combine_ranges(&once), once);
    }

    #[test]
    fn overlap_is_commutative(a in arb_range(), b in arb_range()) {
        prop_assert_eq!(a.overlap(&b), b.overlap(&a));
    }
}

#[cfg(feature = "laske")]
proptest! {
    /// Check digit follows the 7-3-1 rule and validation accepts only it.
    #[test]
    fn reference_check_digit(base in "[0-9]{1,19}") {
        let expected = expected_check_digit(&base);
        prop_assert_eq!(mvj::laske::check_digit(&base).unwrap(), expected);
        for digit in 0..10u32 {
            let reference = format!("{base}{digit}");
            prop_assert_eq!(mvj::laske::is_valid_reference(&reference), digit == expected);
        }
    }

    /// Name slots concatenate back to the name minus a dropped trailing
    /// single character.
    #[test]
    fn name_slots_rebuild_name(name in "[a-zA-Zäöå .-]{1,140}") {
        let slots = mvj::laske::split_name(&name, None);
        let joined: String = slots.iter().flatten().map(String::as_str).collect();
        let chars: Vec<char> = name.chars().collect();
        let expected: String = if chars.len() > 35 && chars.len() % 35 == 1 {
            chars[..chars.len() - 1].iter().collect()
        } else {
            name.clone()
        };
        prop_assert_eq!(joined, expected);
        prop_assert!(slots.iter().flatten().all(|s| s.chars().count() <= 35));
    }
}
