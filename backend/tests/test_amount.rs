//! Tests for fixed-point amounts
//!
//! Property tests cover the arithmetic laws; the rest pin down the edge
//! cases that decide whether a remote call gets the right magnitude.

use options_sim_core::{Amount, AmountError};
use proptest::prelude::*;

const BOUND: i128 = 1_000_000_000_000_000_000_000_000_000_000;

proptest! {
    #[test]
    fn prop_rescale_to_same_scale_is_identity(raw in any::<i128>(), scale in 0u32..=30) {
        prop_assert_eq!(Amount::new(raw, scale).rescale(scale).unwrap().raw(), raw);
    }

    #[test]
    fn prop_add_then_sub_restores(a in -BOUND..BOUND, b in -BOUND..BOUND, scale in 0u32..=18) {
        let a = Amount::new(a, scale);
        let b = Amount::new(b, scale);
        prop_assert_eq!(a.checked_add(&b).unwrap().checked_sub(&b).unwrap(), a);
    }

    #[test]
    fn prop_mixed_scales_never_combine(a in any::<i64>(), b in any::<i64>(), s in 0u32..18, d in 1u32..6) {
        let left = Amount::new(a as i128, s);
        let right = Amount::new(b as i128, s + d);
        prop_assert!(
            matches!(left.checked_add(&right), Err(AmountError::ScaleMismatch { .. })),
            "add across scales must fail"
        );
        prop_assert!(
            matches!(left.checked_sub(&right), Err(AmountError::ScaleMismatch { .. })),
            "sub across scales must fail"
        );
        prop_assert!(left.partial_cmp(&right).is_none());
    }

    #[test]
    fn prop_display_parses_back(raw in -BOUND..BOUND, scale in 0u32..=18) {
        let amount = Amount::new(raw, scale);
        prop_assert_eq!(Amount::parse_decimal(&amount.to_string(), scale).unwrap(), amount);
    }

    #[test]
    fn prop_portion_never_leaves_dust(raw in 0i128..1_000_000_000_000, fraction in 0.0f64..=1.0) {
        let total = Amount::new(raw, 6);
        let part = total.portion_dedusted(fraction).unwrap();
        prop_assert!(part.raw() <= total.raw());
        let rest = total.raw() - part.raw();
        // either everything is used or more than one whole token remains
        prop_assert!(rest == 0 || rest > 1_000_000);
    }
}

#[test]
fn test_equality_includes_scale() {
    assert_ne!(Amount::new(10, 1), Amount::new(100, 2));
    assert_eq!(
        Amount::new(10, 1).rescale(2).unwrap(),
        Amount::new(100, 2)
    );
}

#[test]
fn test_rescale_down_truncates() {
    assert_eq!(
        Amount::new(-1_999_999, 6).rescale(0).unwrap(),
        Amount::new(-1, 0)
    );
}

#[test]
fn test_overflow_is_reported() {
    let max = Amount::new(i128::MAX, 0);
    assert_eq!(max.checked_add(&Amount::new(1, 0)), Err(AmountError::Overflow));
    assert_eq!(max.rescale(1), Err(AmountError::Overflow));
    assert_eq!(Amount::from_tokens(1, 40), Err(AmountError::Overflow));
}

#[test]
fn test_to_raw_units_guards_scale() {
    let usdc = Amount::from_tokens(5, 6).unwrap();
    assert_eq!(usdc.to_raw_units(6).unwrap(), 5_000_000);
    assert_eq!(
        usdc.to_raw_units(18),
        Err(AmountError::ScaleMismatch { left: 6, right: 18 })
    );
}

#[test]
fn test_parse_decimal_forms() {
    assert_eq!(Amount::parse_decimal("12.5", 2).unwrap(), Amount::new(1250, 2));
    assert_eq!(Amount::parse_decimal("-0.003", 6).unwrap(), Amount::new(-3000, 6));
    assert_eq!(Amount::parse_decimal("1.5e-3", 6).unwrap(), Amount::new(1500, 6));
    assert_eq!(Amount::parse_decimal("0.129", 2).unwrap(), Amount::new(12, 2));
    assert!(Amount::parse_decimal("", 2).is_err());
    assert!(Amount::parse_decimal("1.2.3", 2).is_err());
    assert!(Amount::parse_decimal("abc", 2).is_err());
}

#[test]
fn test_price_math() {
    let volume = Amount::from_tokens(3, 6).unwrap();
    let price = Amount::parse_decimal("2.5", 6).unwrap();
    assert_eq!(
        volume.value_at_price(&price).unwrap(),
        Amount::parse_decimal("7.5", 6).unwrap()
    );

    let budget = Amount::from_tokens(10, 6).unwrap();
    assert_eq!(
        budget.quantity_at_price(&price).unwrap(),
        Amount::from_tokens(4, 6).unwrap()
    );
    assert_eq!(
        budget.quantity_at_price(&Amount::zero(6)),
        Err(AmountError::DivisionByZero)
    );
}

#[test]
fn test_mul_fraction_rejects_bad_input() {
    let a = Amount::from_tokens(1, 6).unwrap();
    assert!(matches!(a.mul_fraction(-0.5), Err(AmountError::InvalidFraction(_))));
    assert!(matches!(a.mul_fraction(f64::NAN), Err(AmountError::InvalidFraction(_))));
    assert_eq!(a.mul_fraction(0.25).unwrap(), Amount::new(250_000, 6));
}
