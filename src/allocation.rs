use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::AllocationError;
use crate::types::TransferTarget;

/// Decimal places kept by random draws, capped by the asset's own decimals.
pub const RANDOM_AMOUNT_SCALE: u32 = 6;

/// Fan-out policies (`Fixed`, `RandomRange`, `ExplicitList`) are resolved once
/// per batch by [`allocate`]; sweeps are resolved per wallet by [`resolve_sweep`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationPolicy {
    Fixed(Decimal),
    RandomRange { min: Decimal, max: Decimal },
    ExplicitList(Vec<Decimal>),
    SweepAll,
    SweepFixed(Decimal),
    SweepReserve(Decimal),
}

impl AllocationPolicy {
    pub fn is_sweep(&self) -> bool {
        matches!(
            self,
            AllocationPolicy::SweepAll
                | AllocationPolicy::SweepFixed(_)
                | AllocationPolicy::SweepReserve(_)
        )
    }

    pub fn describe(&self) -> String {
        match self {
            AllocationPolicy::Fixed(amount) => format!("fixed {} per target", amount),
            AllocationPolicy::RandomRange { min, max } => format!("random in [{}, {}]", min, max),
            AllocationPolicy::ExplicitList(amounts) => format!("{} explicit amounts", amounts.len()),
            AllocationPolicy::SweepAll => "sweep entire balance minus fee".to_string(),
            AllocationPolicy::SweepFixed(amount) => format!("sweep {} per wallet", amount),
            AllocationPolicy::SweepReserve(reserve) => {
                format!("sweep everything above a {} reserve", reserve)
            }
        }
    }
}

/// Returns one message per violated policy invariant. Empty means valid.
pub fn validate_policy(policy: &AllocationPolicy, target_count: usize) -> Vec<String> {
    let mut errors = Vec::new();

    match policy {
        AllocationPolicy::Fixed(amount) | AllocationPolicy::SweepFixed(amount) => {
            if *amount <= Decimal::ZERO {
                errors.push(format!("fixed amount must be greater than 0, got {}", amount));
            }
        }
        AllocationPolicy::RandomRange { min, max } => {
            if *min <= Decimal::ZERO || *max <= Decimal::ZERO || min >= max {
                errors.push(format!(
                    "random range needs 0 < min < max, got min {} and max {}",
                    min, max
                ));
            } else if random_bounds(*min, *max, RANDOM_AMOUNT_SCALE).is_none() {
                errors.push(format!(
                    "random range [{}, {}] contains no {}-decimal amount",
                    min, max, RANDOM_AMOUNT_SCALE
                ));
            }
        }
        AllocationPolicy::ExplicitList(amounts) => {
            if amounts.len() != target_count {
                errors.push(format!(
                    "explicit amount list has {} entries but there are {} targets",
                    amounts.len(),
                    target_count
                ));
            }
            if amounts.iter().any(|amount| *amount <= Decimal::ZERO) {
                errors.push("explicit amounts must all be greater than 0".to_string());
            }
        }
        AllocationPolicy::SweepAll => {}
        AllocationPolicy::SweepReserve(reserve) => {
            if *reserve < Decimal::ZERO {
                errors.push(format!("reserve must not be negative, got {}", reserve));
            }
        }
    }

    errors
}

/// Computes the amount for every target using a thread-local RNG.
///
/// Amounts are cut to the asset's `decimals` so each target carries exactly
/// what will move on chain.
pub fn allocate(
    targets: &[String],
    policy: &AllocationPolicy,
    decimals: u8,
) -> Result<Vec<TransferTarget>, AllocationError> {
    allocate_with_rng(targets, policy, decimals, &mut rand::thread_rng())
}

pub fn allocate_with_rng<R: Rng>(
    targets: &[String],
    policy: &AllocationPolicy,
    decimals: u8,
    rng: &mut R,
) -> Result<Vec<TransferTarget>, AllocationError> {
    let errors = validate_policy(policy, targets.len());
    if !errors.is_empty() {
        return Err(AllocationError::InvalidAllocationPolicy(errors.join("; ")));
    }
    let scale = u32::from(decimals);

    targets
        .iter()
        .enumerate()
        .map(|(i, address)| {
            let amount = match policy {
                AllocationPolicy::Fixed(amount) | AllocationPolicy::SweepFixed(amount) => *amount,
                AllocationPolicy::RandomRange { min, max } => {
                    draw_random_amount(*min, *max, scale.min(RANDOM_AMOUNT_SCALE), rng)?
                }
                AllocationPolicy::ExplicitList(amounts) => amounts[i],
                AllocationPolicy::SweepAll | AllocationPolicy::SweepReserve(_) => {
                    return Err(AllocationError::InvalidAllocationPolicy(
                        "sweep amounts depend on live balances and are resolved per wallet"
                            .to_string(),
                    ));
                }
            };
            Ok(TransferTarget {
                address: address.clone(),
                amount: amount.trunc_with_scale(scale).normalize(),
            })
        })
        .collect()
}

/// Inclusive bounds of `[min, max]` counted in units of `10^-scale`.
fn random_bounds(min: Decimal, max: Decimal, scale: u32) -> Option<(i64, i64)> {
    let factor = Decimal::from(10_u64.checked_pow(scale)?);
    let low = (min.checked_mul(factor)?).ceil().to_i64()?;
    let high = (max.checked_mul(factor)?).floor().to_i64()?;
    (low <= high).then_some((low, high))
}

/// Uniform draw in `[min, max]` with exactly `scale` decimals.
pub fn draw_random_amount<R: Rng>(
    min: Decimal,
    max: Decimal,
    scale: u32,
    rng: &mut R,
) -> Result<Decimal, AllocationError> {
    match random_bounds(min, max, scale) {
        Some((low, high)) => Ok(Decimal::new(rng.gen_range(low..=high), scale)),
        None => Err(AllocationError::InvalidAllocationPolicy(format!(
            "random range [{}, {}] contains no {}-decimal amount",
            min, max, scale
        ))),
    }
}

/// Per-wallet sweep decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SweepAmount {
    /// Move this many base units.
    Transfer(u64),
    /// Nothing to move; the wallet is reported as a failed item.
    Skip(String),
}

/// Resolves a sweep policy against one wallet's live balance.
///
/// `balance` and `fee` are base units of the swept asset; pass a zero fee when
/// the fee is paid in a different asset than the one being swept.
pub fn resolve_sweep(
    policy: &AllocationPolicy,
    balance: u64,
    fee: u64,
    decimals: u8,
) -> Result<SweepAmount, AllocationError> {
    if !policy.is_sweep() {
        return Err(AllocationError::InvalidAllocationPolicy(format!(
            "{} is not a sweep policy",
            policy.describe()
        )));
    }

    if balance == 0 {
        return Ok(SweepAmount::Skip("balance is zero".to_string()));
    }

    let amount = match policy {
        AllocationPolicy::SweepAll => match balance.checked_sub(fee) {
            Some(units) if units > 0 => SweepAmount::Transfer(units),
            _ => SweepAmount::Skip("balance cannot cover the network fee".to_string()),
        },
        AllocationPolicy::SweepFixed(amount) => {
            let units = to_base_units(*amount, decimals).ok_or_else(|| {
                AllocationError::InvalidAllocationPolicy(format!(
                    "fixed amount {} does not fit the asset's base units",
                    amount
                ))
            })?;
            if units == 0 {
                SweepAmount::Skip(format!("{} rounds to zero base units", amount))
            } else if balance < units.saturating_add(fee) {
                SweepAmount::Skip(format!("balance too low to transfer {}", amount))
            } else {
                SweepAmount::Transfer(units)
            }
        }
        AllocationPolicy::SweepReserve(reserve) => {
            let reserve_units = to_base_units(*reserve, decimals).ok_or_else(|| {
                AllocationError::InvalidAllocationPolicy(format!(
                    "reserve {} does not fit the asset's base units",
                    reserve
                ))
            })?;
            match balance
                .checked_sub(reserve_units)
                .and_then(|rest| rest.checked_sub(fee))
            {
                Some(units) if units > 0 => SweepAmount::Transfer(units),
                _ => SweepAmount::Skip(format!(
                    "balance left after keeping {} is not enough",
                    reserve
                )),
            }
        }
        _ => {
            return Err(AllocationError::InvalidAllocationPolicy(format!(
                "{} is not a sweep policy",
                policy.describe()
            )));
        }
    };

    Ok(amount)
}

/// Converts a display amount into base units, truncating extra precision.
pub fn to_base_units(amount: Decimal, decimals: u8) -> Option<u64> {
    if amount < Decimal::ZERO {
        return None;
    }
    let factor = Decimal::from(10_u64.checked_pow(u32::from(decimals))?);
    amount.checked_mul(factor)?.trunc().to_u64()
}

pub fn from_base_units(units: u64, decimals: u8) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(units), u32::from(decimals)).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::str::FromStr;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    fn targets(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("target-{i}")).collect()
    }

    #[test]
    fn fixed_policy_repeats_the_amount() {
        let allocated = allocate(&targets(4), &AllocationPolicy::Fixed(dec("0.1")), 9).unwrap();
        assert_eq!(allocated.len(), 4);
        assert!(allocated.iter().all(|t| t.amount == dec("0.1")));
        assert_eq!(allocated[3].address, "target-3");
    }

    #[test]
    fn random_amounts_stay_in_range_with_six_decimals() {
        let mut rng = StdRng::seed_from_u64(7);
        let policy = AllocationPolicy::RandomRange {
            min: dec("0.05"),
            max: dec("0.15"),
        };
        let allocated = allocate_with_rng(&targets(200), &policy, 9, &mut rng).unwrap();

        for target in allocated {
            assert!(target.amount >= dec("0.05") && target.amount <= dec("0.15"));
            assert!(target.amount.scale() <= RANDOM_AMOUNT_SCALE);
            assert_eq!(target.amount, target.amount.round_dp(RANDOM_AMOUNT_SCALE));
        }
    }

    #[test]
    fn random_range_rejects_inverted_bounds() {
        let policy = AllocationPolicy::RandomRange {
            min: dec("2"),
            max: dec("1"),
        };
        let err = allocate(&targets(2), &policy, 9).unwrap_err();
        assert!(matches!(err, AllocationError::InvalidAllocationPolicy(_)));
    }

    #[test]
    fn random_range_narrower_than_resolution_is_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        let err = draw_random_amount(dec("0.0000001"), dec("0.0000009"), 6, &mut rng).unwrap_err();
        assert!(err.to_string().contains("contains no 6-decimal amount"));
    }

    #[test]
    fn narrow_random_range_fails_policy_validation() {
        let policy = AllocationPolicy::RandomRange {
            min: dec("0.0000001"),
            max: dec("0.0000009"),
        };
        let errors = validate_policy(&policy, 3);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("contains no 6-decimal amount"));
    }

    #[test]
    fn random_draws_follow_coarse_token_decimals() {
        let mut rng = StdRng::seed_from_u64(11);
        let policy = AllocationPolicy::RandomRange {
            min: dec("1"),
            max: dec("2"),
        };
        let allocated = allocate_with_rng(&targets(100), &policy, 2, &mut rng).unwrap();

        for target in allocated {
            assert!(target.amount >= dec("1") && target.amount <= dec("2"));
            assert_eq!(target.amount, target.amount.trunc_with_scale(2));
        }
    }

    #[test]
    fn explicit_and_fixed_amounts_are_cut_to_asset_decimals() {
        let explicit = AllocationPolicy::ExplicitList(vec![dec("0.129"), dec("3")]);
        let allocated = allocate(&targets(2), &explicit, 2).unwrap();
        assert_eq!(allocated[0].amount, dec("0.12"));
        assert_eq!(allocated[1].amount, dec("3"));

        let fixed = allocate(&targets(1), &AllocationPolicy::Fixed(dec("1.5")), 0).unwrap();
        assert_eq!(fixed[0].amount, dec("1"));
    }

    #[test]
    fn explicit_list_length_must_match_targets() {
        let policy = AllocationPolicy::ExplicitList(vec![dec("1"), dec("2")]);
        let err = allocate(&targets(3), &policy, 9).unwrap_err();
        assert!(err.to_string().contains("2 entries but there are 3 targets"));
    }

    #[test]
    fn explicit_list_is_deterministic() {
        let policy = AllocationPolicy::ExplicitList(vec![dec("0.1"), dec("0.2"), dec("0.15")]);
        let first = allocate(&targets(3), &policy, 9).unwrap();
        let second = allocate(&targets(3), &policy, 9).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[2].amount, dec("0.15"));
    }

    #[test]
    fn allocate_refuses_balance_dependent_sweeps() {
        assert!(allocate(&targets(1), &AllocationPolicy::SweepAll, 9).is_err());
        assert!(allocate(&targets(1), &AllocationPolicy::SweepReserve(dec("0.1")), 9).is_err());
        let fixed = allocate(&targets(2), &AllocationPolicy::SweepFixed(dec("0.5")), 9).unwrap();
        assert!(fixed.iter().all(|t| t.amount == dec("0.5")));
    }

    #[test]
    fn sweep_all_subtracts_the_estimated_fee() {
        let amount = resolve_sweep(&AllocationPolicy::SweepAll, 1_000_000, 5_000, 9).unwrap();
        assert_eq!(amount, SweepAmount::Transfer(995_000));
    }

    #[test]
    fn sweep_all_skips_dust_and_empty_wallets() {
        assert!(matches!(
            resolve_sweep(&AllocationPolicy::SweepAll, 5_000, 5_000, 9).unwrap(),
            SweepAmount::Skip(_)
        ));
        assert_eq!(
            resolve_sweep(&AllocationPolicy::SweepAll, 0, 5_000, 9).unwrap(),
            SweepAmount::Skip("balance is zero".to_string())
        );
    }

    #[test]
    fn sweep_fixed_requires_amount_plus_fee() {
        let policy = AllocationPolicy::SweepFixed(dec("0.001"));
        assert_eq!(
            resolve_sweep(&policy, 1_005_000, 5_000, 9).unwrap(),
            SweepAmount::Transfer(1_000_000)
        );
        assert!(matches!(
            resolve_sweep(&policy, 1_004_999, 5_000, 9).unwrap(),
            SweepAmount::Skip(_)
        ));
    }

    #[test]
    fn sweep_reserve_keeps_reserve_and_fee() {
        let policy = AllocationPolicy::SweepReserve(dec("0.001"));
        assert_eq!(
            resolve_sweep(&policy, 3_000_000, 5_000, 9).unwrap(),
            SweepAmount::Transfer(1_995_000)
        );
        assert!(matches!(
            resolve_sweep(&policy, 1_000_000, 5_000, 9).unwrap(),
            SweepAmount::Skip(_)
        ));
    }

    #[test]
    fn token_sweep_without_fee_moves_whole_balance() {
        let amount = resolve_sweep(&AllocationPolicy::SweepAll, 42_000_000, 0, 6).unwrap();
        assert_eq!(amount, SweepAmount::Transfer(42_000_000));
    }

    #[test]
    fn resolve_sweep_rejects_fan_out_policy() {
        assert!(resolve_sweep(&AllocationPolicy::Fixed(dec("1")), 10, 0, 9).is_err());
    }

    #[test]
    fn base_unit_conversion_truncates_extra_precision() {
        assert_eq!(to_base_units(dec("0.1"), 9), Some(100_000_000));
        assert_eq!(to_base_units(dec("1.2345678"), 6), Some(1_234_567));
        assert_eq!(to_base_units(dec("-1"), 6), None);
        assert_eq!(from_base_units(995_000, 9), dec("0.000995"));
        assert_eq!(from_base_units(1_500_000, 6), dec("1.5"));
    }
}
