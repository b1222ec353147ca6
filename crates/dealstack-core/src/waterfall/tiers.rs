use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Money, Rate};

// ---------------------------------------------------------------------------
// Participants
// ---------------------------------------------------------------------------

/// An equity participant in the distribution waterfall.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityClass {
    pub id: String,
    /// Share of capital calls; normalized across classes to sum to 1
    pub contribution_pct: Rate,
    /// Share of residual distributions; defaults to the normalized
    /// contribution share
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution_pct: Option<Rate>,
}

// ---------------------------------------------------------------------------
// Tier configuration
// ---------------------------------------------------------------------------

/// Accrual basis for unpaid preferred return. Observable only through
/// aggregate behavior, so it is carried as an explicit policy knob.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreferredAccrual {
    /// Simple interest on the unreturned capital balance
    #[default]
    Simple,
    /// Unpaid preferred itself compounds at the hurdle rate
    Compounding,
}

/// Catch-up provision on a promote tier: distributions are directed to the
/// named classes until each reaches its target cumulative share of the
/// tier's distributions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatchUp {
    pub target_shares: Vec<(String, Rate)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClawbackTrigger {
    /// Re-evaluate after every distribution period
    Annual,
    /// Evaluate once, after the last period
    FinalPeriod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClawbackMethod {
    HypotheticalLiquidation,
}

/// Clawback provision on a promote tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clawback {
    pub trigger: ClawbackTrigger,
    pub method: ClawbackMethod,
}

/// Distribution mechanics for one waterfall tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WaterfallTierKind {
    /// Return contributed capital pro rata by contribution share, capped at
    /// each participant's outstanding unreturned capital
    ReturnOfCapital,
    /// Pay accrued-but-unpaid preferred return per the tier split, capped
    /// at each participant's unpaid balance
    PreferredReturn {
        hurdle_rate: Rate,
        split: Vec<(String, Rate)>,
        #[serde(default)]
        accrual: PreferredAccrual,
    },
    /// Split remaining proceeds, optionally after a catch-up, consuming the
    /// rest of the pool
    Promote {
        split: Vec<(String, Rate)>,
        #[serde(skip_serializing_if = "Option::is_none")]
        catch_up: Option<CatchUp>,
        #[serde(skip_serializing_if = "Option::is_none")]
        clawback: Option<Clawback>,
    },
}

/// A single tier in the distribution waterfall, executed in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallTier {
    pub name: String,
    pub kind: WaterfallTierKind,
}

// ---------------------------------------------------------------------------
// Allocation primitives
// ---------------------------------------------------------------------------

/// Split `total` across `weights` (which sum to 1), assigning the exact
/// residual to the last slot so the parts always sum to `total`.
pub(crate) fn split_exact(total: Money, weights: &[Rate]) -> Vec<Money> {
    let n = weights.len();
    let mut out = vec![Decimal::ZERO; n];
    let mut assigned = Decimal::ZERO;
    for i in 0..n {
        if i + 1 == n {
            out[i] = total - assigned;
        } else {
            out[i] = total * weights[i];
            assigned += out[i];
        }
    }
    out
}

/// Allocate up to `pool` across participants pro rata by `weights`, capped
/// per participant by `caps`. When a cap binds, the excess is redistributed
/// among the remaining weighted participants; the final uncapped round
/// assigns the exact residual.
pub(crate) fn allocate_capped(pool: Money, weights: &[Rate], caps: &[Money]) -> Vec<Money> {
    let n = weights.len();
    let mut amounts = vec![Decimal::ZERO; n];
    if pool <= Decimal::ZERO {
        return amounts;
    }

    let total_cap: Money = caps.iter().map(|c| c.max(&Decimal::ZERO)).sum();
    let mut remaining = pool.min(total_cap);

    while remaining > Decimal::ZERO {
        let open: Vec<usize> = (0..n)
            .filter(|&i| weights[i] > Decimal::ZERO && amounts[i] < caps[i])
            .collect();
        if open.is_empty() {
            break;
        }
        let weight_sum: Decimal = open.iter().map(|&i| weights[i]).sum();

        let binds = open
            .iter()
            .any(|&i| remaining * weights[i] / weight_sum > caps[i] - amounts[i]);

        if binds {
            let mut allocated = Decimal::ZERO;
            for &i in &open {
                let desired = remaining * weights[i] / weight_sum;
                let take = desired.min(caps[i] - amounts[i]);
                amounts[i] += take;
                allocated += take;
            }
            if allocated <= Decimal::ZERO {
                break;
            }
            remaining -= allocated;
        } else {
            let (&last, rest) = open.split_last().expect("open is non-empty");
            let mut allocated = Decimal::ZERO;
            for &i in rest {
                let share = remaining * weights[i] / weight_sum;
                amounts[i] += share;
                allocated += share;
            }
            amounts[last] += remaining - allocated;
            remaining = Decimal::ZERO;
        }
    }

    amounts
}

/// Amount that brings a participant's cumulative tier share up to `target`:
/// solves (received + a) / (tier_total + a) = target.
pub(crate) fn catch_up_amount(target: Rate, tier_total: Money, received: Money) -> Money {
    if target >= Decimal::ONE {
        return Decimal::MAX;
    }
    ((target * tier_total - received) / (Decimal::ONE - target)).max(Decimal::ZERO)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
