use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::DealStackError;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::waterfall::clawback;
use crate::waterfall::returns::{partner_result, PartnerResult};
use crate::waterfall::tiers::{
    allocate_capped, catch_up_amount, split_exact, Clawback, ClawbackTrigger, EquityClass,
    PreferredAccrual, WaterfallTier, WaterfallTierKind,
};
use crate::DealStackResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// Input for a full waterfall evaluation over the owner cash-flow series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallInput {
    /// Owner-level series: index 0 is the equity at close (negative),
    /// indices >= 1 the levered FCF of each operating period
    pub owner_cash_flows: Vec<Money>,
    pub classes: Vec<EquityClass>,
    /// Ordered tiers, executed top to bottom each distribution period
    pub tiers: Vec<WaterfallTier>,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Amounts one tier distributed to each class in one period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierAllocation {
    pub tier_name: String,
    pub amounts: Vec<(String, Money)>,
}

/// Result of one period of the waterfall state machine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallPeriodResult {
    pub year: u32,
    pub owner_cash_flow: Money,
    /// Net amount to each class this period (negative on capital calls),
    /// including any clawback adjustment
    pub allocations: Vec<(String, Money)>,
    pub tier_allocations: Vec<TierAllocation>,
    /// Clawback true-ups applied this period; empty when none
    pub clawback_adjustments: Vec<(String, Money)>,
}

/// Full waterfall output: the period-by-period allocation trace and the
/// per-participant performance summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterfallOutput {
    pub periods: Vec<WaterfallPeriodResult>,
    pub partners: Vec<PartnerResult>,
}

// ---------------------------------------------------------------------------
// Running state
// ---------------------------------------------------------------------------

/// A participant with contribution/distribution shares normalized to sum
/// to 1 across the class list.
#[derive(Debug, Clone)]
pub(crate) struct NormalizedClass {
    pub id: String,
    pub contribution_pct: Rate,
    pub distribution_pct: Rate,
}

/// Per-participant running balances, carried strictly forward in time and
/// local to one evaluation.
#[derive(Debug, Clone)]
pub(crate) struct ParticipantState {
    pub contributed: Money,
    pub capital_returned: Money,
    pub preferred_paid: Money,
    pub accrued_preferred: Money,
    /// Cumulative distributions across all tiers, net of clawback true-ups
    pub distributed: Money,
    /// Cumulative promote-tier distributions (catch-up ratio basis)
    pub promote_received: Money,
    pub flows: Vec<Money>,
}

impl ParticipantState {
    fn new() -> Self {
        ParticipantState {
            contributed: Decimal::ZERO,
            capital_returned: Decimal::ZERO,
            preferred_paid: Decimal::ZERO,
            accrued_preferred: Decimal::ZERO,
            distributed: Decimal::ZERO,
            promote_received: Decimal::ZERO,
            flows: Vec::new(),
        }
    }

    pub fn unreturned_capital(&self) -> Money {
        (self.contributed - self.capital_returned).max(Decimal::ZERO)
    }
}

pub(crate) fn normalize_classes(classes: &[EquityClass]) -> DealStackResult<Vec<NormalizedClass>> {
    let contribution_sum: Decimal = classes.iter().map(|c| c.contribution_pct).sum();
    if contribution_sum <= Decimal::ZERO {
        return Err(DealStackError::InvalidInput {
            field: "classes".into(),
            reason: "Contribution percentages must sum to a positive amount".into(),
        });
    }

    let contribution: Vec<Rate> = classes
        .iter()
        .map(|c| c.contribution_pct / contribution_sum)
        .collect();
    let distribution_raw: Vec<Rate> = classes
        .iter()
        .enumerate()
        .map(|(i, c)| c.distribution_pct.unwrap_or(contribution[i]))
        .collect();
    let distribution_sum: Decimal = distribution_raw.iter().copied().sum();
    if distribution_sum <= Decimal::ZERO {
        return Err(DealStackError::InvalidInput {
            field: "classes".into(),
            reason: "Distribution percentages must sum to a positive amount".into(),
        });
    }

    Ok(classes
        .iter()
        .enumerate()
        .map(|(i, c)| NormalizedClass {
            id: c.id.clone(),
            contribution_pct: contribution[i],
            distribution_pct: distribution_raw[i] / distribution_sum,
        })
        .collect())
}

fn class_index(classes: &[NormalizedClass], id: &str) -> Option<usize> {
    classes.iter().position(|c| c.id == id)
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// Run the tier state machine over an owner cash-flow series. Clawback
/// evaluation is suppressed for the hypothetical-liquidation re-runs.
pub(crate) fn run_engine(
    classes: &[NormalizedClass],
    tiers: &[WaterfallTier],
    owner_cash_flows: &[Money],
    evaluate_clawback: bool,
) -> (Vec<WaterfallPeriodResult>, Vec<ParticipantState>) {
    let n = classes.len();
    let mut states: Vec<ParticipantState> = (0..n).map(|_| ParticipantState::new()).collect();
    let mut periods: Vec<WaterfallPeriodResult> = Vec::with_capacity(owner_cash_flows.len());

    let clawback_provision: Option<&Clawback> = tiers.iter().find_map(|t| match &t.kind {
        WaterfallTierKind::Promote {
            clawback: Some(c), ..
        } => Some(c),
        _ => None,
    });
    let last = owner_cash_flows.len().saturating_sub(1);

    for (t, &cf) in owner_cash_flows.iter().enumerate() {
        // Preferred accrues on the balances carried into the period
        for tier in tiers {
            if let WaterfallTierKind::PreferredReturn {
                hurdle_rate,
                accrual,
                ..
            } = &tier.kind
            {
                for state in states.iter_mut() {
                    let base = match accrual {
                        PreferredAccrual::Simple => state.unreturned_capital(),
                        PreferredAccrual::Compounding => {
                            state.unreturned_capital() + state.accrued_preferred
                        }
                    };
                    state.accrued_preferred += *hurdle_rate * base;
                }
            }
        }

        let mut net = vec![Decimal::ZERO; n];
        let mut tier_allocations: Vec<TierAllocation> = Vec::new();

        if cf < Decimal::ZERO {
            // Capital call: pro rata by contribution share
            let weights: Vec<Rate> = classes.iter().map(|c| c.contribution_pct).collect();
            let calls = split_exact(cf, &weights);
            for (i, call) in calls.iter().enumerate() {
                net[i] = *call;
                states[i].contributed += -*call;
            }
        } else {
            let mut pool = cf;
            for tier in tiers {
                let amounts = match &tier.kind {
                    WaterfallTierKind::ReturnOfCapital => {
                        let weights: Vec<Rate> =
                            classes.iter().map(|c| c.contribution_pct).collect();
                        let caps: Vec<Money> =
                            states.iter().map(|s| s.unreturned_capital()).collect();
                        let amounts = allocate_capped(pool, &weights, &caps);
                        for (i, amount) in amounts.iter().enumerate() {
                            states[i].capital_returned += *amount;
                        }
                        amounts
                    }
                    WaterfallTierKind::PreferredReturn { split, .. } => {
                        let mut weights = vec![Decimal::ZERO; n];
                        for (id, share) in split {
                            if let Some(i) = class_index(classes, id) {
                                weights[i] += *share;
                            }
                        }
                        let caps: Vec<Money> =
                            states.iter().map(|s| s.accrued_preferred).collect();
                        let amounts = allocate_capped(pool, &weights, &caps);
                        for (i, amount) in amounts.iter().enumerate() {
                            states[i].preferred_paid += *amount;
                            states[i].accrued_preferred =
                                (states[i].accrued_preferred - *amount).max(Decimal::ZERO);
                        }
                        amounts
                    }
                    WaterfallTierKind::Promote {
                        split, catch_up, ..
                    } => {
                        let mut amounts = vec![Decimal::ZERO; n];
                        let mut tier_pool = pool;

                        if let Some(provision) = catch_up {
                            for (id, target) in &provision.target_shares {
                                if tier_pool <= Decimal::ZERO {
                                    break;
                                }
                                let Some(i) = class_index(classes, id) else {
                                    continue;
                                };
                                let tier_total: Money =
                                    states.iter().map(|s| s.promote_received).sum();
                                let take =
                                    catch_up_amount(*target, tier_total, states[i].promote_received)
                                        .min(tier_pool);
                                if take > Decimal::ZERO {
                                    amounts[i] += take;
                                    states[i].promote_received += take;
                                    tier_pool -= take;
                                }
                            }
                        }

                        if tier_pool > Decimal::ZERO && !split.is_empty() {
                            let mut assigned = Decimal::ZERO;
                            for (j, (id, share)) in split.iter().enumerate() {
                                let Some(i) = class_index(classes, id) else {
                                    continue;
                                };
                                let amount = if j + 1 == split.len() {
                                    tier_pool - assigned
                                } else {
                                    tier_pool * *share
                                };
                                amounts[i] += amount;
                                states[i].promote_received += amount;
                                assigned += amount;
                            }
                        }
                        amounts
                    }
                };

                let consumed: Money = amounts.iter().copied().sum();
                pool -= consumed;
                for (i, amount) in amounts.iter().enumerate() {
                    net[i] += *amount;
                    states[i].distributed += *amount;
                }
                tier_allocations.push(TierAllocation {
                    tier_name: tier.name.clone(),
                    amounts: classes
                        .iter()
                        .zip(amounts.iter())
                        .map(|(c, a)| (c.id.clone(), *a))
                        .collect(),
                });
            }

            // Anything left after the configured tiers falls to the default
            // distribution split
            if pool > Decimal::ZERO {
                let weights: Vec<Rate> = classes.iter().map(|c| c.distribution_pct).collect();
                let amounts = split_exact(pool, &weights);
                for (i, amount) in amounts.iter().enumerate() {
                    net[i] += *amount;
                    states[i].distributed += *amount;
                }
                tier_allocations.push(TierAllocation {
                    tier_name: "Residual Split".into(),
                    amounts: classes
                        .iter()
                        .zip(amounts.iter())
                        .map(|(c, a)| (c.id.clone(), *a))
                        .collect(),
                });
            }
        }

        // Clawback true-up against the hypothetical liquidation
        let mut clawback_adjustments: Vec<(String, Money)> = Vec::new();
        if evaluate_clawback {
            if let Some(provision) = clawback_provision {
                let due = match provision.trigger {
                    ClawbackTrigger::Annual => cf >= Decimal::ZERO,
                    ClawbackTrigger::FinalPeriod => t == last,
                };
                if due {
                    let deltas = clawback::hypothetical_liquidation_deltas(
                        classes,
                        tiers,
                        &owner_cash_flows[..=t],
                        &states,
                    );
                    for (i, delta) in deltas.iter().enumerate() {
                        if !delta.is_zero() {
                            net[i] += *delta;
                            states[i].distributed += *delta;
                            clawback_adjustments.push((classes[i].id.clone(), *delta));
                        }
                    }
                }
            }
        }

        for (i, state) in states.iter_mut().enumerate() {
            state.flows.push(net[i]);
        }

        periods.push(WaterfallPeriodResult {
            year: t as u32,
            owner_cash_flow: cf,
            allocations: classes
                .iter()
                .zip(net.iter())
                .map(|(c, a)| (c.id.clone(), *a))
                .collect(),
            tier_allocations,
            clawback_adjustments,
        });
    }

    (periods, states)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

const SPLIT_TOLERANCE: Decimal = dec!(0.0001);

fn validate_tiers(
    classes: &[NormalizedClass],
    tiers: &[WaterfallTier],
) -> DealStackResult<()> {
    let check_ids = |split: &[(String, Rate)], field: &str| -> DealStackResult<()> {
        for (id, _) in split {
            if class_index(classes, id).is_none() {
                return Err(DealStackError::InvalidInput {
                    field: field.into(),
                    reason: format!("References unknown equity class '{id}'"),
                });
            }
        }
        Ok(())
    };

    for tier in tiers {
        match &tier.kind {
            WaterfallTierKind::ReturnOfCapital => {}
            WaterfallTierKind::PreferredReturn {
                hurdle_rate, split, ..
            } => {
                if *hurdle_rate < Decimal::ZERO {
                    return Err(DealStackError::InvalidInput {
                        field: format!("tier '{}'", tier.name),
                        reason: "Hurdle rate cannot be negative".into(),
                    });
                }
                check_ids(split, "preferred_return.split")?;
            }
            WaterfallTierKind::Promote {
                split, catch_up, ..
            } => {
                if split.is_empty() {
                    return Err(DealStackError::InvalidInput {
                        field: format!("tier '{}'", tier.name),
                        reason: "Promote tier requires a non-empty split".into(),
                    });
                }
                check_ids(split, "promote.split")?;
                let share_sum: Decimal = split.iter().map(|(_, s)| *s).sum();
                if (share_sum - Decimal::ONE).abs() > SPLIT_TOLERANCE {
                    return Err(DealStackError::InvalidInput {
                        field: format!("tier '{}'", tier.name),
                        reason: format!("Promote split must sum to 1, got {share_sum}"),
                    });
                }
                if let Some(provision) = catch_up {
                    check_ids(&provision.target_shares, "promote.catch_up")?;
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Evaluate the tiered equity waterfall over an owner cash-flow series:
/// capital calls, tier-by-tier distributions, clawback true-ups, and
/// per-participant performance.
pub fn run_waterfall(input: &WaterfallInput) -> DealStackResult<ComputationOutput<WaterfallOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.owner_cash_flows.is_empty() {
        return Err(DealStackError::InsufficientData(
            "Owner cash-flow series is empty".into(),
        ));
    }
    if input.classes.is_empty() {
        return Err(DealStackError::InvalidInput {
            field: "classes".into(),
            reason: "At least one equity class is required".into(),
        });
    }

    let contribution_sum: Decimal = input.classes.iter().map(|c| c.contribution_pct).sum();
    if (contribution_sum - Decimal::ONE).abs() > SPLIT_TOLERANCE && contribution_sum > Decimal::ZERO
    {
        warnings.push(format!(
            "Contribution percentages sum to {contribution_sum}; normalized to 1"
        ));
    }

    let classes = normalize_classes(&input.classes)?;
    validate_tiers(&classes, &input.tiers)?;

    let clawback_count = input
        .tiers
        .iter()
        .filter(|t| {
            matches!(
                t.kind,
                WaterfallTierKind::Promote {
                    clawback: Some(_),
                    ..
                }
            )
        })
        .count();
    if clawback_count > 1 {
        warnings.push("Multiple clawback provisions configured; the first applies".into());
    }

    let (periods, states) = run_engine(&classes, &input.tiers, &input.owner_cash_flows, true);

    let partners: Vec<PartnerResult> = classes
        .iter()
        .zip(states.iter())
        .map(|(c, s)| partner_result(&c.id, &s.flows, None, &mut warnings))
        .collect();

    let output = WaterfallOutput { periods, partners };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Tiered Equity Waterfall (Return of Capital / Preferred / Promote)",
        &serde_json::json!({
            "periods": input.owner_cash_flows.len(),
            "num_classes": input.classes.len(),
            "num_tiers": input.tiers.len(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
