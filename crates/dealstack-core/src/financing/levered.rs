use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::DealStackError;
use crate::financing::schedule::{
    aggregate_debt, allocate_transaction_costs, AggregateDebtPeriod, TransactionCostSchedule,
};
use crate::financing::tranche::{build_tranche_schedule, DebtTranche, TrancheSchedule};
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::DealStackResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// One operating period of the unlevered projection, as produced by the
/// operation-level simulators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingPeriod {
    pub noi: Money,
    #[serde(default)]
    pub maintenance_capex: Money,
    #[serde(default)]
    pub working_capital_change: Money,
}

impl OperatingPeriod {
    pub fn unlevered_fcf(&self) -> Money {
        self.noi - self.maintenance_capex - self.working_capital_change
    }
}

/// Input for a full financing analysis: debt schedules, levered cash flow,
/// owner-level cash flow, and coverage KPIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancingInput {
    /// Total initial investment (purchase price plus capitalized costs)
    pub initial_investment: Money,
    /// Unlevered projection, one entry per operating period
    pub operating_periods: Vec<OperatingPeriod>,
    /// Debt tranches in the capital stack
    pub tranches: Vec<DebtTranche>,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// Levered free cash flow for one operating period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeveredFcfPeriod {
    pub year: u32,
    pub unlevered_fcf: Money,
    pub interest: Money,
    pub principal: Money,
    /// Exit fees falling due this period
    pub transaction_costs: Money,
    /// Net proceeds of tranches drawn this period (zero in period 0, where
    /// proceeds fund the close instead)
    pub debt_proceeds: Money,
    /// interest + principal + transaction costs
    pub debt_service: Money,
    pub levered_fcf: Money,
}

/// Coverage and leverage ratios for one operating period. `None` marks a
/// ratio that is not meaningful, never NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtKpiPeriod {
    pub year: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dscr: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub senior_dscr: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ltv: Option<Rate>,
}

/// Full financing analysis output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancingOutput {
    pub tranche_schedules: Vec<TrancheSchedule>,
    pub aggregate_schedule: Vec<AggregateDebtPeriod>,
    pub transaction_costs: TransactionCostSchedule,
    pub levered_fcf: Vec<LeveredFcfPeriod>,
    /// Index 0 is the equity required at close (negative); indices >= 1 are
    /// the levered FCF of operating periods 0..n-1
    pub owner_cash_flows: Vec<Money>,
    pub kpis: Vec<DebtKpiPeriod>,
    pub net_debt_proceeds_at_close: Money,
    pub equity_at_close: Money,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Run the full debt-side analysis: amortize every tranche, consolidate,
/// allocate transaction costs, assemble levered and owner-level cash flows,
/// and derive per-period coverage KPIs.
pub fn analyze_financing(
    input: &FinancingInput,
) -> DealStackResult<ComputationOutput<FinancingOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.initial_investment <= Decimal::ZERO {
        return Err(DealStackError::InvalidInput {
            field: "initial_investment".into(),
            reason: "Initial investment must be positive".into(),
        });
    }
    if input.operating_periods.is_empty() {
        return Err(DealStackError::InsufficientData(
            "At least one operating period is required".into(),
        ));
    }

    let horizon = input.operating_periods.len();

    for tranche in &input.tranches {
        if tranche.is_inert() {
            warnings.push(format!(
                "Tranche '{}' has zero principal or term; treated as a no-op",
                tranche.name
            ));
        }
    }

    let tranche_schedules: Vec<TrancheSchedule> = input
        .tranches
        .iter()
        .map(|t| build_tranche_schedule(t, horizon))
        .collect();
    let aggregate_schedule = aggregate_debt(&input.tranches, &tranche_schedules, horizon);
    let transaction_costs =
        allocate_transaction_costs(&input.tranches, &tranche_schedules, horizon);

    // --- Levered FCF ---
    let mut levered_fcf = Vec::with_capacity(horizon);
    for (t, period) in input.operating_periods.iter().enumerate() {
        let unlevered = period.unlevered_fcf();
        let interest = aggregate_schedule[t].total.interest;
        let principal = aggregate_schedule[t].total.principal;
        let fees = transaction_costs.exit_fees[t];
        let debt_service = interest + principal + fees;
        // Period-0 proceeds fund the close; later draws offset the payoff
        // they replace
        let debt_proceeds = if t > 0 {
            transaction_costs.net_proceeds[t]
        } else {
            Decimal::ZERO
        };

        levered_fcf.push(LeveredFcfPeriod {
            year: t as u32,
            unlevered_fcf: unlevered,
            interest,
            principal,
            transaction_costs: fees,
            debt_proceeds,
            debt_service,
            levered_fcf: unlevered - debt_service + debt_proceeds,
        });
    }

    // --- Owner cash-flow series ---
    let net_debt_proceeds_at_close = transaction_costs
        .net_proceeds
        .first()
        .copied()
        .unwrap_or(Decimal::ZERO);
    let equity_at_close = input.initial_investment - net_debt_proceeds_at_close;
    if equity_at_close < Decimal::ZERO {
        warnings.push("Net debt proceeds exceed the initial investment at close".into());
    }

    let mut owner_cash_flows = Vec::with_capacity(horizon + 1);
    owner_cash_flows.push(-equity_at_close);
    owner_cash_flows.extend(levered_fcf.iter().map(|p| p.levered_fcf));

    // --- KPIs ---
    let mut kpis = Vec::with_capacity(horizon);
    for (t, period) in input.operating_periods.iter().enumerate() {
        let noi = period.noi;
        let service = levered_fcf[t].debt_service;
        let senior_service = aggregate_schedule[t].senior.interest
            + aggregate_schedule[t].senior.principal
            + transaction_costs.senior_exit_fees[t];
        let beginning = aggregate_schedule[t].total.beginning_balance;

        let dscr = if noi > Decimal::ZERO && !service.is_zero() {
            Some(noi / service)
        } else {
            None
        };
        let senior_dscr = if noi > Decimal::ZERO && !senior_service.is_zero() {
            Some(noi / senior_service)
        } else {
            None
        };
        let ltv = if beginning > Decimal::ZERO {
            Some(beginning / input.initial_investment)
        } else {
            None
        };

        kpis.push(DebtKpiPeriod {
            year: t as u32,
            dscr,
            senior_dscr,
            ltv,
        });
    }

    if let Some(min_dscr) = kpis.iter().filter_map(|k| k.dscr).min() {
        if min_dscr < dec!(1.2) {
            warnings.push(format!(
                "Minimum DSCR of {min_dscr:.2} is below 1.20x — lender covenant risk"
            ));
        }
    }
    if let Some(max_ltv) = kpis.iter().filter_map(|k| k.ltv).max() {
        if max_ltv > dec!(0.80) {
            warnings.push(format!(
                "Peak LTV of {:.1}% exceeds 80% — high leverage",
                max_ltv * dec!(100)
            ));
        }
    }

    let output = FinancingOutput {
        tranche_schedules,
        aggregate_schedule,
        transaction_costs,
        levered_fcf,
        owner_cash_flows,
        kpis,
        net_debt_proceeds_at_close,
        equity_at_close,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Consolidated Debt Schedule & Levered Cash Flow",
        &serde_json::json!({
            "initial_investment": input.initial_investment.to_string(),
            "operating_periods": input.operating_periods.len(),
            "num_tranches": input.tranches.len(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::financing::tranche::{AmortizationPolicy, SeniorityClass};
    use rust_decimal_macros::dec;

    fn flat_periods(noi: Money, n: usize) -> Vec<OperatingPeriod> {
        (0..n)
            .map(|_| OperatingPeriod {
                noi,
                maintenance_capex: Decimal::ZERO,
                working_capital_change: Decimal::ZERO,
            })
            .collect()
    }

    fn senior_tranche() -> DebtTranche {
        DebtTranche {
            name: "Senior".into(),
            principal: dec!(600000),
            rate: dec!(0.05),
            policy: AmortizationPolicy::Mortgage,
            term_years: 5,
            amortization_years: None,
            start_year: 0,
            refinance_year: None,
            refinance_amount_pct: None,
            origination_fee_rate: None,
            exit_fee_rate: None,
            is_senior: None,
            seniority: None,
        }
    }

    #[test]
    fn test_no_debt_scenario() {
        let input = FinancingInput {
            initial_investment: dec!(1000000),
            operating_periods: flat_periods(dec!(80000), 5),
            tranches: vec![],
        };
        let result = analyze_financing(&input).unwrap();
        let out = &result.result;

        // Levered FCF equals unlevered FCF every period
        for p in &out.levered_fcf {
            assert_eq!(p.levered_fcf, p.unlevered_fcf);
            assert_eq!(p.debt_service, Decimal::ZERO);
        }
        // DSCR and LTV undefined everywhere
        for k in &out.kpis {
            assert!(k.dscr.is_none());
            assert!(k.senior_dscr.is_none());
            assert!(k.ltv.is_none());
        }
        // Owner CF starts at the full equity outlay
        assert_eq!(out.owner_cash_flows[0], dec!(-1000000));
        assert_eq!(out.owner_cash_flows[1], dec!(80000));
    }

    #[test]
    fn test_owner_cf_nets_debt_proceeds() {
        let mut tranche = senior_tranche();
        tranche.origination_fee_rate = Some(dec!(0.02));
        let input = FinancingInput {
            initial_investment: dec!(1000000),
            operating_periods: flat_periods(dec!(80000), 5),
            tranches: vec![tranche],
        };
        let result = analyze_financing(&input).unwrap();
        let out = &result.result;

        // Net proceeds = 600,000 - 12,000 fee
        assert_eq!(out.net_debt_proceeds_at_close, dec!(588000));
        assert_eq!(out.equity_at_close, dec!(412000));
        assert_eq!(out.owner_cash_flows[0], dec!(-412000));
        assert_eq!(out.owner_cash_flows.len(), 6);
    }

    #[test]
    fn test_levered_fcf_subtracts_debt_service() {
        let input = FinancingInput {
            initial_investment: dec!(1000000),
            operating_periods: flat_periods(dec!(80000), 5),
            tranches: vec![senior_tranche()],
        };
        let result = analyze_financing(&input).unwrap();
        let out = &result.result;

        // Year 0: interest 30,000, principal 120,000
        let p0 = &out.levered_fcf[0];
        assert_eq!(p0.interest, dec!(30000));
        assert_eq!(p0.principal, dec!(120000));
        assert_eq!(p0.debt_service, dec!(150000));
        assert_eq!(p0.levered_fcf, dec!(80000) - dec!(150000));
    }

    #[test]
    fn test_dscr_and_ltv() {
        let input = FinancingInput {
            initial_investment: dec!(1000000),
            operating_periods: flat_periods(dec!(180000), 5),
            tranches: vec![senior_tranche()],
        };
        let result = analyze_financing(&input).unwrap();
        let out = &result.result;

        // Year 0: DSCR = 180,000 / 150,000 = 1.2, LTV = 600,000 / 1,000,000
        assert_eq!(out.kpis[0].dscr, Some(dec!(1.2)));
        assert_eq!(out.kpis[0].ltv, Some(dec!(0.6)));
        // Unflagged tranche is senior: senior DSCR matches total DSCR
        assert_eq!(out.kpis[0].senior_dscr, out.kpis[0].dscr);
    }

    #[test]
    fn test_senior_dscr_dominates_with_subordinate_debt() {
        let mut mezz = senior_tranche();
        mezz.name = "Mezzanine".into();
        mezz.principal = dec!(200000);
        mezz.rate = dec!(0.12);
        mezz.policy = AmortizationPolicy::Bullet;
        mezz.seniority = Some(SeniorityClass::Mezzanine);

        let input = FinancingInput {
            initial_investment: dec!(1000000),
            operating_periods: flat_periods(dec!(250000), 5),
            tranches: vec![senior_tranche(), mezz],
        };
        let result = analyze_financing(&input).unwrap();
        let out = &result.result;

        for k in &out.kpis {
            if let (Some(senior), Some(total)) = (k.senior_dscr, k.dscr) {
                assert!(senior >= total, "year {}: {senior} < {total}", k.year);
            }
        }
    }

    #[test]
    fn test_dscr_null_on_negative_noi() {
        let mut periods = flat_periods(dec!(100000), 5);
        periods[2].noi = dec!(-5000);
        let input = FinancingInput {
            initial_investment: dec!(1000000),
            operating_periods: periods,
            tranches: vec![senior_tranche()],
        };
        let result = analyze_financing(&input).unwrap();
        let out = &result.result;

        assert!(out.kpis[2].dscr.is_none());
        assert!(out.kpis[2].senior_dscr.is_none());
        // LTV still defined while debt is outstanding
        assert!(out.kpis[2].ltv.is_some());
    }

    #[test]
    fn test_ltv_null_after_payoff() {
        let mut tranche = senior_tranche();
        tranche.term_years = 2;
        let input = FinancingInput {
            initial_investment: dec!(1000000),
            operating_periods: flat_periods(dec!(400000), 5),
            tranches: vec![tranche],
        };
        let result = analyze_financing(&input).unwrap();
        let out = &result.result;

        assert!(out.kpis[1].ltv.is_some());
        assert!(out.kpis[2].ltv.is_none());
        assert!(out.kpis[2].dscr.is_none());
    }

    #[test]
    fn test_refinance_proceeds_offset_payoff() {
        let mut retiring = senior_tranche();
        retiring.refinance_year = Some(2);
        let mut replacement = senior_tranche();
        replacement.name = "Replacement".into();
        replacement.start_year = 2;
        replacement.principal = dec!(360000);

        let input = FinancingInput {
            initial_investment: dec!(1000000),
            operating_periods: flat_periods(dec!(100000), 5),
            tranches: vec![retiring, replacement],
        };
        let result = analyze_financing(&input).unwrap();
        let out = &result.result;

        // Year 2: old tranche retires its 360,000 beginning balance, the
        // replacement draw of 360,000 comes in as proceeds
        let p2 = &out.levered_fcf[2];
        assert_eq!(p2.debt_proceeds, dec!(360000));
        assert!(p2.principal >= dec!(360000));

        // Without the proceeds offset the year would be deeply negative
        assert!(p2.levered_fcf > p2.unlevered_fcf - p2.debt_service);
    }

    #[test]
    fn test_maintenance_capex_reduces_unlevered_fcf() {
        let periods = vec![OperatingPeriod {
            noi: dec!(100000),
            maintenance_capex: dec!(15000),
            working_capital_change: dec!(5000),
        }];
        let input = FinancingInput {
            initial_investment: dec!(1000000),
            operating_periods: periods,
            tranches: vec![],
        };
        let result = analyze_financing(&input).unwrap();
        assert_eq!(result.result.levered_fcf[0].unlevered_fcf, dec!(80000));
    }

    #[test]
    fn test_invalid_investment() {
        let input = FinancingInput {
            initial_investment: Decimal::ZERO,
            operating_periods: flat_periods(dec!(100), 2),
            tranches: vec![],
        };
        assert!(analyze_financing(&input).is_err());
    }

    #[test]
    fn test_empty_projection() {
        let input = FinancingInput {
            initial_investment: dec!(1000),
            operating_periods: vec![],
            tranches: vec![],
        };
        assert!(analyze_financing(&input).is_err());
    }

    #[test]
    fn test_inert_tranche_warns() {
        let mut inert = senior_tranche();
        inert.principal = Decimal::ZERO;
        let input = FinancingInput {
            initial_investment: dec!(1000000),
            operating_periods: flat_periods(dec!(100000), 3),
            tranches: vec![inert],
        };
        let result = analyze_financing(&input).unwrap();
        assert!(result.warnings.iter().any(|w| w.contains("no-op")));
        assert_eq!(result.result.owner_cash_flows[0], dec!(-1000000));
    }
}
