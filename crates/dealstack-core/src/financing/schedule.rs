use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::financing::tranche::{DebtTranche, TrancheSchedule};
use crate::types::Money;

// ---------------------------------------------------------------------------
// Consolidated schedule
// ---------------------------------------------------------------------------

/// Summed balances and flows for one operating period.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DebtTotals {
    pub beginning_balance: Money,
    pub interest: Money,
    pub principal: Money,
    pub ending_balance: Money,
}

impl DebtTotals {
    fn add(&mut self, beginning: Money, interest: Money, principal: Money, ending: Money) {
        self.beginning_balance += beginning;
        self.interest += interest;
        self.principal += principal;
        self.ending_balance += ending;
    }
}

/// One operating period of the consolidated debt schedule: the sum across
/// all active tranches, plus a senior-only sub-aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateDebtPeriod {
    pub year: u32,
    pub total: DebtTotals,
    pub senior: DebtTotals,
}

/// Sum per-tranche schedules into one consolidated schedule per period.
///
/// `tranches` and `schedules` are parallel slices; a tranche contributes to
/// the senior sub-aggregate per [`DebtTranche::ranks_senior`].
pub fn aggregate_debt(
    tranches: &[DebtTranche],
    schedules: &[TrancheSchedule],
    horizon: usize,
) -> Vec<AggregateDebtPeriod> {
    let mut aggregate: Vec<AggregateDebtPeriod> = (0..horizon)
        .map(|t| AggregateDebtPeriod {
            year: t as u32,
            total: DebtTotals::default(),
            senior: DebtTotals::default(),
        })
        .collect();

    for (tranche, schedule) in tranches.iter().zip(schedules.iter()) {
        let senior = tranche.ranks_senior();
        for (t, period) in schedule.periods.iter().take(horizon).enumerate() {
            aggregate[t].total.add(
                period.beginning_balance,
                period.interest,
                period.principal,
                period.ending_balance,
            );
            if senior {
                aggregate[t].senior.add(
                    period.beginning_balance,
                    period.interest,
                    period.principal,
                    period.ending_balance,
                );
            }
        }
    }

    aggregate
}

// ---------------------------------------------------------------------------
// Transaction costs
// ---------------------------------------------------------------------------

/// Per-period origination and exit fees plus net debt proceeds.
///
/// Origination fees are netted from proceeds in the tranche's start year;
/// exit fees fall due in the period of maturity, refinance, or partial
/// payoff, computed on the balance retired at that event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionCostSchedule {
    pub origination_fees: Vec<Money>,
    pub exit_fees: Vec<Money>,
    pub senior_exit_fees: Vec<Money>,
    /// Net proceeds (principal − origination fee) recognized per period at
    /// each tranche's start year
    pub net_proceeds: Vec<Money>,
    pub total_origination_fees: Money,
    pub total_exit_fees: Money,
}

/// Allocate origination and exit fees across the horizon.
pub fn allocate_transaction_costs(
    tranches: &[DebtTranche],
    schedules: &[TrancheSchedule],
    horizon: usize,
) -> TransactionCostSchedule {
    let mut origination_fees = vec![Decimal::ZERO; horizon];
    let mut exit_fees = vec![Decimal::ZERO; horizon];
    let mut senior_exit_fees = vec![Decimal::ZERO; horizon];
    let mut net_proceeds = vec![Decimal::ZERO; horizon];

    for (tranche, schedule) in tranches.iter().zip(schedules.iter()) {
        if tranche.is_inert() {
            continue;
        }
        let start = tranche.start_year as usize;
        if start >= horizon {
            continue;
        }

        let origination = tranche
            .origination_fee_rate
            .map(|rate| rate * tranche.principal)
            .unwrap_or(Decimal::ZERO);
        origination_fees[start] += origination;
        net_proceeds[start] += tranche.principal - origination;

        let exit_rate = match tranche.exit_fee_rate {
            Some(rate) => rate,
            None => continue,
        };
        let senior = tranche.ranks_senior();
        let maturity = start + tranche.term_years as usize - 1;

        // Refinance event (full or partial payoff)
        if let Some(refi) = tranche.refinance_year {
            let refi = refi as usize;
            if refi < horizon && refi != maturity {
                let retired = schedule.periods[refi].principal;
                if retired > Decimal::ZERO {
                    let fee = exit_rate * retired;
                    exit_fees[refi] += fee;
                    if senior {
                        senior_exit_fees[refi] += fee;
                    }
                }
            }
        }

        // Natural maturity: fee on the balance retired in the final term
        // period (the balloon or final scheduled payment)
        if maturity < horizon {
            let retired = schedule.periods[maturity].principal;
            if retired > Decimal::ZERO {
                let fee = exit_rate * retired;
                exit_fees[maturity] += fee;
                if senior {
                    senior_exit_fees[maturity] += fee;
                }
            }
        }
    }

    let total_origination_fees = origination_fees.iter().copied().sum();
    let total_exit_fees = exit_fees.iter().copied().sum();

    TransactionCostSchedule {
        origination_fees,
        exit_fees,
        senior_exit_fees,
        net_proceeds,
        total_origination_fees,
        total_exit_fees,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
