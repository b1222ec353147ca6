use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{Money, Rate};

// ---------------------------------------------------------------------------
// Tranche configuration
// ---------------------------------------------------------------------------

/// Seniority class of a tranche within the capital stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeniorityClass {
    Senior,
    Mezzanine,
    Junior,
}

/// Amortization policy for a debt tranche.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AmortizationPolicy {
    /// Straight-line principal over the amortization length; the final term
    /// period repays the remaining balance (balloon when term < amortization)
    Mortgage,
    /// No principal during the IO window, then straight-line on the
    /// remaining balance over the rest of the amortization length
    InterestOnly { io_years: u32 },
    /// No principal until maturity
    Bullet,
}

/// One debt instrument within the capital stack.
///
/// Periods are annual operating periods indexed from 0. A tranche with
/// `start_year = s` is drawn at the start of period `s` and services debt
/// in periods `s ..= s + term_years - 1`, or until its refinance year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtTranche {
    pub name: String,
    pub principal: Money,
    pub rate: Rate,
    pub policy: AmortizationPolicy,
    pub term_years: u32,
    /// Amortization length in years; defaults to the term. A term shorter
    /// than the amortization length produces a balloon at term end.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amortization_years: Option<u32>,
    /// Operating period in which the tranche is drawn
    #[serde(default)]
    pub start_year: u32,
    /// Operating period in which the tranche is refinanced (full or partial)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refinance_year: Option<u32>,
    /// Fraction of the beginning balance retired at the refinance year;
    /// defaults to 1.0 (full payoff)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refinance_amount_pct: Option<Rate>,
    /// Fee rate on principal, netted from proceeds at the start year
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origination_fee_rate: Option<Rate>,
    /// Fee rate on balance retired at maturity/refinance/partial payoff
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_fee_rate: Option<Rate>,
    /// Explicit seniority flag; overrides `seniority` when present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_senior: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seniority: Option<SeniorityClass>,
}

impl DebtTranche {
    /// A tranche ranks senior when explicitly flagged, classed `Senior`,
    /// or left unflagged entirely.
    pub fn ranks_senior(&self) -> bool {
        match (self.is_senior, self.seniority) {
            (Some(flag), _) => flag,
            (None, Some(class)) => class == SeniorityClass::Senior,
            (None, None) => true,
        }
    }

    /// Effective amortization length (the term when unset or zero).
    pub fn amortization_length(&self) -> u32 {
        match self.amortization_years {
            Some(years) if years > 0 => years,
            _ => self.term_years,
        }
    }

    /// Fraction of the beginning balance retired at the refinance year.
    pub fn refinance_fraction(&self) -> Rate {
        self.refinance_amount_pct.unwrap_or(Decimal::ONE)
    }

    /// Zero-principal or zero-term tranches produce an all-zero schedule.
    pub fn is_inert(&self) -> bool {
        self.principal <= Decimal::ZERO || self.term_years == 0
    }
}

// ---------------------------------------------------------------------------
// Derived schedule
// ---------------------------------------------------------------------------

/// A single operating period in a tranche schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranchePeriod {
    pub year: u32,
    pub beginning_balance: Money,
    pub interest: Money,
    pub principal: Money,
    pub ending_balance: Money,
}

impl TranchePeriod {
    fn zero(year: u32) -> Self {
        TranchePeriod {
            year,
            beginning_balance: Decimal::ZERO,
            interest: Decimal::ZERO,
            principal: Decimal::ZERO,
            ending_balance: Decimal::ZERO,
        }
    }
}

/// Year-by-year schedule for a single tranche. `periods` covers the full
/// horizon; entries outside the tranche's active window are all zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrancheSchedule {
    pub tranche_name: String,
    pub periods: Vec<TranchePeriod>,
    pub total_interest: Money,
    pub total_principal: Money,
}

/// Build the amortization schedule for one tranche over `horizon` operating
/// periods.
///
/// Invariant: for a tranche that is never refinanced and matures within the
/// horizon, the sum of principal payments plus the final ending balance
/// equals the initial principal.
pub fn build_tranche_schedule(tranche: &DebtTranche, horizon: usize) -> TrancheSchedule {
    let mut periods: Vec<TranchePeriod> =
        (0..horizon).map(|t| TranchePeriod::zero(t as u32)).collect();

    if tranche.is_inert() {
        return TrancheSchedule {
            tranche_name: tranche.name.clone(),
            periods,
            total_interest: Decimal::ZERO,
            total_principal: Decimal::ZERO,
        };
    }

    let term = tranche.term_years;
    let amort = tranche.amortization_length();
    let io_years = match tranche.policy {
        AmortizationPolicy::InterestOnly { io_years } => io_years,
        _ => 0,
    };

    let mut balance = tranche.principal;
    // A zero-length IO window amortizes like a mortgage from period 0
    let mut annual = match tranche.policy {
        AmortizationPolicy::Mortgage | AmortizationPolicy::InterestOnly { io_years: 0 } => {
            tranche.principal / Decimal::from(amort)
        }
        _ => Decimal::ZERO,
    };

    let start = tranche.start_year as usize;
    for t in start..start + term as usize {
        if t >= horizon || balance <= Decimal::ZERO {
            break;
        }
        let k = (t - start) as u32;
        let beginning = balance;
        let interest = beginning * tranche.rate;
        let at_refinance = tranche.refinance_year == Some(t as u32);
        let final_term_period = k + 1 == term;

        let principal = if final_term_period {
            beginning
        } else if at_refinance {
            (tranche.refinance_fraction() * beginning)
                .max(Decimal::ZERO)
                .min(beginning)
        } else if k < io_years {
            Decimal::ZERO
        } else {
            annual.min(beginning)
        };

        balance = (beginning - principal).max(Decimal::ZERO);
        periods[t] = TranchePeriod {
            year: t as u32,
            beginning_balance: beginning,
            interest,
            principal,
            ending_balance: balance,
        };

        // IO window just closed: straight-line the remaining balance over
        // the rest of the amortization length
        if io_years > 0 && k + 1 == io_years {
            annual = if amort > io_years {
                balance / Decimal::from(amort - io_years)
            } else {
                Decimal::ZERO
            };
        }

        if at_refinance {
            if tranche.refinance_fraction() >= Decimal::ONE {
                break;
            }
            // Partial payoff: re-amortize the reduced balance over the
            // remaining amortization periods
            if k + 1 >= io_years {
                let remaining = amort.saturating_sub(k + 1);
                annual = if remaining > 0 {
                    balance / Decimal::from(remaining)
                } else {
                    Decimal::ZERO
                };
            }
        }
    }

    let total_interest = periods.iter().map(|p| p.interest).sum();
    let total_principal = periods.iter().map(|p| p.principal).sum();

    TrancheSchedule {
        tranche_name: tranche.name.clone(),
        periods,
        total_interest,
        total_principal,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn mortgage_tranche() -> DebtTranche {
        DebtTranche {
            name: "Senior Mortgage".into(),
            principal: dec!(60000),
            rate: dec!(0.10),
            policy: AmortizationPolicy::Mortgage,
            term_years: 3,
            amortization_years: Some(5),
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
    fn test_balloon_schedule() {
        // term=3, amortization=5: 12,000/yr then 36,000 balloon
        let sched = build_tranche_schedule(&mortgage_tranche(), 5);
        assert_eq!(sched.periods.len(), 5);

        assert_eq!(sched.periods[0].principal, dec!(12000));
        assert_eq!(sched.periods[0].interest, dec!(6000));
        assert_eq!(sched.periods[1].principal, dec!(12000));
        assert_eq!(sched.periods[1].ending_balance, dec!(36000));

        // Balloon repays the remaining balance at term end
        assert_eq!(sched.periods[2].principal, dec!(36000));
        assert_eq!(sched.periods[2].ending_balance, Decimal::ZERO);

        // All-zero after maturity
        for p in &sched.periods[3..] {
            assert_eq!(p.beginning_balance, Decimal::ZERO);
            assert_eq!(p.interest, Decimal::ZERO);
            assert_eq!(p.principal, Decimal::ZERO);
        }

        assert_eq!(sched.total_principal, dec!(60000));
    }

    #[test]
    fn test_fully_amortizing_mortgage() {
        let mut tranche = mortgage_tranche();
        tranche.term_years = 5;
        let sched = build_tranche_schedule(&tranche, 6);

        for p in &sched.periods[..4] {
            assert_eq!(p.principal, dec!(12000));
        }
        // Final period repays the remainder exactly
        assert_eq!(sched.periods[4].principal, dec!(12000));
        assert_eq!(sched.periods[4].ending_balance, Decimal::ZERO);
        assert_eq!(sched.total_principal, dec!(60000));
    }

    #[test]
    fn test_principal_conservation_with_uneven_division() {
        let mut tranche = mortgage_tranche();
        tranche.principal = dec!(100000);
        tranche.term_years = 7;
        tranche.amortization_years = Some(7);
        let sched = build_tranche_schedule(&tranche, 7);

        let last = &sched.periods[6];
        let paid: Decimal = sched.periods.iter().map(|p| p.principal).sum();
        assert!((paid + last.ending_balance - dec!(100000)).abs() <= Decimal::ONE);
        assert_eq!(last.ending_balance, Decimal::ZERO);
    }

    #[test]
    fn test_bullet_schedule() {
        let mut tranche = mortgage_tranche();
        tranche.policy = AmortizationPolicy::Bullet;
        tranche.term_years = 4;
        tranche.amortization_years = None;
        let sched = build_tranche_schedule(&tranche, 5);

        for p in &sched.periods[..3] {
            assert_eq!(p.principal, Decimal::ZERO);
            assert_eq!(p.interest, dec!(6000));
        }
        assert_eq!(sched.periods[3].principal, dec!(60000));
        assert_eq!(sched.periods[3].ending_balance, Decimal::ZERO);
    }

    #[test]
    fn test_interest_only_window() {
        // 2 IO years, then straight-line over the remaining 3 amortization
        // years with forced payoff at term end (term 4 < amortization 5)
        let mut tranche = mortgage_tranche();
        tranche.policy = AmortizationPolicy::InterestOnly { io_years: 2 };
        tranche.term_years = 4;
        tranche.amortization_years = Some(5);
        let sched = build_tranche_schedule(&tranche, 5);

        assert_eq!(sched.periods[0].principal, Decimal::ZERO);
        assert_eq!(sched.periods[1].principal, Decimal::ZERO);
        // 60,000 / (5 - 2) = 20,000
        assert_eq!(sched.periods[2].principal, dec!(20000));
        // Final term period repays the remaining 40,000
        assert_eq!(sched.periods[3].principal, dec!(40000));
        assert_eq!(sched.periods[3].ending_balance, Decimal::ZERO);
    }

    #[test]
    fn test_zero_io_window_amortizes_immediately() {
        let mut tranche = mortgage_tranche();
        tranche.policy = AmortizationPolicy::InterestOnly { io_years: 0 };
        tranche.term_years = 5;
        let sched = build_tranche_schedule(&tranche, 5);

        assert_eq!(sched.periods[0].principal, dec!(12000));
        assert_eq!(sched.periods[4].ending_balance, Decimal::ZERO);
    }

    #[test]
    fn test_full_refinance_payoff() {
        let mut tranche = mortgage_tranche();
        tranche.term_years = 5;
        tranche.refinance_year = Some(2);
        let sched = build_tranche_schedule(&tranche, 5);

        // Two straight-line years, then the full beginning balance retires
        assert_eq!(sched.periods[0].principal, dec!(12000));
        assert_eq!(sched.periods[1].principal, dec!(12000));
        assert_eq!(sched.periods[2].beginning_balance, dec!(36000));
        assert_eq!(sched.periods[2].principal, dec!(36000));
        assert_eq!(sched.periods[2].ending_balance, Decimal::ZERO);
        for p in &sched.periods[3..] {
            assert_eq!(p.interest, Decimal::ZERO);
            assert_eq!(p.principal, Decimal::ZERO);
        }
    }

    #[test]
    fn test_partial_refinance_continues_amortizing() {
        let mut tranche = mortgage_tranche();
        tranche.term_years = 5;
        tranche.refinance_year = Some(2);
        tranche.refinance_amount_pct = Some(dec!(0.5));
        let sched = build_tranche_schedule(&tranche, 5);

        // Year 2: retire 50% of the 36,000 beginning balance
        assert_eq!(sched.periods[2].principal, dec!(18000));
        assert_eq!(sched.periods[2].ending_balance, dec!(18000));
        // Re-amortized: 18,000 over remaining 2 periods = 9,000/yr
        assert_eq!(sched.periods[3].principal, dec!(9000));
        // Final term period repays the remainder
        assert_eq!(sched.periods[4].principal, dec!(9000));
        assert_eq!(sched.periods[4].ending_balance, Decimal::ZERO);
    }

    #[test]
    fn test_late_start_year() {
        let mut tranche = mortgage_tranche();
        tranche.start_year = 2;
        tranche.term_years = 3;
        let sched = build_tranche_schedule(&tranche, 6);

        assert_eq!(sched.periods[0].beginning_balance, Decimal::ZERO);
        assert_eq!(sched.periods[1].beginning_balance, Decimal::ZERO);
        assert_eq!(sched.periods[2].beginning_balance, dec!(60000));
        assert_eq!(sched.periods[2].principal, dec!(12000));
        assert_eq!(sched.periods[4].principal, dec!(36000));
        assert_eq!(sched.periods[5].beginning_balance, Decimal::ZERO);
    }

    #[test]
    fn test_zero_principal_is_inert() {
        let mut tranche = mortgage_tranche();
        tranche.principal = Decimal::ZERO;
        let sched = build_tranche_schedule(&tranche, 5);
        assert!(sched.periods.iter().all(|p| p.interest.is_zero()
            && p.principal.is_zero()
            && p.beginning_balance.is_zero()));
        assert_eq!(sched.total_principal, Decimal::ZERO);
    }

    #[test]
    fn test_zero_term_is_inert() {
        let mut tranche = mortgage_tranche();
        tranche.term_years = 0;
        let sched = build_tranche_schedule(&tranche, 5);
        assert!(sched.periods.iter().all(|p| p.principal.is_zero()));
    }

    #[test]
    fn test_maturity_beyond_horizon() {
        let mut tranche = mortgage_tranche();
        tranche.term_years = 10;
        tranche.amortization_years = Some(10);
        let sched = build_tranche_schedule(&tranche, 4);
        assert_eq!(sched.periods.len(), 4);
        // 6,000/yr straight line, never reaches the balloon
        assert_eq!(sched.periods[3].principal, dec!(6000));
        assert_eq!(sched.periods[3].ending_balance, dec!(36000));
    }

    #[test]
    fn test_seniority_defaults() {
        let tranche = mortgage_tranche();
        assert!(tranche.ranks_senior());

        let mut mezz = mortgage_tranche();
        mezz.seniority = Some(SeniorityClass::Mezzanine);
        assert!(!mezz.ranks_senior());

        let mut flagged = mortgage_tranche();
        flagged.seniority = Some(SeniorityClass::Junior);
        flagged.is_senior = Some(true);
        assert!(flagged.ranks_senior());
    }
}
