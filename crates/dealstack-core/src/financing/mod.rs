//! Debt-side analysis: tranche amortization, consolidated schedules,
//! transaction costs, levered cash flow, and coverage KPIs.

pub mod levered;
pub mod schedule;
pub mod tranche;

pub use levered::{
    analyze_financing, DebtKpiPeriod, FinancingInput, FinancingOutput, LeveredFcfPeriod,
    OperatingPeriod,
};
pub use schedule::{
    aggregate_debt, allocate_transaction_costs, AggregateDebtPeriod, DebtTotals,
    TransactionCostSchedule,
};
pub use tranche::{
    build_tranche_schedule, AmortizationPolicy, DebtTranche, SeniorityClass, TranchePeriod,
    TrancheSchedule,
};
