//! Equity-side analysis: the tiered distribution waterfall, clawback
//! true-ups, and per-participant performance.

pub mod clawback;
pub mod engine;
pub mod returns;
pub mod tiers;

pub use engine::{
    run_waterfall, TierAllocation, WaterfallInput, WaterfallOutput, WaterfallPeriodResult,
};
pub use returns::{calculate_partner_returns, PartnerResult, PartnerReturnsInput};
pub use tiers::{
    CatchUp, Clawback, ClawbackMethod, ClawbackTrigger, EquityClass, PreferredAccrual,
    WaterfallTier, WaterfallTierKind,
};
