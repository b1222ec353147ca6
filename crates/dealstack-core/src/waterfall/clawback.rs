use rust_decimal::Decimal;

use crate::types::Money;
use crate::waterfall::engine::{run_engine, NormalizedClass, ParticipantState};
use crate::waterfall::tiers::WaterfallTier;

/// True-up deltas per participant against a hypothetical full liquidation
/// at the evaluation point.
///
/// The hypothetical series keeps every capital call in place and delivers
/// all distributions to date as one liquidating distribution at the end
/// (appended as an extra period when the evaluation period is itself a
/// capital call). Both runs distribute the same total, so the deltas sum
/// to zero and the per-period allocation invariant survives the true-up.
pub(crate) fn hypothetical_liquidation_deltas(
    classes: &[NormalizedClass],
    tiers: &[WaterfallTier],
    history: &[Money],
    states: &[ParticipantState],
) -> Vec<Money> {
    let mut synthetic: Vec<Money> = history
        .iter()
        .map(|&cf| if cf < Decimal::ZERO { cf } else { Decimal::ZERO })
        .collect();
    let lump: Money = history
        .iter()
        .filter(|&&cf| cf > Decimal::ZERO)
        .copied()
        .sum();

    match history.last() {
        Some(&cf) if cf >= Decimal::ZERO => {
            if let Some(last) = synthetic.last_mut() {
                *last += lump;
            }
        }
        _ => synthetic.push(lump),
    }

    let (_, hypothetical) = run_engine(classes, tiers, &synthetic, false);

    states
        .iter()
        .zip(hypothetical.iter())
        .map(|(actual, hypo)| hypo.distributed - actual.distributed)
        .collect()
}
