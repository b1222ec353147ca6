use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::DealStackError;
use crate::types::{with_metadata, CashFlow, ComputationOutput, Money, Multiple, Rate};
use crate::DealStackResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input for a standalone partner performance calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerReturnsInput {
    pub class_id: String,
    /// Periodic cash flows (negative contributions, positive distributions)
    pub cash_flows: Vec<Money>,
    /// Dated cash flows for XIRR
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dated_cash_flows: Option<Vec<CashFlow>>,
}

/// Realized performance of one equity participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerResult {
    pub class_id: String,
    pub cash_flows: Vec<Money>,
    pub cumulative_cash_flows: Vec<Money>,
    pub total_contributed: Money,
    pub total_distributed: Money,
    /// Periodic IRR; undefined when the series has no sign change or the
    /// root search does not converge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub irr: Option<Rate>,
    /// Date-based IRR when dated flows are supplied
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xirr: Option<Rate>,
    /// Total distributions over total contributions; 0 when no capital was
    /// ever at risk
    pub moic: Multiple,
}

// ---------------------------------------------------------------------------
// Calculation
// ---------------------------------------------------------------------------

/// Build the performance summary for one participant's cash-flow series.
pub(crate) fn partner_result(
    class_id: &str,
    cash_flows: &[Money],
    dated_cash_flows: Option<&[CashFlow]>,
    warnings: &mut Vec<String>,
) -> PartnerResult {
    let mut cumulative_cash_flows = Vec::with_capacity(cash_flows.len());
    let mut running = Decimal::ZERO;
    for cf in cash_flows {
        running += *cf;
        cumulative_cash_flows.push(running);
    }

    let total_contributed: Money = cash_flows
        .iter()
        .filter(|cf| cf.is_sign_negative())
        .map(|cf| cf.abs())
        .sum();
    let total_distributed: Money = cash_flows
        .iter()
        .filter(|cf| **cf > Decimal::ZERO)
        .copied()
        .sum();

    let moic = if total_contributed.is_zero() {
        Decimal::ZERO
    } else {
        total_distributed / total_contributed
    };

    let has_sign_change = cash_flows.iter().any(|cf| *cf < Decimal::ZERO)
        && cash_flows.iter().any(|cf| *cf > Decimal::ZERO);
    let irr = if cash_flows.len() >= 2 && has_sign_change {
        match crate::time_value::irr(cash_flows, dec!(0.10)) {
            Ok(rate) => Some(rate),
            Err(e) => {
                warnings.push(format!("IRR for class '{class_id}': {e}"));
                None
            }
        }
    } else {
        None
    };

    let xirr = dated_cash_flows.and_then(|dated| {
        if dated.len() < 2 {
            warnings.push(format!(
                "XIRR for class '{class_id}' requires at least 2 dated cash flows"
            ));
            return None;
        }
        let flows: Vec<(NaiveDate, Money)> = dated.iter().map(|cf| (cf.date, cf.amount)).collect();
        match crate::time_value::xirr(&flows, dec!(0.10)) {
            Ok(rate) => Some(rate),
            Err(e) => {
                warnings.push(format!("XIRR for class '{class_id}': {e}"));
                None
            }
        }
    });

    PartnerResult {
        class_id: class_id.to_string(),
        cash_flows: cash_flows.to_vec(),
        cumulative_cash_flows,
        total_contributed,
        total_distributed,
        irr,
        xirr,
        moic,
    }
}

/// Calculate partner performance (IRR, XIRR, MOIC) from a realized
/// cash-flow series.
pub fn calculate_partner_returns(
    input: &PartnerReturnsInput,
) -> DealStackResult<ComputationOutput<PartnerResult>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.cash_flows.is_empty() && input.dated_cash_flows.is_none() {
        return Err(DealStackError::InsufficientData(
            "Partner returns require at least one cash-flow series".into(),
        ));
    }

    let output = partner_result(
        &input.class_id,
        &input.cash_flows,
        input.dated_cash_flows.as_deref(),
        &mut warnings,
    );

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Partner Performance: IRR, XIRR, MOIC",
        &serde_json::json!({
            "class_id": input.class_id,
            "num_flows": input.cash_flows.len(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
