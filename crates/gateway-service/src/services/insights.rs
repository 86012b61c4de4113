//! Spending insights and product recommendations.
//!
//! Pure functions of a transaction summary: no I/O, same summary in, same
//! output out.

use crate::models::{Insight, Recommendation};
use serde::Deserialize;

/// Installment share of spending at or above which usage counts as high.
pub const HIGH_INSTALLMENT_RATIO: f64 = 0.30;

/// Category reported when the summary has no top category.
pub const FALLBACK_CATEGORY: &str = "Other";

/// Categories where a rewards card pays off.
const REWARDS_CATEGORIES: &[&str] = &["Travel", "Shopping"];

/// The fields of a transaction summary the heuristics read.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SpendSummary {
    /// Absent and `null` both mean no categories.
    #[serde(default)]
    top_categories: Option<Vec<CategorySpend>>,

    #[serde(default)]
    installment_ratio: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
struct CategorySpend {
    category: String,
}

impl SpendSummary {
    /// Read the summary out of a downstream payload.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error if the payload is not an object
    /// of the expected shape.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// Highest-spend category, or `Other`.
    pub fn top_category(&self) -> &str {
        self.top_categories
            .as_deref()
            .and_then(<[CategorySpend]>::first)
            .map_or(FALLBACK_CATEGORY, |c| c.category.as_str())
    }

    /// Installment share of spending; missing means none.
    pub fn installment_ratio(&self) -> f64 {
        self.installment_ratio.unwrap_or(0.0)
    }

    fn high_installment_usage(&self) -> bool {
        self.installment_ratio() >= HIGH_INSTALLMENT_RATIO
    }
}

/// Whole-number percentage, e.g. `0.3` -> `30%`.
fn percent(ratio: f64) -> String {
    format!("{:.0}%", ratio * 100.0)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

/// Derive insights from a summary over `window_days`.
pub fn derive_insights(summary: &SpendSummary, window_days: u32) -> Vec<Insight> {
    let top_category = summary.top_category();
    let ratio = percent(summary.installment_ratio());

    let concentration = Insight {
        level: "high".to_string(),
        title: "Spend concentration detected".to_string(),
        description: format!(
            "Your spend is concentrated in **{top_category}** over the last {window_days} days."
        ),
        impact: "Consider setting a category budget and choosing the best rewards product for that category.".to_string(),
        why: strings(&[
            "Top category spend is dominant",
            "Pattern consistent across recent transactions",
        ]),
    };

    let installments = if summary.high_installment_usage() {
        Insight {
            level: "warning".to_string(),
            title: "High installment usage".to_string(),
            description: format!("Installment ratio is **{ratio}** of your spending."),
            impact: "Keep installment ratio under 30–35% to maintain healthy cashflow.".to_string(),
            why: strings(&[
                "Multiple transactions flagged as installment",
                "Installment share exceeds threshold",
            ]),
        }
    } else {
        Insight {
            level: "stable".to_string(),
            title: "Installment usage is under control".to_string(),
            description: format!("Installment ratio is **{ratio}** of your spending."),
            impact: "You have flexibility to automate savings or invest periodically.".to_string(),
            why: strings(&["Installment share below threshold"]),
        }
    };

    vec![concentration, installments]
}

/// Derive product recommendations from a summary.
pub fn derive_recommendations(summary: &SpendSummary) -> Vec<Recommendation> {
    let top_category = summary.top_category();
    let mut recommendations = Vec::with_capacity(3);

    if REWARDS_CATEGORIES.contains(&top_category) {
        recommendations.push(Recommendation {
            product: "Rewards Credit Card".to_string(),
            kind: "credit_card".to_string(),
            match_score: 0.86,
            why: vec![
                format!("High spend in {top_category}"),
                "Better points/cashback multipliers".to_string(),
            ],
            explanation: "This card maximizes rewards on your highest spend category.".to_string(),
        });
    }

    recommendations.push(Recommendation {
        product: "Smart Saver Plan".to_string(),
        kind: "saving".to_string(),
        match_score: 0.75,
        why: strings(&["Stable transaction frequency", "Helps automate saving habit"]),
        explanation: "Automated saving works well when cashflow is predictable.".to_string(),
    });

    if summary.high_installment_usage() {
        recommendations.push(Recommendation {
            product: "Debt Consolidation (Optional)".to_string(),
            kind: "loan".to_string(),
            match_score: 0.62,
            why: strings(&["Installment ratio is high", "May lower total repayment cost"]),
            explanation: "Consolidation can reduce stress and improve monthly predictability."
                .to_string(),
        });
    }

    recommendations
}
