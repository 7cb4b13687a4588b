//! Budget rows as snapshotted from the ledger, and per-activity constraints
use super::error::{EngineError, ValidationError};
use serde::{Deserialize, Deserializer, Serialize};
use std::str::FromStr;

/// Below this share of the allocation remaining, a row displays as `LOW`.
pub const DEFAULT_LOW_THRESHOLD_PERCENT: u8 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetType {
    Expense,
    Capital,
}

impl FromStr for BudgetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "expense" => Ok(BudgetType::Expense),
            "capital" => Ok(BudgetType::Capital),
            other => Err(format!("unknown budget type '{other}'")),
        }
    }
}

impl std::fmt::Display for BudgetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BudgetType::Expense => f.write_str("expense"),
            BudgetType::Capital => f.write_str("capital"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BudgetStatus {
    Available,
    Low,
    Exhausted,
}

impl BudgetStatus {
    pub fn classify(allocated: u64, remaining: u64, low_threshold_percent: u8) -> Self {
        if remaining == 0 {
            return BudgetStatus::Exhausted;
        }
        // widen before multiplying so large allocations cannot overflow
        let remaining_share = remaining as u128 * 100;
        if remaining_share < allocated as u128 * low_threshold_percent as u128 {
            BudgetStatus::Low
        } else {
            BudgetStatus::Available
        }
    }
}

/// A read-only snapshot of one budget line. Amounts are in minor currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetRow {
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub allocated: u64,
    pub remaining: u64,
    // unknown types from the ledger are kept as `None`, never dropped
    #[serde(rename = "type", default, deserialize_with = "lenient_budget_type")]
    pub budget_type: Option<BudgetType>,
}

fn lenient_budget_type<'de, D>(deserializer: D) -> Result<Option<BudgetType>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.parse().ok()))
}

impl BudgetRow {
    pub fn new(
        id: impl Into<String>,
        code: impl Into<String>,
        description: impl Into<String>,
        allocated: u64,
        remaining: u64,
        budget_type: Option<BudgetType>,
    ) -> Result<Self, EngineError> {
        let row = Self {
            id: id.into(),
            code: code.into(),
            description: description.into(),
            allocated,
            remaining,
            budget_type,
        };
        row.validate()?;
        Ok(row)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.remaining > self.allocated {
            return Err(ValidationError::RemainingExceedsAllocated {
                id: self.id.clone(),
                allocated: self.allocated,
                remaining: self.remaining,
            }
            .into());
        }
        Ok(())
    }

    pub fn utilization_percent(&self) -> f64 {
        if self.allocated == 0 {
            return 0.0;
        }
        let spent = self.allocated.saturating_sub(self.remaining);
        spent as f64 / self.allocated as f64 * 100.0
    }

    pub fn status(&self, low_threshold_percent: u8) -> BudgetStatus {
        BudgetStatus::classify(self.allocated, self.remaining, low_threshold_percent)
    }
}

/// Restrictions attached to the activity a user selected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityConstraint {
    #[serde(default)]
    pub budget_code_pattern: Option<String>,
    #[serde(default)]
    pub allowed_budget_types: Vec<BudgetType>,
}

impl ActivityConstraint {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.budget_code_pattern = Some(pattern.into());
        self
    }
    pub fn allow_type(mut self, budget_type: BudgetType) -> Self {
        if !self.allowed_budget_types.contains(&budget_type) {
            self.allowed_budget_types.push(budget_type);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remaining_above_allocation_is_rejected() {
        let err = BudgetRow::new("b1", "11020401", "", 100, 101, None).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::RemainingExceedsAllocated { .. })
        ));
    }

    #[test]
    fn status_is_derived_from_remaining_share() {
        assert_eq!(BudgetStatus::classify(1_000, 0, 20), BudgetStatus::Exhausted);
        assert_eq!(BudgetStatus::classify(1_000, 199, 20), BudgetStatus::Low);
        assert_eq!(BudgetStatus::classify(1_000, 200, 20), BudgetStatus::Available);
        assert_eq!(BudgetStatus::classify(0, 0, 20), BudgetStatus::Exhausted);
    }

    #[test]
    fn utilization_reflects_spent_share() {
        let row = BudgetRow::new("b1", "11020401", "Roads", 400, 100, None).unwrap();
        assert!((row.utilization_percent() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_type_deserializes_as_none() {
        let rows: Vec<BudgetRow> = serde_json::from_str(
            r#"[
                {"id":"1","code":"11020401","allocated":10,"remaining":5,"type":"expense"},
                {"id":"2","code":"21030001","allocated":10,"remaining":5,"type":"grant"},
                {"id":"3","code":"31000000","allocated":10,"remaining":5}
            ]"#,
        )
        .unwrap();

        assert_eq!(rows[0].budget_type, Some(BudgetType::Expense));
        assert_eq!(rows[1].budget_type, None);
        assert_eq!(rows[2].budget_type, None);
    }
}
