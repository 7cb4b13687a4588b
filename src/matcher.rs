//! Budget eligibility filtering
//!
//! Constraint patterns use the SQL `LIKE` wildcard `%`, but only in the leading
//! and/or trailing position. Anything else is rejected rather than interpreted.
use super::budget::{ActivityConstraint, BudgetRow, BudgetType};
use super::error::PatternError;

const WILDCARD: char = '%';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LikePattern {
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl LikePattern {
    pub fn parse(pattern: &str) -> Result<Self, PatternError> {
        let leading = pattern.starts_with(WILDCARD);
        let body = pattern.strip_prefix(WILDCARD).unwrap_or(pattern);
        let trailing = body.ends_with(WILDCARD);
        let body = body.strip_suffix(WILDCARD).unwrap_or(body);

        if body.contains(WILDCARD) {
            return Err(PatternError::MisplacedWildcard(pattern.to_string()));
        }

        let body = body.to_string();
        Ok(match (leading, trailing) {
            (false, false) => LikePattern::Exact(body),
            (false, true) => LikePattern::Prefix(body),
            (true, false) => LikePattern::Suffix(body),
            (true, true) => LikePattern::Contains(body),
        })
    }

    pub fn matches(&self, code: &str) -> bool {
        match self {
            LikePattern::Exact(s) => code == s,
            LikePattern::Prefix(s) => code.starts_with(s.as_str()),
            LikePattern::Suffix(s) => code.ends_with(s.as_str()),
            LikePattern::Contains(s) => code.contains(s.as_str()),
        }
    }
}

/// The compiled form of an [`ActivityConstraint`] plus the caller's free-text search.
#[derive(Debug, Clone, Default)]
pub struct BudgetFilter<'a> {
    pattern: Option<LikePattern>,
    allowed: &'a [BudgetType],
    search: Option<String>,
}

impl<'a> BudgetFilter<'a> {
    pub fn new(
        constraint: Option<&'a ActivityConstraint>,
        search: Option<&str>,
    ) -> Result<Self, PatternError> {
        let pattern = constraint
            .and_then(|c| c.budget_code_pattern.as_deref())
            .filter(|p| !p.trim().is_empty())
            .map(|p| LikePattern::parse(p.trim()))
            .transpose()?;
        let allowed = constraint
            .map(|c| c.allowed_budget_types.as_slice())
            .unwrap_or(&[]);
        let search = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        Ok(Self {
            pattern,
            allowed,
            search,
        })
    }

    pub fn accepts(&self, row: &BudgetRow) -> bool {
        self.type_allowed(row) && self.code_matches(row) && self.search_matches(row)
    }

    fn type_allowed(&self, row: &BudgetRow) -> bool {
        if self.allowed.is_empty() {
            return true;
        }
        match row.budget_type {
            Some(t) => self.allowed.contains(&t),
            // trust the server: rows of unknown type stay visible
            None => true,
        }
    }

    fn code_matches(&self, row: &BudgetRow) -> bool {
        self.pattern.as_ref().is_none_or(|p| p.matches(&row.code))
    }

    fn search_matches(&self, row: &BudgetRow) -> bool {
        self.search.as_deref().is_none_or(|needle| {
            row.code.to_lowercase().contains(needle)
                || row.description.to_lowercase().contains(needle)
        })
    }
}

/// Returns the rows the constraint and search term both admit, preserving order.
pub fn filter_budgets(
    rows: &[BudgetRow],
    constraint: Option<&ActivityConstraint>,
    search: Option<&str>,
) -> Result<Vec<BudgetRow>, PatternError> {
    let filter = BudgetFilter::new(constraint, search)?;
    Ok(rows.iter().filter(|row| filter.accepts(row)).cloned().collect())
}
