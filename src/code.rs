//! Composite transaction code synthesis
//!
//! A code is eleven fixed-width segments joined by `-`:
//!
//! ```text
//! zone(2)-department(2)-section(3)-budgetCode(8)-costCenter(3)-continuousAction(2)-
//! specialActivity(3)-beneficiaryHash(6)-financialEvent(3)-fiscalYear(4)-sequence(3)
//! ```
//!
//! [`preview_code`] is pure and renders unchosen segments as `?`. Its output is a
//! [`CodePreview`], which has no conversion into a [`UniqueCode`]. Only
//! [`finalize_code`] produces a `UniqueCode`, and it allocates a fresh sequence
//! number on every call.
use super::error::{EngineError, ValidationError};
use super::sequence::{SequenceAllocator, SequenceScope};

pub const DELIMITER: char = '-';
pub const PLACEHOLDER: char = '?';
pub const SEGMENT_COUNT: usize = 11;
/// Sum of all segment widths plus the ten delimiters.
pub const CODE_LENGTH: usize = 49;
pub const MIN_FISCAL_YEAR: u16 = 1000;
pub const MAX_FISCAL_YEAR: u16 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segment {
    Zone,
    Department,
    Section,
    BudgetCode,
    CostCenter,
    ContinuousAction,
    SpecialActivity,
    BeneficiaryHash,
    FinancialEvent,
    FiscalYear,
    Sequence,
}

impl Segment {
    pub const ALL: [Segment; SEGMENT_COUNT] = [
        Segment::Zone,
        Segment::Department,
        Segment::Section,
        Segment::BudgetCode,
        Segment::CostCenter,
        Segment::ContinuousAction,
        Segment::SpecialActivity,
        Segment::BeneficiaryHash,
        Segment::FinancialEvent,
        Segment::FiscalYear,
        Segment::Sequence,
    ];

    pub fn width(self) -> usize {
        match self {
            Segment::Zone => 2,
            Segment::Department => 2,
            Segment::Section => 3,
            Segment::BudgetCode => 8,
            Segment::CostCenter => 3,
            Segment::ContinuousAction => 2,
            Segment::SpecialActivity => 3,
            Segment::BeneficiaryHash => 6,
            Segment::FinancialEvent => 3,
            Segment::FiscalYear => 4,
            Segment::Sequence => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Segment::Zone => "zone",
            Segment::Department => "department",
            Segment::Section => "section",
            Segment::BudgetCode => "budgetCode",
            Segment::CostCenter => "costCenter",
            Segment::ContinuousAction => "continuousAction",
            Segment::SpecialActivity => "specialActivity",
            Segment::BeneficiaryHash => "beneficiaryHash",
            Segment::FinancialEvent => "financialEvent",
            Segment::FiscalYear => "fiscalYear",
            Segment::Sequence => "sequence",
        }
    }

    fn placeholder(self) -> String {
        PLACEHOLDER.to_string().repeat(self.width())
    }
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw segment sources as the user has chosen them so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeInputs {
    pub zone: Option<String>,
    pub department: Option<String>,
    pub section: Option<String>,
    pub budget_code: Option<String>,
    pub cost_center: Option<String>,
    pub continuous_action: Option<String>,
    pub special_activity: Option<String>,
    pub beneficiary_name: Option<String>,
    pub financial_event: Option<String>,
    pub fiscal_year: Option<u16>,
}

impl CodeInputs {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }
    pub fn set_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }
    pub fn set_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }
    pub fn set_budget_code(mut self, code: impl Into<String>) -> Self {
        self.budget_code = Some(code.into());
        self
    }
    pub fn set_cost_center(mut self, code: impl Into<String>) -> Self {
        self.cost_center = Some(code.into());
        self
    }
    pub fn set_continuous_action(mut self, code: impl Into<String>) -> Self {
        self.continuous_action = Some(code.into());
        self
    }
    pub fn set_special_activity(mut self, code: impl Into<String>) -> Self {
        self.special_activity = Some(code.into());
        self
    }
    pub fn set_beneficiary_name(mut self, name: impl Into<String>) -> Self {
        self.beneficiary_name = Some(name.into());
        self
    }
    pub fn set_financial_event(mut self, code: impl Into<String>) -> Self {
        self.financial_event = Some(code.into());
        self
    }
    pub fn set_fiscal_year(mut self, year: u16) -> Self {
        self.fiscal_year = Some(year);
        self
    }

    fn source(&self, segment: Segment) -> Option<&str> {
        match segment {
            Segment::Zone => self.zone.as_deref(),
            Segment::Department => self.department.as_deref(),
            Segment::Section => self.section.as_deref(),
            Segment::BudgetCode => self.budget_code.as_deref(),
            Segment::CostCenter => self.cost_center.as_deref(),
            Segment::ContinuousAction => self.continuous_action.as_deref(),
            Segment::SpecialActivity => self.special_activity.as_deref(),
            Segment::FinancialEvent => self.financial_event.as_deref(),
            Segment::BeneficiaryHash | Segment::FiscalYear | Segment::Sequence => None,
        }
    }

    /// Renders one segment to its final fixed-width form. `Sequence` is never
    /// resolvable from inputs; it comes from the allocator.
    pub fn resolve(&self, segment: Segment) -> Result<String, ValidationError> {
        match segment {
            Segment::BeneficiaryHash => self
                .beneficiary_name
                .as_deref()
                .filter(|name| !name.trim().is_empty())
                .map(beneficiary_hash)
                .ok_or(ValidationError::MissingSegment(segment)),
            Segment::FiscalYear => match self.fiscal_year {
                None => Err(ValidationError::MissingSegment(segment)),
                Some(year) if year > MAX_FISCAL_YEAR => Err(ValidationError::OversizedSegment {
                    segment,
                    value: year.to_string(),
                    width: segment.width(),
                }),
                Some(year) if year < MIN_FISCAL_YEAR => Err(ValidationError::InvalidSegment {
                    segment,
                    value: year.to_string(),
                }),
                Some(year) => Ok(year.to_string()),
            },
            Segment::Sequence => Err(ValidationError::MissingSegment(segment)),
            _ => pad_segment(segment, self.source(segment)),
        }
    }

    /// The allocation scope, once zone, budget code and fiscal year are valid.
    pub fn sequence_scope(&self) -> Result<SequenceScope, ValidationError> {
        Ok(SequenceScope::new(
            self.resolve(Segment::Zone)?,
            self.resolve(Segment::BudgetCode)?,
            self.resolve(Segment::FiscalYear)?,
        ))
    }
}

fn pad_segment(segment: Segment, raw: Option<&str>) -> Result<String, ValidationError> {
    let value = raw
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(ValidationError::MissingSegment(segment))?;

    if !value.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidSegment {
            segment,
            value: value.to_string(),
        });
    }
    if value.len() > segment.width() {
        return Err(ValidationError::OversizedSegment {
            segment,
            value: value.to_string(),
            width: segment.width(),
        });
    }
    Ok(format!(
        "{:0>width$}",
        value.to_ascii_uppercase(),
        width = segment.width()
    ))
}

/// First six hex characters of the SHA-256 of the trimmed, lower-cased name.
pub fn beneficiary_hash(name: &str) -> String {
    let normalized = name.trim().to_lowercase();
    let digest = sha256::digest(normalized.as_str());
    digest[..Segment::BeneficiaryHash.width()].to_string()
}

/// A non-authoritative rendering for display during data entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodePreview(String);

impl CodePreview {
    pub fn as_str(&self) -> &str {
        &self.0
    }
    pub fn is_complete_except_sequence(&self) -> bool {
        self.0
            .split(DELIMITER)
            .zip(Segment::ALL)
            .filter(|(_, segment)| *segment != Segment::Sequence)
            .all(|(value, _)| !value.contains(PLACEHOLDER))
    }
}

impl std::fmt::Display for CodePreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A finalized code. Only [`finalize_code`] and [`UniqueCode::parse`] construct one.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniqueCode(#[n(0)] String);

impl UniqueCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segment(&self, segment: Segment) -> &str {
        let index = Segment::ALL
            .iter()
            .position(|s| *s == segment)
            .unwrap_or_default();
        self.0.split(DELIMITER).nth(index).unwrap_or_default()
    }

    pub fn sequence(&self) -> u16 {
        self.segment(Segment::Sequence).parse().unwrap_or_default()
    }

    /// Accepts an externally supplied code only if it could have come from [`finalize_code`].
    pub fn parse(code: &str) -> Result<Self, ValidationError> {
        let malformed = || ValidationError::MalformedCode(code.to_string());
        let parts: Vec<&str> = code.split(DELIMITER).collect();
        if parts.len() != SEGMENT_COUNT {
            return Err(malformed());
        }
        for (value, segment) in parts.iter().zip(Segment::ALL) {
            if value.len() != segment.width() {
                return Err(malformed());
            }
            let well_formed = match segment {
                // digest output is lowercase hex
                Segment::BeneficiaryHash => {
                    hex::decode(value).is_ok() && !value.chars().any(|c| c.is_ascii_uppercase())
                }
                Segment::FiscalYear => {
                    value.chars().all(|c| c.is_ascii_digit()) && !value.starts_with('0')
                }
                Segment::Sequence => value.chars().all(|c| c.is_ascii_digit()) && *value != "000",
                // padded segments are upper-cased on resolve
                _ => value
                    .chars()
                    .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()),
            };
            if !well_formed {
                return Err(malformed());
            }
        }
        Ok(UniqueCode(code.to_string()))
    }
}

impl std::fmt::Display for UniqueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Live preview. Never allocates; the sequence segment is always a placeholder.
pub fn preview_code(inputs: &CodeInputs) -> CodePreview {
    let segments: Vec<String> = Segment::ALL
        .into_iter()
        .map(|segment| match segment {
            Segment::Sequence => segment.placeholder(),
            _ => inputs
                .resolve(segment)
                .unwrap_or_else(|_| segment.placeholder()),
        })
        .collect();
    CodePreview(segments.join(&DELIMITER.to_string()))
}

/// Authoritative synthesis. Every input is validated before a sequence number
/// is drawn, so a rejected submission never consumes one.
pub fn finalize_code(
    inputs: &CodeInputs,
    allocator: &dyn SequenceAllocator,
) -> Result<UniqueCode, EngineError> {
    let mut segments = Segment::ALL[..SEGMENT_COUNT - 1]
        .iter()
        .map(|segment| inputs.resolve(*segment))
        .collect::<Result<Vec<String>, ValidationError>>()?;

    let scope = inputs.sequence_scope()?;
    let sequence = allocator.allocate(&scope)?;
    segments.push(format!(
        "{:0>width$}",
        sequence,
        width = Segment::Sequence.width()
    ));

    Ok(UniqueCode(segments.join(&DELIMITER.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::MemorySequenceAllocator;

    fn complete_inputs() -> CodeInputs {
        CodeInputs::new()
            .set_zone("3")
            .set_department("12")
            .set_section("7")
            .set_budget_code("11020401")
            .set_cost_center("101")
            .set_continuous_action("05")
            .set_special_activity("210")
            .set_beneficiary_name("  Acme Paving Ltd ")
            .set_financial_event("300")
            .set_fiscal_year(1403)
    }

    #[test]
    fn empty_preview_is_all_placeholders() {
        let preview = preview_code(&CodeInputs::new());
        assert_eq!(
            preview.as_str(),
            "??-??-???-????????-???-??-???-??????-???-????-???"
        );
        assert_eq!(preview.as_str().len(), CODE_LENGTH);
    }

    #[test]
    fn preview_pads_and_leaves_sequence_open() {
        let preview = preview_code(&complete_inputs());
        let hash = beneficiary_hash("acme paving ltd");
        assert_eq!(
            preview.as_str(),
            format!("03-12-007-11020401-101-05-210-{hash}-300-1403-???")
        );
        assert!(preview.is_complete_except_sequence());
    }

    #[test]
    fn preview_renders_invalid_values_as_placeholders() {
        let inputs = CodeInputs::new()
            .set_zone("123")
            .set_budget_code("11-02")
            .set_fiscal_year(99);
        let preview = preview_code(&inputs);
        assert!(preview.as_str().starts_with("??-??-???-????????-"));
        assert_eq!(preview.as_str().len(), CODE_LENGTH);
        assert!(!preview.is_complete_except_sequence());
    }

    #[test]
    fn preview_is_repeatable() {
        let inputs = CodeInputs::new().set_zone("1").set_beneficiary_name("Jane");
        assert_eq!(preview_code(&inputs), preview_code(&inputs));
    }

    #[test]
    fn beneficiary_hash_normalizes() {
        let a = beneficiary_hash("Acme Paving Ltd");
        let b = beneficiary_hash("  ACME PAVING LTD\t");
        assert_eq!(a, b);
        assert_eq!(a.len(), 6);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, beneficiary_hash("Acme Paving"));
    }

    #[test]
    fn finalize_allocates_increasing_sequences() {
        let allocator = MemorySequenceAllocator::new();
        let first = finalize_code(&complete_inputs(), &allocator).unwrap();
        let second = finalize_code(&complete_inputs(), &allocator).unwrap();

        assert_eq!(first.sequence(), 1);
        assert_eq!(second.sequence(), 2);
        assert_eq!(first.as_str().len(), CODE_LENGTH);
        assert!(first.as_str().ends_with("-1403-001"));
        assert_eq!(first.segment(Segment::Zone), "03");
        assert_eq!(UniqueCode::parse(first.as_str()).unwrap(), first);
    }

    #[test]
    fn finalize_names_missing_segment_and_draws_no_sequence() {
        let allocator = MemorySequenceAllocator::new();
        let mut inputs = complete_inputs();
        inputs.cost_center = None;

        let err = finalize_code(&inputs, &allocator).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::MissingSegment(Segment::CostCenter))
        ));

        let code = finalize_code(&complete_inputs(), &allocator).unwrap();
        assert_eq!(code.sequence(), 1);
    }

    #[test]
    fn finalize_rejects_oversized_values() {
        let allocator = MemorySequenceAllocator::new();
        let inputs = complete_inputs().set_budget_code("110204011");
        assert!(matches!(
            finalize_code(&inputs, &allocator),
            Err(EngineError::Validation(ValidationError::OversizedSegment {
                segment: Segment::BudgetCode,
                ..
            }))
        ));
    }

    #[test]
    fn blank_beneficiary_is_missing() {
        let inputs = complete_inputs().set_beneficiary_name("   ");
        assert_eq!(
            inputs.resolve(Segment::BeneficiaryHash),
            Err(ValidationError::MissingSegment(Segment::BeneficiaryHash))
        );
    }

    #[test]
    fn parse_refuses_previews() {
        let preview = preview_code(&complete_inputs());
        assert!(UniqueCode::parse(preview.as_str()).is_err());
        assert!(UniqueCode::parse("03-12-007").is_err());
    }

    #[test]
    fn parse_accepts_only_what_finalize_emits() {
        let code = finalize_code(
            &complete_inputs().set_cost_center("ab1"),
            &MemorySequenceAllocator::new(),
        )
        .unwrap();
        assert_eq!(code.segment(Segment::CostCenter), "AB1");
        assert_eq!(UniqueCode::parse(code.as_str()).unwrap(), code);

        // lowercase letters in a padded segment are never emitted
        let lowered = code.as_str().replacen("AB1", "ab1", 1);
        assert!(UniqueCode::parse(&lowered).is_err());

        // nor is uppercase hex in the beneficiary hash
        let hash = code.segment(Segment::BeneficiaryHash);
        assert!(UniqueCode::parse("03-12-007-11020401-101-05-210-A1B2C3-300-1403-001").is_err());
        assert!(UniqueCode::parse("03-12-007-11020401-101-05-210-a1b2c3-300-1403-001").is_ok());
        assert!(hash.chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));

        assert!(UniqueCode::parse("03-12-007-11020401-101-05-210-a1b2c3-300-0999-001").is_err());
    }
}
