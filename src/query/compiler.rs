//! Compile high-level search parameters into a [`FilterExpression`].

use chrono::Datelike;

use super::filter::{FilterClause, FilterExpression, FilterOp};
use super::identifier::Identifier;
use crate::error::{ApiError, Result};
use crate::models::EntityKind;

/// Lower bound used when only `year_to` is given
pub const EARLIEST_YEAR: i32 = 1900;

/// Field-specific shortcuts plus an optional raw filter string
///
/// Shortcuts a kind has no field for are ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterParams {
    pub year_from: Option<i32>,
    pub year_to: Option<i32>,
    /// ISO alpha-2 code, or several joined by `,` or `|`
    pub country: Option<String>,
    /// Institution already classified; free text must be resolved first
    pub institution: Option<Identifier>,
    pub open_access: Option<bool>,
    /// Provider filter syntax, appended after the shortcuts
    pub raw: Option<String>,
}

/// Stateless compiler; the current year is injected for open-ended ranges
#[derive(Debug, Clone, Copy)]
pub struct FilterCompiler {
    current_year: i32,
}

impl Default for FilterCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterCompiler {
    pub fn new() -> Self {
        Self {
            current_year: chrono::Utc::now().year(),
        }
    }

    /// Compiler with a fixed "current year"
    pub fn with_current_year(current_year: i32) -> Self {
        Self { current_year }
    }

    pub fn current_year(&self) -> i32 {
        self.current_year
    }

    /// Build the filter expression for `kind`
    ///
    /// Shortcut clauses come first in a fixed order (year, open access, country,
    /// institution), then the raw clauses. Nothing is merged or deduplicated.
    pub fn compile(&self, kind: EntityKind, params: &FilterParams) -> Result<FilterExpression> {
        let mut expr = FilterExpression::new();

        if let Some(clause) = self.year_clause(kind, params.year_from, params.year_to)? {
            expr.push(clause);
        }

        if let (Some(field), Some(is_oa)) = (kind.open_access_field(), params.open_access) {
            expr.push(FilterClause::new(kind, field, FilterOp::Equals(is_oa.to_string()))?);
        }

        if let (Some(field), Some(country)) = (kind.country_field(), params.country.as_deref()) {
            expr.push(FilterClause::new(kind, field, FilterOp::any_of(country_codes(country)?))?);
        }

        if let (Some(fields), Some(institution)) = (kind.institution_fields(), &params.institution) {
            expr.push(institution_clause(kind, fields, institution)?);
        }

        if let Some(raw) = params.raw.as_deref() {
            expr.extend(FilterExpression::parse(kind, raw)?);
        }

        Ok(expr)
    }

    fn year_clause(
        &self,
        kind: EntityKind,
        year_from: Option<i32>,
        year_to: Option<i32>,
    ) -> Result<Option<FilterClause>> {
        let Some(field) = kind.year_field() else {
            return Ok(None);
        };

        let (lo, hi) = match (year_from, year_to) {
            (None, None) => return Ok(None),
            (Some(from), Some(to)) => (from, to),
            (Some(from), None) => (from, self.current_year.max(from)),
            (None, Some(to)) => (EARLIEST_YEAR.min(to), to),
        };

        if lo < 0 || hi < 0 {
            return Err(ApiError::bad_request("years must be non-negative"));
        }
        if lo > hi {
            return Err(ApiError::bad_request(format!(
                "year_from ({}) is after year_to ({})",
                lo, hi
            )));
        }

        let op = if lo == hi {
            FilterOp::Equals(lo.to_string())
        } else {
            FilterOp::Range {
                lo: lo.to_string(),
                hi: hi.to_string(),
            }
        };
        FilterClause::new(kind, field, op).map(Some)
    }
}

/// Split, upper-case and check country codes
fn country_codes(raw: &str) -> Result<Vec<String>> {
    let codes: Vec<String> = raw
        .split([',', '|'])
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty())
        .collect();

    if codes.is_empty() {
        return Err(ApiError::bad_request("country is empty"));
    }
    if let Some(bad) = codes
        .iter()
        .find(|c| c.len() != 2 || !c.chars().all(|ch| ch.is_ascii_alphabetic()))
    {
        return Err(ApiError::bad_request(format!(
            "'{}' is not an ISO 3166-1 alpha-2 country code",
            bad
        )));
    }
    Ok(codes)
}

fn institution_clause(
    kind: EntityKind,
    (by_id, by_ror): (&'static str, &'static str),
    institution: &Identifier,
) -> Result<FilterClause> {
    match institution {
        Identifier::NativeId {
            kind: EntityKind::Institution,
            id,
        } => FilterClause::new(kind, by_id, FilterOp::Equals(id.clone())),
        Identifier::Ror(_) => {
            FilterClause::new(kind, by_ror, FilterOp::Equals(institution.filter_value()))
        }
        other => Err(ApiError::bad_request(format!(
            "institution must be an institution ID, a ROR URL or a resolvable name (got {})",
            other.tag()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiler() -> FilterCompiler {
        FilterCompiler::with_current_year(2024)
    }

    #[test]
    fn test_year_and_open_access_scenario() {
        let params = FilterParams {
            year_from: Some(2024),
            open_access: Some(true),
            raw: Some(String::new()),
            ..Default::default()
        };
        let expr = compiler().compile(EntityKind::Work, &params).unwrap();
        assert_eq!(expr.to_string(), "publication_year:2024,is_oa:true");
    }

    #[test]
    fn test_single_year_with_explicit_upper_bound() {
        let params = FilterParams {
            year_from: Some(2024),
            year_to: Some(2024),
            open_access: Some(true),
            ..Default::default()
        };
        for current_year in [2024, 2031] {
            let expr = FilterCompiler::with_current_year(current_year)
                .compile(EntityKind::Work, &params)
                .unwrap();
            assert_eq!(expr.to_string(), "publication_year:2024,is_oa:true");
        }
    }

    #[test]
    fn test_open_ended_years() {
        let from_only = FilterParams {
            year_from: Some(2020),
            ..Default::default()
        };
        assert_eq!(
            compiler().compile(EntityKind::Work, &from_only).unwrap().to_string(),
            "publication_year:2020-2024"
        );

        let to_only = FilterParams {
            year_to: Some(1999),
            ..Default::default()
        };
        assert_eq!(
            compiler().compile(EntityKind::Work, &to_only).unwrap().to_string(),
            "publication_year:1900-1999"
        );
    }

    #[test]
    fn test_inverted_years_rejected() {
        let params = FilterParams {
            year_from: Some(2024),
            year_to: Some(2020),
            ..Default::default()
        };
        assert!(compiler().compile(EntityKind::Work, &params).is_err());
    }

    #[test]
    fn test_year_is_noop_without_year_field() {
        let params = FilterParams {
            year_from: Some(2020),
            year_to: Some(2022),
            raw: Some("works_count:>10".into()),
            ..Default::default()
        };
        let expr = compiler().compile(EntityKind::Author, &params).unwrap();
        assert_eq!(expr.to_string(), "works_count:>10");
    }

    #[test]
    fn test_country_field_per_kind() {
        let params = FilterParams {
            country: Some("cn".into()),
            ..Default::default()
        };
        let cases = [
            (EntityKind::Work, "authorships.countries:CN"),
            (EntityKind::Author, "affiliations.institution.country_code:CN"),
            (EntityKind::Institution, "country_code:CN"),
        ];
        for (kind, expected) in cases {
            assert_eq!(compiler().compile(kind, &params).unwrap().to_string(), expected);
        }
    }

    #[test]
    fn test_multiple_countries_become_or_set() {
        let params = FilterParams {
            country: Some("us, gb".into()),
            ..Default::default()
        };
        assert_eq!(
            compiler().compile(EntityKind::Work, &params).unwrap().to_string(),
            "authorships.countries:US|GB"
        );
    }

    #[test]
    fn test_bad_country_rejected() {
        let params = FilterParams {
            country: Some("China".into()),
            ..Default::default()
        };
        assert!(compiler().compile(EntityKind::Work, &params).is_err());
    }

    #[test]
    fn test_institution_by_id_and_ror() {
        let by_id = FilterParams {
            institution: Some(Identifier::classify(EntityKind::Institution, "I63966007")),
            ..Default::default()
        };
        assert_eq!(
            compiler().compile(EntityKind::Work, &by_id).unwrap().to_string(),
            "authorships.institutions.id:I63966007"
        );

        let by_ror = FilterParams {
            institution: Some(Identifier::classify(EntityKind::Institution, "https://ror.org/042nb2s44")),
            ..Default::default()
        };
        assert_eq!(
            compiler().compile(EntityKind::Author, &by_ror).unwrap().to_string(),
            "affiliations.institution.ror:https://ror.org/042nb2s44"
        );
    }

    #[test]
    fn test_raw_appended_and_duplicates_kept() {
        let params = FilterParams {
            year_from: Some(2020),
            year_to: Some(2022),
            raw: Some("publication_year:!2021,cited_by_count:>100".into()),
            ..Default::default()
        };
        assert_eq!(
            compiler().compile(EntityKind::Work, &params).unwrap().to_string(),
            "publication_year:2020-2022,publication_year:!2021,cited_by_count:>100"
        );
    }

    #[test]
    fn test_unknown_raw_field_fails_fast() {
        let params = FilterParams {
            raw: Some("h_index:>10".into()),
            ..Default::default()
        };
        let err = compiler().compile(EntityKind::Author, &params).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BadRequest);
    }
}
