//! Filter clause AST for the provider's `filter=` grammar.
//!
//! The grammar packs seven operators into a handful of separators:
//!
//! | operator        | encoding            |
//! |-----------------|---------------------|
//! | AND (clauses)   | `a:1,b:2`           |
//! | OR (values)     | `field:x|y`         |
//! | AND (values)    | `field:x+y`         |
//! | not-equals      | `field:!x`          |
//! | greater / less  | `field:>x`, `field:<x` |
//! | range           | `field:lo-hi`       |
//!
//! Clauses are only built through [`FilterClause::new`], which checks the field
//! against the kind's allow-list and the operator against the field's type, so
//! [`FilterExpression`]'s serializer never has to escape anything. The parser is
//! its inverse and is what raw caller filters go through.

use serde::Serialize;

use crate::error::{ApiError, Result};
use crate::models::{EntityKind, FieldType};

const CLAUSE_SEPARATOR: char = ',';
const OR_SEPARATOR: char = '|';
const AND_SEPARATOR: char = '+';
const NOT_PREFIX: char = '!';
const GT_PREFIX: char = '>';
const LT_PREFIX: char = '<';
const RANGE_SEPARATOR: char = '-';

/// Operator of a clause, without its operands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Range,
    OrSet,
    AndSet,
}

impl Operator {
    /// Operators a field of the given type accepts
    pub fn supported_by(field_type: FieldType) -> &'static [Operator] {
        match field_type {
            FieldType::Numeric => &[
                Operator::Equals,
                Operator::NotEquals,
                Operator::GreaterThan,
                Operator::LessThan,
                Operator::Range,
                Operator::OrSet,
            ],
            FieldType::Boolean => &[Operator::Equals],
            FieldType::Date => &[
                Operator::Equals,
                Operator::NotEquals,
                Operator::GreaterThan,
                Operator::LessThan,
                Operator::OrSet,
            ],
            FieldType::Text => &[
                Operator::Equals,
                Operator::NotEquals,
                Operator::OrSet,
                Operator::AndSet,
            ],
        }
    }
}

/// Operator with its literal operands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOp {
    Equals(String),
    NotEquals(String),
    GreaterThan(String),
    LessThan(String),
    Range { lo: String, hi: String },
    OrSet(Vec<String>),
    AndSet(Vec<String>),
}

impl FilterOp {
    /// `Equals` for one value, `OrSet` for several
    pub fn any_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut values: Vec<String> = values.into_iter().map(Into::into).collect();
        if values.len() == 1 {
            FilterOp::Equals(values.remove(0))
        } else {
            FilterOp::OrSet(values)
        }
    }

    pub fn operator(&self) -> Operator {
        match self {
            FilterOp::Equals(_) => Operator::Equals,
            FilterOp::NotEquals(_) => Operator::NotEquals,
            FilterOp::GreaterThan(_) => Operator::GreaterThan,
            FilterOp::LessThan(_) => Operator::LessThan,
            FilterOp::Range { .. } => Operator::Range,
            FilterOp::OrSet(_) => Operator::OrSet,
            FilterOp::AndSet(_) => Operator::AndSet,
        }
    }

    pub fn values(&self) -> Vec<&str> {
        match self {
            FilterOp::Equals(v)
            | FilterOp::NotEquals(v)
            | FilterOp::GreaterThan(v)
            | FilterOp::LessThan(v) => vec![v.as_str()],
            FilterOp::Range { lo, hi } => vec![lo.as_str(), hi.as_str()],
            FilterOp::OrSet(vs) | FilterOp::AndSet(vs) => vs.iter().map(String::as_str).collect(),
        }
    }
}

/// A validated `field:value` clause
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterClause {
    field: &'static str,
    op: FilterOp,
}

impl FilterClause {
    /// Build a clause, checking field, operator and literals for `kind`
    pub fn new(kind: EntityKind, field: &str, op: FilterOp) -> Result<Self> {
        let spec = kind.field(field).ok_or_else(|| {
            ApiError::bad_request(format!(
                "'{}' is not a filterable field for {} (see openalex_filter_fields)",
                field,
                kind.collection()
            ))
        })?;

        let operator = op.operator();
        if !Operator::supported_by(spec.field_type).contains(&operator) {
            return Err(ApiError::bad_request(format!(
                "operator {:?} is not supported on {} field '{}'",
                operator,
                field_type_name(spec.field_type),
                field
            )));
        }

        if let FilterOp::OrSet(values) | FilterOp::AndSet(values) = &op {
            if values.len() < 2 {
                return Err(ApiError::bad_request(format!(
                    "a value set on '{}' needs at least two values",
                    field
                )));
            }
        }

        for value in op.values() {
            validate_literal(field, spec.field_type, value)?;
        }

        if let FilterOp::Range { lo, hi } = &op {
            let (lo_n, hi_n) = (parse_number(lo), parse_number(hi));
            if let (Some(lo_n), Some(hi_n)) = (lo_n, hi_n) {
                if lo_n > hi_n {
                    return Err(ApiError::bad_request(format!(
                        "range on '{}' has lower bound {} above upper bound {}",
                        field, lo, hi
                    )));
                }
            }
        }

        Ok(Self {
            field: spec.name,
            op,
        })
    }

    pub fn field(&self) -> &'static str {
        self.field
    }

    pub fn op(&self) -> &FilterOp {
        &self.op
    }

    pub fn operator(&self) -> Operator {
        self.op.operator()
    }

    /// Parse one `field:value` clause
    pub fn parse(kind: EntityKind, raw: &str) -> Result<Self> {
        let (field, value) = raw.split_once(':').ok_or_else(|| {
            ApiError::bad_request(format!("filter clause '{}' is missing ':'", raw))
        })?;
        let field = field.trim();
        let value = value.trim();

        let spec = kind.field(field).ok_or_else(|| {
            ApiError::bad_request(format!(
                "'{}' is not a filterable field for {} (see openalex_filter_fields)",
                field,
                kind.collection()
            ))
        })?;

        let op = if value.contains(OR_SEPARATOR) {
            FilterOp::OrSet(value.split(OR_SEPARATOR).map(|v| v.trim().to_string()).collect())
        } else if value.contains(AND_SEPARATOR) {
            FilterOp::AndSet(value.split(AND_SEPARATOR).map(|v| v.trim().to_string()).collect())
        } else if let Some(rest) = value.strip_prefix(NOT_PREFIX) {
            FilterOp::NotEquals(rest.to_string())
        } else if let Some(rest) = value.strip_prefix(GT_PREFIX) {
            FilterOp::GreaterThan(rest.to_string())
        } else if let Some(rest) = value.strip_prefix(LT_PREFIX) {
            FilterOp::LessThan(rest.to_string())
        } else if let Some((lo, hi)) = split_numeric_range(spec.field_type, value) {
            FilterOp::Range {
                lo: lo.to_string(),
                hi: hi.to_string(),
            }
        } else {
            FilterOp::Equals(value.to_string())
        };

        Self::new(kind, field, op)
    }
}

impl std::fmt::Display for FilterClause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.field)?;
        match &self.op {
            FilterOp::Equals(v) => write!(f, "{}", v),
            FilterOp::NotEquals(v) => write!(f, "{}{}", NOT_PREFIX, v),
            FilterOp::GreaterThan(v) => write!(f, "{}{}", GT_PREFIX, v),
            FilterOp::LessThan(v) => write!(f, "{}{}", LT_PREFIX, v),
            FilterOp::Range { lo, hi } => write!(f, "{}{}{}", lo, RANGE_SEPARATOR, hi),
            FilterOp::OrSet(vs) => write!(f, "{}", vs.join(&OR_SEPARATOR.to_string())),
            FilterOp::AndSet(vs) => write!(f, "{}", vs.join(&AND_SEPARATOR.to_string())),
        }
    }
}

/// Ordered clauses joined by AND
///
/// Duplicate fields are kept as separate clauses; the provider ANDs them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterExpression {
    clauses: Vec<FilterClause>,
}

impl FilterExpression {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a raw filter string; an empty string is the empty expression
    pub fn parse(kind: EntityKind, raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::new());
        }

        let clauses = raw
            .split(CLAUSE_SEPARATOR)
            .map(|segment| {
                if segment.trim().is_empty() {
                    Err(ApiError::bad_request(format!(
                        "filter '{}' contains an empty clause",
                        raw
                    )))
                } else {
                    FilterClause::parse(kind, segment)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { clauses })
    }

    pub fn push(&mut self, clause: FilterClause) {
        self.clauses.push(clause);
    }

    /// Append another expression's clauses after this one's
    pub fn extend(&mut self, other: FilterExpression) {
        self.clauses.extend(other.clauses);
    }

    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    /// Serialized form for the `filter` query parameter, `None` when empty
    pub fn to_param(&self) -> Option<String> {
        if self.is_empty() {
            None
        } else {
            Some(self.to_string())
        }
    }
}

impl std::fmt::Display for FilterExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", CLAUSE_SEPARATOR)?;
            }
            write!(f, "{}", clause)?;
        }
        Ok(())
    }
}

fn field_type_name(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::Numeric => "numeric",
        FieldType::Boolean => "boolean",
        FieldType::Date => "date",
        FieldType::Text => "text",
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn is_unsigned_number(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with('.')
        && !value.ends_with('.')
        && value.chars().all(|c| c.is_ascii_digit() || c == '.')
        && value.matches('.').count() <= 1
}

/// `lo-hi` on numeric fields only; elsewhere a `-` is part of the literal
fn split_numeric_range(field_type: FieldType, value: &str) -> Option<(&str, &str)> {
    if field_type != FieldType::Numeric {
        return None;
    }
    let (lo, hi) = value.split_once(RANGE_SEPARATOR)?;
    (is_unsigned_number(lo) && is_unsigned_number(hi)).then_some((lo, hi))
}

fn validate_literal(field: &str, field_type: FieldType, value: &str) -> Result<()> {
    let reject = |reason: &str| {
        Err(ApiError::bad_request(format!(
            "invalid value '{}' for '{}': {}",
            value, field, reason
        )))
    };

    if value.is_empty() {
        return reject("empty value");
    }
    if value.trim() != value {
        return reject("leading or trailing whitespace");
    }
    if value.contains([CLAUSE_SEPARATOR, OR_SEPARATOR, AND_SEPARATOR]) {
        return reject("contains a reserved separator (',', '|' or '+')");
    }
    if value.starts_with([NOT_PREFIX, GT_PREFIX, LT_PREFIX]) {
        return reject("starts with a reserved operator ('!', '>' or '<')");
    }

    match field_type {
        FieldType::Numeric if !is_unsigned_number(value) => reject("expected a number"),
        FieldType::Boolean if value != "true" && value != "false" => {
            reject("expected true or false")
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clause(kind: EntityKind, field: &str, op: FilterOp) -> FilterClause {
        FilterClause::new(kind, field, op).unwrap()
    }

    #[test]
    fn test_operator_encodings() {
        let k = EntityKind::Work;
        let cases = [
            (clause(k, "publication_year", FilterOp::Equals("2024".into())), "publication_year:2024"),
            (clause(k, "publication_year", FilterOp::NotEquals("2024".into())), "publication_year:!2024"),
            (clause(k, "cited_by_count", FilterOp::GreaterThan("100".into())), "cited_by_count:>100"),
            (clause(k, "cited_by_count", FilterOp::LessThan("5".into())), "cited_by_count:<5"),
            (
                clause(k, "publication_year", FilterOp::Range { lo: "2020".into(), hi: "2024".into() }),
                "publication_year:2020-2024",
            ),
            (
                clause(k, "publication_year", FilterOp::OrSet(vec!["2023".into(), "2024".into()])),
                "publication_year:2023|2024",
            ),
            (
                clause(k, "authorships.countries", FilterOp::AndSet(vec!["CN".into(), "US".into()])),
                "authorships.countries:CN+US",
            ),
        ];
        for (clause, expected) in cases {
            assert_eq!(clause.to_string(), expected);
        }
    }

    #[test]
    fn test_expression_joins_with_comma_and_keeps_duplicates() {
        let k = EntityKind::Work;
        let mut expr = FilterExpression::new();
        expr.push(clause(k, "type", FilterOp::Equals("article".into())));
        expr.push(clause(k, "type", FilterOp::NotEquals("review".into())));
        assert_eq!(expr.to_string(), "type:article,type:!review");
        assert_eq!(expr.len(), 2);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = FilterClause::new(EntityKind::Author, "publication_year", FilterOp::Equals("2024".into()))
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::BadRequest);
        assert!(err.message().contains("publication_year"));
    }

    #[test]
    fn test_range_on_text_field_rejected() {
        let err = FilterClause::new(
            EntityKind::Work,
            "language",
            FilterOp::Range { lo: "1".into(), hi: "2".into() },
        )
        .unwrap_err();
        assert!(err.message().contains("not supported"));
    }

    #[test]
    fn test_boolean_literal_checked() {
        assert!(FilterClause::new(EntityKind::Work, "is_oa", FilterOp::Equals("yes".into())).is_err());
        assert!(FilterClause::new(EntityKind::Work, "is_oa", FilterOp::Equals("true".into())).is_ok());
    }

    #[test]
    fn test_reserved_characters_rejected() {
        for bad in ["a,b", "a|b", "a+b", "!a", ">a", " a", ""] {
            assert!(
                FilterClause::new(EntityKind::Work, "type", FilterOp::Equals(bad.into())).is_err(),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_inverted_range_rejected() {
        assert!(FilterClause::new(
            EntityKind::Work,
            "publication_year",
            FilterOp::Range { lo: "2024".into(), hi: "2020".into() }
        )
        .is_err());
    }

    #[test]
    fn test_parse_all_operators() {
        let expr = FilterExpression::parse(
            EntityKind::Work,
            "publication_year:2020-2024,cited_by_count:>100,type:!review,language:en|fr,authorships.countries:CN+US,publication_date:<2024-06-01",
        )
        .unwrap();
        let ops: Vec<Operator> = expr.clauses().iter().map(|c| c.operator()).collect();
        assert_eq!(
            ops,
            vec![
                Operator::Range,
                Operator::GreaterThan,
                Operator::NotEquals,
                Operator::OrSet,
                Operator::AndSet,
                Operator::LessThan,
            ]
        );
    }

    #[test]
    fn test_hyphen_in_text_is_not_a_range() {
        let expr = FilterExpression::parse(EntityKind::Work, "type:book-chapter").unwrap();
        assert_eq!(expr.clauses()[0].op(), &FilterOp::Equals("book-chapter".into()));

        let expr = FilterExpression::parse(EntityKind::Work, "publication_date:2024-01-01").unwrap();
        assert_eq!(expr.clauses()[0].operator(), Operator::Equals);
    }

    #[test]
    fn test_parse_openalex_url_value() {
        let expr = FilterExpression::parse(
            EntityKind::Work,
            "authorships.institutions.id:https://openalex.org/I27837315",
        )
        .unwrap();
        assert_eq!(
            expr.clauses()[0].op().values(),
            vec!["https://openalex.org/I27837315"]
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(FilterExpression::parse(EntityKind::Work, "publication_year").is_err());
        assert!(FilterExpression::parse(EntityKind::Work, "is_oa:true,").is_err());
        assert!(FilterExpression::parse(EntityKind::Work, "nonsense:1").is_err());
        assert!(FilterExpression::parse(EntityKind::Work, "type:!a|b").is_err());
    }

    #[test]
    fn test_empty_string_is_empty_expression() {
        let expr = FilterExpression::parse(EntityKind::Work, "  ").unwrap();
        assert!(expr.is_empty());
        assert_eq!(expr.to_param(), None);
    }
}
