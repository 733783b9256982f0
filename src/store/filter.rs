//! Typed builder for PocketBase filter expressions.
//!
//! Every literal goes through [`Literal`] rendering, which quotes and escapes
//! strings, so user-supplied text can never terminate the quoted value and
//! inject extra clauses.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::fmt;

/// A value on the right-hand side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Text(String),
    Number(Decimal),
    Bool(bool),
    Null,
}

impl From<&str> for Literal {
    fn from(value: &str) -> Self {
        Literal::Text(value.to_string())
    }
}

impl From<String> for Literal {
    fn from(value: String) -> Self {
        Literal::Text(value)
    }
}

impl From<i64> for Literal {
    fn from(value: i64) -> Self {
        Literal::Number(Decimal::from(value))
    }
}

impl From<Decimal> for Literal {
    fn from(value: Decimal) -> Self {
        Literal::Number(value)
    }
}

impl From<bool> for Literal {
    fn from(value: bool) -> Self {
        Literal::Bool(value)
    }
}

impl From<NaiveDate> for Literal {
    fn from(value: NaiveDate) -> Self {
        Literal::Text(format!("{} 00:00:00", value.format("%Y-%m-%d")))
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Text(text) => {
                // The backend has no escape for `\` itself, so a trailing one
                // would swallow the closing quote.
                let text = text.trim_end_matches('\\');
                f.write_str("'")?;
                for ch in text.chars() {
                    if ch == '\'' {
                        f.write_str("\\'")?;
                    } else {
                        write!(f, "{}", ch)?;
                    }
                }
                f.write_str("'")
            }
            Literal::Number(n) => write!(f, "{}", n.normalize()),
            Literal::Bool(b) => write!(f, "{}", b),
            Literal::Null => f.write_str("null"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
}

impl Op {
    fn as_str(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Neq => "!=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Like => "~",
        }
    }
}

/// A filter expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Cmp {
        field: String,
        op: &'static str,
        value: Literal,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

fn cmp(field: &str, op: Op, value: Literal) -> Filter {
    debug_assert!(is_field_name(field), "invalid field name {field}");
    Filter::Cmp {
        field: field.to_string(),
        op: op.as_str(),
        value,
    }
}

fn is_field_name(field: &str) -> bool {
    !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

impl Filter {
    pub fn eq(field: &str, value: impl Into<Literal>) -> Self {
        cmp(field, Op::Eq, value.into())
    }

    pub fn neq(field: &str, value: impl Into<Literal>) -> Self {
        cmp(field, Op::Neq, value.into())
    }

    pub fn gt(field: &str, value: impl Into<Literal>) -> Self {
        cmp(field, Op::Gt, value.into())
    }

    pub fn gte(field: &str, value: impl Into<Literal>) -> Self {
        cmp(field, Op::Gte, value.into())
    }

    pub fn lt(field: &str, value: impl Into<Literal>) -> Self {
        cmp(field, Op::Lt, value.into())
    }

    pub fn lte(field: &str, value: impl Into<Literal>) -> Self {
        cmp(field, Op::Lte, value.into())
    }

    /// Case-insensitive "contains".
    pub fn contains(field: &str, needle: &str) -> Self {
        cmp(field, Op::Like, Literal::Text(needle.to_string()))
    }

    /// Case-insensitive prefix match.
    pub fn starts_with(field: &str, prefix: &str) -> Self {
        cmp(field, Op::Like, Literal::Text(format!("{}%", prefix)))
    }

    /// Records created within the calendar `year`.
    pub fn within_year(field: &str, year: i32) -> Self {
        let start = NaiveDate::from_ymd_opt(year, 1, 1);
        let end = NaiveDate::from_ymd_opt(year + 1, 1, 1);
        match (start, end) {
            (Some(start), Some(end)) => {
                Filter::And(vec![Filter::gte(field, start), Filter::lt(field, end)])
            }
            _ => Filter::And(Vec::new()),
        }
    }

    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut parts) => {
                parts.push(other);
                Filter::Or(parts)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    /// Joins every filter with `&&`; `None` when the list is empty.
    pub fn all(filters: Vec<Filter>) -> Option<Filter> {
        let filters: Vec<Filter> = filters.into_iter().filter(|f| !f.is_empty()).collect();
        match filters.len() {
            0 => None,
            1 => filters.into_iter().next(),
            _ => Some(Filter::And(filters)),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Filter::Cmp { .. } => false,
            Filter::And(parts) | Filter::Or(parts) => parts.iter().all(Filter::is_empty),
        }
    }

    fn write_group(
        f: &mut fmt::Formatter<'_>,
        parts: &[Filter],
        joiner: &str,
    ) -> fmt::Result {
        let parts: Vec<&Filter> = parts.iter().filter(|p| !p.is_empty()).collect();
        if parts.len() == 1 {
            return write!(f, "{}", parts[0]);
        }
        f.write_str("(")?;
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                write!(f, " {} ", joiner)?;
            }
            write!(f, "{}", part)?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Cmp { field, op, value } => write!(f, "{} {} {}", field, op, value),
            Filter::And(parts) => Filter::write_group(f, parts, "&&"),
            Filter::Or(parts) => Filter::write_group(f, parts, "||"),
        }
    }
}
