//! Requirement expressions.
//!
//! Callers filter a pool with a small JSON grammar:
//!
//! ```text
//! ["==", "$floating_network_id", "ext-net"]
//! ["and", ["==", "$floating_network_id", "ext-net"], [">=", "$priority", "3"]]
//! ```
//!
//! An expression is parsed into [`Expression`] up front and then flattened
//! into an ordered list of [`Predicate`]s, which the pool oracle applies as a
//! conjunction. Only `and` is supported as a combinator.

use std::cmp::Ordering;

use serde_json::Value;

use crate::error::{ReservationError, ReservationResult};

/// Deepest `and` nesting an expression may have.
pub const MAX_EXPRESSION_DEPTH: usize = 32;

/// Comparison operator of a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
}

impl Operator {
    /// Parse an operator token. `=` is accepted as an alias for `==`.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "==" | "=" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Lt => "<",
        }
    }

    fn accepts(&self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Ge => ordering != Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Gt => ordering == Ordering::Greater,
            Self::Lt => ordering == Ordering::Less,
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized `field op value` filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Predicate {
    /// Attribute name without the leading `$`.
    pub field: String,
    pub op: Operator,
    pub value: String,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: Operator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    /// Shorthand for an equality predicate.
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    /// Evaluate the predicate against an attribute value.
    ///
    /// Both sides are compared as numbers when both parse as numbers,
    /// otherwise as strings.
    pub fn matches(&self, actual: &str) -> bool {
        let ordering = match (actual.parse::<f64>(), self.value.parse::<f64>()) {
            (Ok(a), Ok(b)) => match a.partial_cmp(&b) {
                Some(ordering) => ordering,
                None => return false,
            },
            _ => actual.cmp(self.value.as_str()),
        };
        self.op.accepts(ordering)
    }
}

impl std::fmt::Display for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.field, self.op, self.value)
    }
}

/// A parsed requirement expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// `[]` or the empty string; matches everything.
    Empty,
    /// `[op, "$field", value]`.
    Comparison(Predicate),
    /// `["and", expr, ...]`.
    Conjunction(Vec<Expression>),
}

impl Expression {
    /// Parse the textual (JSON) encoding. The empty string is `Empty`.
    ///
    /// The decoded text must be an array; a JSON string literal is rejected.
    pub fn parse_str(text: &str) -> ReservationResult<Self> {
        Self::parse_text(text, 0)
    }

    /// Parse a JSON value. A JSON string is treated as the textual encoding.
    ///
    /// Nesting deeper than [`MAX_EXPRESSION_DEPTH`] is rejected.
    pub fn from_json(value: &Value) -> ReservationResult<Self> {
        match value {
            Value::String(text) => Self::parse_text(text, 0),
            value => Self::parse_value(value, 0),
        }
    }

    fn parse_text(text: &str, depth: usize) -> ReservationResult<Self> {
        if text.is_empty() {
            return Ok(Self::Empty);
        }
        let value: Value = serde_json::from_str(text)
            .map_err(|_| ReservationError::MalformedRequirements(text.to_string()))?;
        Self::parse_value(&value, depth)
    }

    fn parse_value(value: &Value, depth: usize) -> ReservationResult<Self> {
        if depth > MAX_EXPRESSION_DEPTH {
            return Err(ReservationError::MalformedRequirements(format!(
                "nested deeper than {MAX_EXPRESSION_DEPTH} levels"
            )));
        }
        let malformed = || ReservationError::MalformedRequirements(value.to_string());

        let Value::Array(items) = value else {
            return Err(malformed());
        };

        if items.is_empty() {
            return Ok(Self::Empty);
        }

        if let Some(predicate) = parse_comparison(items) {
            return Ok(Self::Comparison(predicate));
        }

        if items.len() > 1 && items[0].as_str() == Some("and") {
            let mut terms = Vec::with_capacity(items.len() - 1);
            for item in &items[1..] {
                // Sub-terms may themselves be in textual form.
                let term = match item {
                    Value::String(text) => Self::parse_text(text, depth + 1)?,
                    item => Self::parse_value(item, depth + 1)?,
                };
                match term {
                    Self::Empty => return Err(malformed()),
                    term => terms.push(term),
                }
            }
            return Ok(Self::Conjunction(terms));
        }

        Err(malformed())
    }

    /// Conjunction of two expressions, dropping empty sides.
    pub fn and(self, other: Expression) -> Expression {
        match (self, other) {
            (Self::Empty, e) | (e, Self::Empty) => e,
            (Self::Conjunction(mut left), Self::Conjunction(right)) => {
                left.extend(right);
                Self::Conjunction(left)
            }
            (Self::Conjunction(mut left), e) => {
                left.push(e);
                Self::Conjunction(left)
            }
            (e, Self::Conjunction(mut right)) => {
                right.insert(0, e);
                Self::Conjunction(right)
            }
            (left, right) => Self::Conjunction(vec![left, right]),
        }
    }

    /// Flatten into predicates, in source order.
    pub fn predicates(&self) -> Vec<Predicate> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect(&self, out: &mut Vec<Predicate>) {
        match self {
            Self::Empty => {}
            Self::Comparison(p) => out.push(p.clone()),
            Self::Conjunction(terms) => terms.iter().for_each(|t| t.collect(out)),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

fn parse_comparison(items: &[Value]) -> Option<Predicate> {
    let [op, field, value] = items else {
        return None;
    };
    let op = Operator::parse(op.as_str()?)?;
    let field = field.as_str()?.strip_prefix('$').filter(|f| !f.is_empty())?;
    let value = value.as_str().filter(|v| !v.is_empty())?;
    Some(Predicate::new(field, op, value))
}

/// Compile a requirement expression into its ordered predicate list.
pub fn compile_requirements(value: &Value) -> ReservationResult<Vec<Predicate>> {
    Expression::from_json(value).map(|e| e.predicates())
}

/// Compile the textual encoding into normalized predicate strings.
pub fn compile_requirements_str(text: &str) -> ReservationResult<Vec<String>> {
    Ok(Expression::parse_str(text)?
        .predicates()
        .iter()
        .map(ToString::to_string)
        .collect())
}
