//! Field validation rules.
//!
//! A [`Rule`] is a predicate over a [`Value`]. Its [`RuleType`] follows from
//! how it was built:
//!
//! | Built from                         | Type       | Passes when                 |
//! |------------------------------------|------------|-----------------------------|
//! | text / number / bool value         | that type  | value equals it             |
//! | array value                        | `Array`    | value equals one element    |
//! | [`Regex`]                          | `Regexp`   | text matches the pattern    |
//! | closure                            | `Function` | closure returns `true`      |
//! | [`RangeRule`]                      | `Number`   | number falls in any range   |
//!
//! [`Rule::test`] never panics. A custom predicate that panics is logged and
//! counts as a failed validation.

use crate::error::{CoreError, CoreResult};
use crate::value::Value;
use regex::Regex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

/// Custom validation predicate.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Kind of check a rule performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleType {
    /// Exact match against a text value.
    String,
    /// Exact match against a number, or a numeric range.
    Number,
    /// Exact match against a boolean.
    Boolean,
    /// Regular expression match.
    Regexp,
    /// Membership in an enumeration.
    Array,
    /// Custom predicate.
    Function,
    /// Exact match against null or a map.
    Object,
}

#[derive(Clone)]
enum Check {
    Exact(Value),
    Pattern(Regex),
    Enumeration(Vec<Value>),
    Custom(Predicate),
    Range(RangeRule),
}

/// A named predicate over field values.
#[derive(Clone)]
pub struct Rule {
    name: String,
    check: Check,
}

impl Rule {
    /// Infers the rule from a value's shape: arrays become enumerations,
    /// everything else an exact match.
    pub fn from_value(value: impl Into<Value>) -> Self {
        let check = match value.into() {
            Value::Array(items) => Check::Enumeration(items),
            other => Check::Exact(other),
        };
        Self {
            name: "rule".to_string(),
            check,
        }
    }

    /// Exact-match rule.
    pub fn exact(value: impl Into<Value>) -> Self {
        Self {
            name: "exact".to_string(),
            check: Check::Exact(value.into()),
        }
    }

    /// Pattern rule.
    pub fn pattern(regex: Regex) -> Self {
        Self {
            name: "pattern".to_string(),
            check: Check::Pattern(regex),
        }
    }

    /// Enumeration rule.
    pub fn enumeration<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            name: "enum".to_string(),
            check: Check::Enumeration(values.into_iter().map(Into::into).collect()),
        }
    }

    /// Custom predicate rule.
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self {
            name: "custom".to_string(),
            check: Check::Custom(Arc::new(predicate)),
        }
    }

    /// Renames the rule. Names show up in validation errors.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Rule name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind of check this rule performs.
    pub fn rule_type(&self) -> RuleType {
        match &self.check {
            Check::Exact(Value::Text(_)) => RuleType::String,
            Check::Exact(Value::Integer(_) | Value::Float(_)) => RuleType::Number,
            Check::Exact(Value::Bool(_)) => RuleType::Boolean,
            Check::Exact(_) => RuleType::Object,
            Check::Pattern(_) => RuleType::Regexp,
            Check::Enumeration(_) => RuleType::Array,
            Check::Custom(_) => RuleType::Function,
            Check::Range(_) => RuleType::Number,
        }
    }

    /// The range rule inside, if this is one.
    pub fn as_range(&self) -> Option<&RangeRule> {
        match &self.check {
            Check::Range(range) => Some(range),
            _ => None,
        }
    }

    /// Evaluates the rule.
    pub fn test(&self, value: &Value) -> bool {
        match &self.check {
            Check::Exact(expected) => loosely_equal(expected, value),
            Check::Pattern(regex) => match value {
                Value::Text(s) => regex.is_match(s),
                Value::Integer(_) | Value::Float(_) => regex.is_match(&value.to_string()),
                _ => false,
            },
            Check::Enumeration(items) => items.iter().any(|item| loosely_equal(item, value)),
            Check::Custom(predicate) => {
                match catch_unwind(AssertUnwindSafe(|| predicate(value))) {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(rule = %self.name, "custom rule panicked; treating value as invalid");
                        false
                    }
                }
            }
            Check::Range(range) => range.test(value),
        }
    }
}

impl From<Regex> for Rule {
    fn from(regex: Regex) -> Self {
        Self::pattern(regex)
    }
}

impl From<RangeRule> for Rule {
    fn from(range: RangeRule) -> Self {
        Self {
            name: range.name.clone(),
            check: Check::Range(range),
        }
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Rule");
        s.field("name", &self.name).field("type", &self.rule_type());
        match &self.check {
            Check::Exact(v) => s.field("value", v),
            Check::Pattern(r) => s.field("pattern", &r.as_str()),
            Check::Enumeration(items) => s.field("values", items),
            Check::Custom(_) => s.field("predicate", &"<fn>"),
            Check::Range(r) => s.field("ranges", &r.ranges),
        };
        s.finish()
    }
}

/// Numbers compare by value regardless of integer/float representation.
fn loosely_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// An inclusive numeric interval. Either end may be open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range {
    min: Option<f64>,
    max: Option<f64>,
}

impl Range {
    /// Creates a range, rejecting `max < min`.
    pub fn new(min: Option<f64>, max: Option<f64>) -> CoreResult<Self> {
        if let (Some(lo), Some(hi)) = (min, max) {
            if hi < lo {
                return Err(CoreError::invalid_range(lo, hi));
            }
        }
        Ok(Self { min, max })
    }

    /// `[min, max]`.
    pub fn between(min: f64, max: f64) -> CoreResult<Self> {
        Self::new(Some(min), Some(max))
    }

    /// `[min, +inf)`.
    pub fn at_least(min: f64) -> Self {
        Self {
            min: Some(min),
            max: None,
        }
    }

    /// `(-inf, max]`.
    pub fn at_most(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    /// Lower bound.
    pub fn min(&self) -> Option<f64> {
        self.min
    }

    /// Upper bound.
    pub fn max(&self) -> Option<f64> {
        self.max
    }

    /// Whether `x` falls inside, bounds included.
    pub fn contains(&self, x: f64) -> bool {
        self.min.map_or(true, |lo| x >= lo) && self.max.map_or(true, |hi| x <= hi)
    }
}

/// Parses `"25->50"`, `"100->null"`, `"null->-50"`.
impl FromStr for Range {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lo, hi) = s
            .split_once("->")
            .ok_or_else(|| CoreError::invalid_config(format!("malformed range: {s}")))?;
        let bound = |part: &str| -> CoreResult<Option<f64>> {
            let part = part.trim();
            if part.is_empty() || part.eq_ignore_ascii_case("null") {
                return Ok(None);
            }
            part.parse::<f64>()
                .map(Some)
                .map_err(|_| CoreError::invalid_config(format!("malformed range bound: {part}")))
        };
        Range::new(bound(lo)?, bound(hi)?)
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.min {
            Some(lo) => write!(f, "{lo}")?,
            None => write!(f, "null")?,
        }
        write!(f, "->")?;
        match self.max {
            Some(hi) => write!(f, "{hi}"),
            None => write!(f, "null"),
        }
    }
}

/// A set of numeric ranges; a number is valid if any range contains it.
///
/// Ranges may overlap. With no ranges at all, every number passes.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeRule {
    name: String,
    ranges: Vec<Range>,
}

impl RangeRule {
    /// Creates a range rule.
    pub fn new(name: impl Into<String>, ranges: Vec<Range>) -> Self {
        Self {
            name: name.into(),
            ranges,
        }
    }

    /// Creates a range rule from `(min, max)` pairs, rejecting `max < min`.
    pub fn from_pairs(
        name: impl Into<String>,
        pairs: &[(Option<f64>, Option<f64>)],
    ) -> CoreResult<Self> {
        let ranges = pairs
            .iter()
            .map(|&(lo, hi)| Range::new(lo, hi))
            .collect::<CoreResult<Vec<_>>>()?;
        Ok(Self::new(name, ranges))
    }

    /// Rule name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current ranges.
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    /// Adds a range.
    pub fn add_range(&mut self, range: Range) {
        self.ranges.push(range);
    }

    /// Removes every range equal to `range`. Returns `true` if any matched.
    pub fn remove_range(&mut self, range: &Range) -> bool {
        let before = self.ranges.len();
        self.ranges.retain(|r| r != range);
        self.ranges.len() != before
    }

    /// Replaces all ranges.
    pub fn set_range(&mut self, ranges: Vec<Range>) {
        self.ranges = ranges;
    }

    /// Evaluates the rule. Non-numeric values fail, and with no ranges left
    /// every value fails.
    pub fn test(&self, value: &Value) -> bool {
        let Some(x) = value.as_f64() else {
            return false;
        };
        self.ranges.iter().any(|r| r.contains(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ranges() -> RangeRule {
        RangeRule::new(
            "rangetest",
            vec![
                Range::at_most(-50.0),
                Range::between(-10.0, -5.0).unwrap(),
                Range::between(10.0, 20.0).unwrap(),
                "25->50".parse().unwrap(),
                "100->null".parse().unwrap(),
            ],
        )
    }

    #[test]
    fn exact_text() {
        let rule = Rule::from_value("test");
        assert_eq!(rule.rule_type(), RuleType::String);
        assert!(rule.test(&Value::from("test")));
        assert!(!rule.test(&Value::from("testing")));
    }

    #[test]
    fn exact_number() {
        let rule = Rule::from_value(10);
        assert_eq!(rule.rule_type(), RuleType::Number);
        assert!(rule.test(&Value::from(10)));
        assert!(rule.test(&Value::from(10.0)));
        assert!(!rule.test(&Value::from(11)));
    }

    #[test]
    fn exact_boolean() {
        let rule = Rule::from_value(true);
        assert_eq!(rule.rule_type(), RuleType::Boolean);
        assert!(rule.test(&Value::from(true)));
        assert!(!rule.test(&Value::from(false)));
    }

    #[test]
    fn pattern() {
        let rule = Rule::from(Regex::new("(?i)^a.*").unwrap());
        assert_eq!(rule.rule_type(), RuleType::Regexp);
        assert!(rule.test(&Value::from("alpha")));
        assert!(rule.test(&Value::from("Alpha")));
        assert!(!rule.test(&Value::from("beta")));
        assert!(!rule.test(&Value::Null));
    }

    #[test]
    fn enumeration() {
        let rule = Rule::from_value(vec![Value::from("a"), Value::from(1), Value::from(true)]);
        assert_eq!(rule.rule_type(), RuleType::Array);
        assert!(rule.test(&Value::from(1)));
        assert!(!rule.test(&Value::from(false)));
    }

    #[test]
    fn custom_predicate() {
        let rule = Rule::custom(|v| v.as_text() == Some("another test"));
        assert_eq!(rule.rule_type(), RuleType::Function);
        assert!(rule.test(&Value::from("another test")));
        assert!(!rule.test(&Value::from("bob")));
    }

    #[test]
    fn panicking_predicate_is_invalid() {
        let rule = Rule::custom(|v| v.as_integer().expect("integer required") > 0);
        assert!(rule.test(&Value::from(3)));
        assert!(!rule.test(&Value::from("not a number")));
    }

    #[test]
    fn range_rule() {
        let mut rule = sample_ranges();
        assert_eq!(rule.ranges().len(), 5);
        assert!(!rule.test(&Value::from(0)));
        assert!(rule.test(&Value::from(150)));

        assert!(rule.remove_range(&Range::at_most(-50.0)));
        assert_eq!(rule.ranges().len(), 4);
        assert!(!rule.test(&Value::from(-75)));

        rule.add_range(Range::between(-70.0, -60.0).unwrap());
        assert_eq!(rule.ranges().len(), 5);
        assert!(rule.test(&Value::from(-65)));

        rule.set_range(vec![Range::between(1.0, 5.0).unwrap()]);
        assert_eq!(rule.ranges().len(), 1);
        assert!(rule.test(&Value::from(3)) && !rule.test(&Value::from(10)));

        assert!(rule.remove_range(&Range::between(1.0, 5.0).unwrap()));
        assert!(rule.ranges().is_empty());
        assert!(!rule.test(&Value::from(3)));
        assert!(!rule.test(&Value::from(1000)));
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let rule = RangeRule::new("bounds", vec![Range::between(1.0, 10.0).unwrap()]);
        assert!(rule.test(&Value::from(1)));
        assert!(rule.test(&Value::from(10)));
        assert!(!rule.test(&Value::from(10.5)));
        assert!(!rule.test(&Value::from("5")));
    }

    #[test]
    fn inverted_range_is_rejected() {
        assert!(matches!(
            Range::between(50.0, 10.0),
            Err(CoreError::InvalidRange { .. })
        ));
        assert!(RangeRule::from_pairs("bad", &[(Some(50.0), Some(10.0))]).is_err());
        assert!("50->10".parse::<Range>().is_err());
        assert!("fifty".parse::<Range>().is_err());
    }

    #[test]
    fn range_text_round_trip() {
        let range: Range = "null->-50".parse().unwrap();
        assert_eq!(range, Range::at_most(-50.0));
        assert_eq!(range.to_string(), "null->-50");
    }

    #[test]
    fn range_rule_wraps_into_rule() {
        let rule = Rule::from(sample_ranges());
        assert_eq!(rule.rule_type(), RuleType::Number);
        assert_eq!(rule.name(), "rangetest");
        assert!(rule.as_range().is_some());
    }
}
