//! Atomization, comparisons and arithmetic over atomic items.

use std::cmp::Ordering;

use common_error::{dynamic_err, ErrorCode, XylemError, XylemResult};
use serde::{Deserialize, Serialize};
use xylem_core::Item;

use crate::store::NodeStore;

/// Canonical lexical form of an atomic item.
pub fn canonical_string(item: &Item) -> String {
    match item {
        Item::Boolean(b) => b.to_string(),
        Item::Integer(i) => i.to_string(),
        Item::Double(d) => double_string(*d),
        Item::String(s) | Item::Untyped(s) => s.clone(),
        Item::Node(_) => item.to_string(),
    }
}

fn double_string(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_string();
    }
    if d.is_infinite() {
        return if d > 0.0 { "INF" } else { "-INF" }.to_string();
    }
    let abs = d.abs();
    if abs == 0.0 || (1e-6..1e6).contains(&abs) {
        return format!("{d}");
    }
    let sci = format!("{d:E}");
    match sci.split_once('E') {
        Some((mantissa, exp)) if !mantissa.contains('.') => format!("{mantissa}.0E{exp}"),
        _ => sci,
    }
}

/// Replace every node by its untyped string value.
pub fn atomize(items: &[Item], store: &dyn NodeStore) -> Vec<Item> {
    items
        .iter()
        .map(|item| match item {
            Item::Node(n) => Item::Untyped(store.string_value(*n)),
            other => other.clone(),
        })
        .collect()
}

/// Effective boolean value of a sequence.
pub fn effective_boolean_value(items: &[Item]) -> XylemResult<bool> {
    match items {
        [] => Ok(false),
        [Item::Node(_), ..] => Ok(true),
        [single] => Ok(match single {
            Item::Boolean(b) => *b,
            Item::Integer(i) => *i != 0,
            Item::Double(d) => *d != 0.0 && !d.is_nan(),
            Item::String(s) | Item::Untyped(s) => !s.is_empty(),
            Item::Node(_) => true,
        }),
        _ => dynamic_err!(
            FORG0006,
            "effective boolean value is not defined for a sequence of {} atomic values",
            items.len()
        ),
    }
}

/// A numeric operand after promotion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Dbl(f64),
}

impl Numeric {
    /// Numeric value of an atomic item; untyped values are cast to double.
    pub fn from_item(item: &Item) -> XylemResult<Self> {
        match item {
            Item::Integer(i) => Ok(Self::Int(*i)),
            Item::Double(d) => Ok(Self::Dbl(*d)),
            Item::Untyped(s) => parse_double(s).map(Self::Dbl),
            other => Err(XylemError::dynamic(
                ErrorCode::XPTY0004,
                format!("expected a numeric value, got {}", other.type_name()),
            )),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(i) => i as f64,
            Self::Dbl(d) => d,
        }
    }

    pub fn into_item(self) -> Item {
        match self {
            Self::Int(i) => Item::Integer(i),
            Self::Dbl(d) => Item::Double(d),
        }
    }
}

fn parse_double(s: &str) -> XylemResult<f64> {
    match s.trim() {
        "INF" => Ok(f64::INFINITY),
        "-INF" => Ok(f64::NEG_INFINITY),
        "NaN" => Ok(f64::NAN),
        t => t.parse::<f64>().map_err(|_| {
            XylemError::dynamic(ErrorCode::FORG0001, format!("cannot cast \"{s}\" to xs:double"))
        }),
    }
}

/// Arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArithOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    IntegerDivide,
    Mod,
}

impl ArithOp {
    pub fn apply(self, a: Numeric, b: Numeric) -> XylemResult<Item> {
        match (a, b) {
            (Numeric::Int(x), Numeric::Int(y)) => self.apply_int(x, y),
            _ => self.apply_double(a.as_f64(), b.as_f64()),
        }
    }

    fn apply_int(self, x: i64, y: i64) -> XylemResult<Item> {
        let overflow = || XylemError::dynamic(ErrorCode::FOAR0002, "integer overflow");
        let result = match self {
            Self::Add => x.checked_add(y).ok_or_else(overflow)?,
            Self::Subtract => x.checked_sub(y).ok_or_else(overflow)?,
            Self::Multiply => x.checked_mul(y).ok_or_else(overflow)?,
            Self::Divide => {
                if y == 0 {
                    dynamic_err!(FOAR0001, "division by zero");
                }
                return self.apply_double(Numeric::Int(x).as_f64(), Numeric::Int(y).as_f64());
            }
            Self::IntegerDivide | Self::Mod if y == 0 => dynamic_err!(FOAR0001, "division by zero"),
            Self::IntegerDivide => x.checked_div(y).ok_or_else(overflow)?,
            Self::Mod => x.checked_rem(y).ok_or_else(overflow)?,
        };
        Ok(Item::Integer(result))
    }

    #[allow(clippy::cast_possible_truncation)]
    fn apply_double(self, x: f64, y: f64) -> XylemResult<Item> {
        Ok(match self {
            Self::Add => Item::Double(x + y),
            Self::Subtract => Item::Double(x - y),
            Self::Multiply => Item::Double(x * y),
            Self::Divide => Item::Double(x / y),
            Self::Mod => Item::Double(x % y),
            Self::IntegerDivide => {
                if y == 0.0 {
                    dynamic_err!(FOAR0001, "integer division by zero");
                }
                let q = (x / y).trunc();
                if !q.is_finite() || q < i64::MIN as f64 || q >= i64::MAX as f64 {
                    dynamic_err!(FOAR0002, "integer division result out of range");
                }
                Item::Integer(q as i64)
            }
        })
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// Whether the comparison holds; `None` is an unordered (NaN) outcome.
    pub fn holds(self, ordering: Option<Ordering>) -> bool {
        match ordering {
            None => self == Self::Ne,
            Some(o) => match self {
                Self::Eq => o == Ordering::Equal,
                Self::Ne => o != Ordering::Equal,
                Self::Lt => o == Ordering::Less,
                Self::Le => o != Ordering::Greater,
                Self::Gt => o == Ordering::Greater,
                Self::Ge => o != Ordering::Less,
            },
        }
    }
}

/// Compare two atomic items of compatible types.
///
/// Untyped values compare as strings. Returns `Ok(None)` when a NaN is
/// involved.
pub fn compare_atomic(a: &Item, b: &Item) -> XylemResult<Option<Ordering>> {
    match (a, b) {
        (Item::Integer(x), Item::Integer(y)) => Ok(Some(x.cmp(y))),
        (Item::Integer(_) | Item::Double(_), Item::Integer(_) | Item::Double(_)) => {
            let (x, y) = (Numeric::from_item(a)?.as_f64(), Numeric::from_item(b)?.as_f64());
            Ok(x.partial_cmp(&y))
        }
        (Item::String(x) | Item::Untyped(x), Item::String(y) | Item::Untyped(y)) => Ok(Some(x.cmp(y))),
        (Item::Boolean(x), Item::Boolean(y)) => Ok(Some(x.cmp(y))),
        _ => Err(XylemError::dynamic(
            ErrorCode::XPTY0004,
            format!("cannot compare {} with {}", a.type_name(), b.type_name()),
        )),
    }
}

fn singleton<'a>(items: &'a [Item], what: &str) -> XylemResult<Option<&'a Item>> {
    match items {
        [] => Ok(None),
        [one] => Ok(Some(one)),
        _ => dynamic_err!(XPTY0004, "{what} expects at most one item, got {}", items.len()),
    }
}

/// Value comparison over atomized operands; `None` if either is empty.
pub fn value_compare(op: CompareOp, a: &[Item], b: &[Item]) -> XylemResult<Option<bool>> {
    let (Some(x), Some(y)) = (singleton(a, "value comparison")?, singleton(b, "value comparison")?) else {
        return Ok(None);
    };
    Ok(Some(op.holds(compare_atomic(x, y)?)))
}

/// Existential comparison over atomized operands.
pub fn general_compare(op: CompareOp, a: &[Item], b: &[Item]) -> XylemResult<bool> {
    for x in a {
        for y in b {
            let (x, y) = promote_untyped(x, y)?;
            if op.holds(compare_atomic(&x, &y)?) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}

fn promote_untyped(a: &Item, b: &Item) -> XylemResult<(Item, Item)> {
    let cast = |u: &str, other: &Item| -> XylemResult<Item> {
        Ok(match other {
            Item::Integer(_) | Item::Double(_) => Item::Double(parse_double(u)?),
            Item::Boolean(_) => match u.trim() {
                "true" | "1" => Item::Boolean(true),
                "false" | "0" => Item::Boolean(false),
                _ => dynamic_err!(FORG0001, "cannot cast \"{u}\" to xs:boolean"),
            },
            _ => Item::String(u.to_string()),
        })
    };
    match (a, b) {
        (Item::Untyped(u), other) if !matches!(other, Item::Untyped(_)) => Ok((cast(u, other)?, other.clone())),
        (other, Item::Untyped(u)) if !matches!(other, Item::Untyped(_)) => Ok((other.clone(), cast(u, other)?)),
        _ => Ok((a.clone(), b.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_string() {
        assert_eq!(canonical_string(&Item::Double(3.0)), "3");
        assert_eq!(canonical_string(&Item::Double(1.5)), "1.5");
        assert_eq!(canonical_string(&Item::Double(1e20)), "1.0E20");
        assert_eq!(canonical_string(&Item::Double(f64::NAN)), "NaN");
        assert_eq!(canonical_string(&Item::Boolean(true)), "true");
    }

    #[test]
    fn test_effective_boolean_value() {
        assert!(!effective_boolean_value(&[]).unwrap());
        assert!(effective_boolean_value(&[Item::from("a")]).unwrap());
        assert!(!effective_boolean_value(&[Item::from(0i64)]).unwrap());
        let err = effective_boolean_value(&[Item::from(1i64), Item::from(2i64)]).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::FORG0006));
    }

    #[test]
    fn test_arithmetic() {
        let add = ArithOp::Add.apply(Numeric::Int(2), Numeric::Int(3)).unwrap();
        assert_eq!(add, Item::Integer(5));
        let mixed = ArithOp::Multiply.apply(Numeric::Int(2), Numeric::Dbl(1.5)).unwrap();
        assert_eq!(mixed, Item::Double(3.0));
        let div = ArithOp::Divide.apply(Numeric::Int(7), Numeric::Int(2)).unwrap();
        assert_eq!(div, Item::Double(3.5));
        let err = ArithOp::IntegerDivide.apply(Numeric::Int(1), Numeric::Int(0)).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::FOAR0001));
        let err = ArithOp::Add.apply(Numeric::Int(i64::MAX), Numeric::Int(1)).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::FOAR0002));
    }

    #[test]
    fn test_integer_divide_of_doubles_checks_range() {
        let err = ArithOp::IntegerDivide.apply(Numeric::Dbl(1e300), Numeric::Int(1)).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::FOAR0002));
        let err = ArithOp::IntegerDivide.apply(Numeric::Dbl(-1e19), Numeric::Int(1)).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::FOAR0002));
        let q = ArithOp::IntegerDivide.apply(Numeric::Dbl(7.5), Numeric::Int(2)).unwrap();
        assert_eq!(q, Item::Integer(3));
        let q = ArithOp::IntegerDivide.apply(Numeric::Dbl(-9.2e18), Numeric::Int(1)).unwrap();
        assert_eq!(q, Item::Integer(-9_200_000_000_000_000_000));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(
            value_compare(CompareOp::Lt, &[Item::from(1i64)], &[Item::from(1.5)]).unwrap(),
            Some(true)
        );
        assert_eq!(value_compare(CompareOp::Eq, &[], &[Item::from(1i64)]).unwrap(), None);
        assert!(value_compare(CompareOp::Eq, &[Item::from("a")], &[Item::from(1i64)]).is_err());

        let left = [Item::from(1i64), Item::from(2i64)];
        let right = [Item::Untyped("2".into())];
        assert!(general_compare(CompareOp::Eq, &left, &right).unwrap());
        assert!(!general_compare(CompareOp::Gt, &left, &right).unwrap());
        assert!(!general_compare(CompareOp::Eq, &[], &right).unwrap());
    }

    #[test]
    fn test_nan_is_unordered() {
        let nan = [Item::Double(f64::NAN)];
        assert_eq!(value_compare(CompareOp::Eq, &nan, &nan).unwrap(), Some(false));
        assert_eq!(value_compare(CompareOp::Ne, &nan, &nan).unwrap(), Some(true));
    }
}
