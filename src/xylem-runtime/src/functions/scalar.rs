//! Functions evaluated over fully materialized arguments.

use common_error::{dynamic_err, ErrorCode, XylemError, XylemResult};
use xylem_core::Item;

use super::atomic::{
    atomize, canonical_string, compare_atomic, effective_boolean_value, general_compare,
    value_compare, ArithOp, CompareOp, Numeric,
};
use crate::DynamicContext;

/// A function whose result is computed from its materialized arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarOp {
    Arith(ArithOp),
    ValueCompare(CompareOp),
    GeneralCompare(CompareOp),
    And,
    Or,
    Not,
    Boolean,
    Count,
    Sum,
    Empty,
    Exists,
    DistinctValues,
    Reverse,
    Subsequence,
    StringConcat,
    String,
    StringLength,
    Data,
    ZeroOrOne,
    OneOrMore,
    ExactlyOne,
    RandomNumber,
    Error,
}

/// Stable wire tags. The persisted plan format depends on these strings.
const TAGS: &[(&str, ScalarOp)] = &[
    ("add", ScalarOp::Arith(ArithOp::Add)),
    ("subtract", ScalarOp::Arith(ArithOp::Subtract)),
    ("multiply", ScalarOp::Arith(ArithOp::Multiply)),
    ("divide", ScalarOp::Arith(ArithOp::Divide)),
    ("integer-divide", ScalarOp::Arith(ArithOp::IntegerDivide)),
    ("mod", ScalarOp::Arith(ArithOp::Mod)),
    ("value-eq", ScalarOp::ValueCompare(CompareOp::Eq)),
    ("value-ne", ScalarOp::ValueCompare(CompareOp::Ne)),
    ("value-lt", ScalarOp::ValueCompare(CompareOp::Lt)),
    ("value-le", ScalarOp::ValueCompare(CompareOp::Le)),
    ("value-gt", ScalarOp::ValueCompare(CompareOp::Gt)),
    ("value-ge", ScalarOp::ValueCompare(CompareOp::Ge)),
    ("general-eq", ScalarOp::GeneralCompare(CompareOp::Eq)),
    ("general-ne", ScalarOp::GeneralCompare(CompareOp::Ne)),
    ("general-lt", ScalarOp::GeneralCompare(CompareOp::Lt)),
    ("general-le", ScalarOp::GeneralCompare(CompareOp::Le)),
    ("general-gt", ScalarOp::GeneralCompare(CompareOp::Gt)),
    ("general-ge", ScalarOp::GeneralCompare(CompareOp::Ge)),
    ("and", ScalarOp::And),
    ("or", ScalarOp::Or),
    ("not", ScalarOp::Not),
    ("boolean", ScalarOp::Boolean),
    ("count", ScalarOp::Count),
    ("sum", ScalarOp::Sum),
    ("empty", ScalarOp::Empty),
    ("exists", ScalarOp::Exists),
    ("distinct-values", ScalarOp::DistinctValues),
    ("reverse", ScalarOp::Reverse),
    ("subsequence", ScalarOp::Subsequence),
    ("concat", ScalarOp::StringConcat),
    ("string", ScalarOp::String),
    ("string-length", ScalarOp::StringLength),
    ("data", ScalarOp::Data),
    ("zero-or-one", ScalarOp::ZeroOrOne),
    ("one-or-more", ScalarOp::OneOrMore),
    ("exactly-one", ScalarOp::ExactlyOne),
    ("random-number", ScalarOp::RandomNumber),
    ("error", ScalarOp::Error),
];

impl ScalarOp {
    /// Stable tag used by the plan codec and `explain`.
    pub fn tag(self) -> &'static str {
        TAGS.iter()
            .find(|(_, op)| *op == self)
            .map_or("unknown", |(tag, _)| tag)
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        TAGS.iter().find(|(t, _)| *t == tag).map(|(_, op)| *op)
    }

    /// Evaluate over materialized arguments.
    pub fn eval(self, args: Vec<Vec<Item>>, ctx: &DynamicContext) -> XylemResult<Vec<Item>> {
        let store = ctx.store.as_ref();
        match self {
            Self::Arith(op) => {
                let [a, b] = fixed::<2>(self, args)?;
                let (a, b) = (atomize(&a, store), atomize(&b, store));
                match (single(&a)?, single(&b)?) {
                    (Some(x), Some(y)) => {
                        Ok(vec![op.apply(Numeric::from_item(x)?, Numeric::from_item(y)?)?])
                    }
                    _ => Ok(Vec::new()),
                }
            }
            Self::ValueCompare(op) => {
                let [a, b] = fixed::<2>(self, args)?;
                let result = value_compare(op, &atomize(&a, store), &atomize(&b, store))?;
                Ok(result.map(Item::Boolean).into_iter().collect())
            }
            Self::GeneralCompare(op) => {
                let [a, b] = fixed::<2>(self, args)?;
                let result = general_compare(op, &atomize(&a, store), &atomize(&b, store))?;
                Ok(vec![Item::Boolean(result)])
            }
            Self::And | Self::Or => {
                let [a, b] = fixed::<2>(self, args)?;
                let (x, y) = (effective_boolean_value(&a)?, effective_boolean_value(&b)?);
                let result = if self == Self::And { x && y } else { x || y };
                Ok(vec![Item::Boolean(result)])
            }
            Self::Not | Self::Boolean => {
                let [a] = fixed::<1>(self, args)?;
                let ebv = effective_boolean_value(&a)?;
                Ok(vec![Item::Boolean(if self == Self::Not { !ebv } else { ebv })])
            }
            Self::Count => {
                let [a] = fixed::<1>(self, args)?;
                Ok(vec![Item::Integer(a.len() as i64)])
            }
            Self::Empty | Self::Exists => {
                let [a] = fixed::<1>(self, args)?;
                Ok(vec![Item::Boolean(a.is_empty() == (self == Self::Empty))])
            }
            Self::Sum => {
                let [a] = fixed::<1>(self, args)?;
                sum(&atomize(&a, store)).map(|item| vec![item])
            }
            Self::DistinctValues => {
                let [a] = fixed::<1>(self, args)?;
                distinct_values(atomize(&a, store))
            }
            Self::Reverse => {
                let [mut a] = fixed::<1>(self, args)?;
                a.reverse();
                Ok(a)
            }
            Self::Subsequence => subsequence(args),
            Self::StringConcat => {
                let mut out = String::new();
                for arg in &args {
                    let atomized = atomize(arg, store);
                    if let Some(item) = single(&atomized)? {
                        out.push_str(&canonical_string(item));
                    }
                }
                Ok(vec![Item::String(out)])
            }
            Self::String | Self::StringLength => {
                let [a] = fixed::<1>(self, args)?;
                let atomized = atomize(&a, store);
                let s = single(&atomized)?.map(canonical_string).unwrap_or_default();
                if self == Self::String {
                    Ok(vec![Item::String(s)])
                } else {
                    Ok(vec![Item::Integer(s.chars().count() as i64)])
                }
            }
            Self::Data => {
                let [a] = fixed::<1>(self, args)?;
                Ok(atomize(&a, store))
            }
            Self::ZeroOrOne => {
                let [a] = fixed::<1>(self, args)?;
                if a.len() > 1 {
                    dynamic_err!(FORG0003, "fn:zero-or-one called with {} items", a.len());
                }
                Ok(a)
            }
            Self::OneOrMore => {
                let [a] = fixed::<1>(self, args)?;
                if a.is_empty() {
                    dynamic_err!(FORG0004, "fn:one-or-more called with an empty sequence");
                }
                Ok(a)
            }
            Self::ExactlyOne => {
                let [a] = fixed::<1>(self, args)?;
                if a.len() != 1 {
                    dynamic_err!(FORG0005, "fn:exactly-one called with {} items", a.len());
                }
                Ok(a)
            }
            Self::RandomNumber => Ok(vec![Item::Double(rand::random::<f64>())]),
            Self::Error => {
                let message = args
                    .first()
                    .map(|a| atomize(a, store))
                    .and_then(|a| a.first().map(canonical_string))
                    .unwrap_or_else(|| "error raised by fn:error".to_string());
                Err(XylemError::dynamic(ErrorCode::FOER0000, message))
            }
        }
    }
}

fn fixed<const N: usize>(op: ScalarOp, args: Vec<Vec<Item>>) -> XylemResult<[Vec<Item>; N]> {
    let got = args.len();
    args.try_into().map_err(|_| {
        XylemError::internal(format!("{} evaluated with {got} arguments, expected {N}", op.tag()))
    })
}

fn single(items: &[Item]) -> XylemResult<Option<&Item>> {
    match items {
        [] => Ok(None),
        [one] => Ok(Some(one)),
        _ => dynamic_err!(XPTY0004, "expected at most one item, got {}", items.len()),
    }
}

fn sum(items: &[Item]) -> XylemResult<Item> {
    let mut acc = Numeric::Int(0);
    for item in items {
        let n = Numeric::from_item(item).map_err(|_| {
            XylemError::dynamic(
                ErrorCode::FORG0006,
                format!("fn:sum over non-numeric value {}", item.type_name()),
            )
        })?;
        acc = match ArithOp::Add.apply(acc, n)? {
            Item::Integer(i) => Numeric::Int(i),
            other => Numeric::Dbl(other.as_double().unwrap_or(f64::NAN)),
        };
    }
    Ok(acc.into_item())
}

fn distinct_values(items: Vec<Item>) -> XylemResult<Vec<Item>> {
    let mut out: Vec<Item> = Vec::new();
    for item in items {
        let mut seen = false;
        for kept in &out {
            let equal = match compare_atomic(kept, &item) {
                Ok(Some(ordering)) => ordering.is_eq(),
                Ok(None) => kept.as_double().is_some_and(f64::is_nan) && item.as_double().is_some_and(f64::is_nan),
                Err(_) => false,
            };
            if equal {
                seen = true;
                break;
            }
        }
        if !seen {
            out.push(item);
        }
    }
    Ok(out)
}

#[allow(clippy::cast_precision_loss)]
fn subsequence(args: Vec<Vec<Item>>) -> XylemResult<Vec<Item>> {
    let got = args.len();
    let mut args = args.into_iter();
    let (Some(seq), Some(start)) = (args.next(), args.next()) else {
        return Err(XylemError::internal(format!("subsequence evaluated with {got} arguments")));
    };
    let length = args.next();

    let round = |items: &[Item]| -> XylemResult<f64> {
        match single(items)? {
            Some(item) => Ok((Numeric::from_item(item)?.as_f64() + 0.5).floor()),
            None => dynamic_err!(XPTY0004, "fn:subsequence requires a numeric position"),
        }
    };
    let first = round(&start)?;
    let end = match length {
        Some(len) => first + round(&len)?,
        None => f64::INFINITY,
    };

    Ok(seq
        .into_iter()
        .enumerate()
        .filter(|(i, _)| {
            let p = (*i + 1) as f64;
            p >= first && p < end
        })
        .map(|(_, item)| item)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Vec<Item> {
        values.iter().map(|v| Item::Integer(*v)).collect()
    }

    #[test]
    fn test_tags_roundtrip() {
        for (tag, op) in TAGS {
            assert_eq!(op.tag(), *tag);
            assert_eq!(ScalarOp::from_tag(tag), Some(*op));
        }
        assert_eq!(ScalarOp::from_tag("nope"), None);
    }

    #[test]
    fn test_aggregates() {
        let ctx = DynamicContext::default();
        assert_eq!(
            ScalarOp::Count.eval(vec![ints(&[1, 2, 3])], &ctx).unwrap(),
            vec![Item::Integer(3)]
        );
        assert_eq!(
            ScalarOp::Sum.eval(vec![ints(&[1, 2, 3])], &ctx).unwrap(),
            vec![Item::Integer(6)]
        );
        assert_eq!(
            ScalarOp::Sum.eval(vec![vec![]], &ctx).unwrap(),
            vec![Item::Integer(0)]
        );
        assert_eq!(
            ScalarOp::DistinctValues
                .eval(vec![vec![Item::Integer(1), Item::Double(1.0), Item::from("1")]], &ctx)
                .unwrap(),
            vec![Item::Integer(1), Item::from("1")]
        );
    }

    #[test]
    fn test_subsequence() {
        let ctx = DynamicContext::default();
        let out = ScalarOp::Subsequence
            .eval(vec![ints(&[1, 2, 3, 4, 5]), ints(&[2]), ints(&[3])], &ctx)
            .unwrap();
        assert_eq!(out, ints(&[2, 3, 4]));
        let out = ScalarOp::Subsequence
            .eval(vec![ints(&[1, 2, 3]), vec![Item::Double(2.5)]], &ctx)
            .unwrap();
        assert_eq!(out, ints(&[3]));
    }

    #[test]
    fn test_cardinality_checks() {
        let ctx = DynamicContext::default();
        let err = ScalarOp::ExactlyOne.eval(vec![ints(&[1, 2])], &ctx).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::FORG0005));
        let err = ScalarOp::OneOrMore.eval(vec![vec![]], &ctx).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::FORG0004));
        let err = ScalarOp::Error.eval(vec![vec![Item::from("boom")]], &ctx).unwrap_err();
        assert_eq!(err.to_string(), "DynamicError [FOER0000]: boom");
    }

    #[test]
    fn test_arity_defect_is_internal() {
        let ctx = DynamicContext::default();
        let err = ScalarOp::Count.eval(vec![], &ctx).unwrap_err();
        assert!(matches!(err, XylemError::Internal(_)));
    }

    #[test]
    fn test_string_functions() {
        let ctx = DynamicContext::default();
        let out = ScalarOp::StringConcat
            .eval(vec![vec![Item::from("a")], vec![], ints(&[1])], &ctx)
            .unwrap();
        assert_eq!(out, vec![Item::from("a1")]);
        let out = ScalarOp::StringLength.eval(vec![vec![Item::from("héllo")]], &ctx).unwrap();
        assert_eq!(out, vec![Item::Integer(5)]);
    }
}
