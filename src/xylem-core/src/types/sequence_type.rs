//! Static sequence types: an item type plus an occurrence indicator.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::Item;

/// Item type hierarchy.
///
/// ```text
/// item()
/// ├─ node()
/// └─ xs:anyAtomicType
///    ├─ xs:boolean
///    ├─ xs:string
///    ├─ xs:untypedAtomic
///    └─ numeric
///       ├─ xs:integer
///       └─ xs:double
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemType {
    Item,
    Node,
    AnyAtomic,
    Numeric,
    Boolean,
    Integer,
    Double,
    String,
    Untyped,
}

impl ItemType {
    fn parent(self) -> Option<Self> {
        match self {
            Self::Item => None,
            Self::Node | Self::AnyAtomic => Some(Self::Item),
            Self::Numeric | Self::Boolean | Self::String | Self::Untyped => Some(Self::AnyAtomic),
            Self::Integer | Self::Double => Some(Self::Numeric),
        }
    }

    /// Whether `self` is `other` or one of its descendants.
    pub fn is_subtype_of(self, other: Self) -> bool {
        let mut cur = Some(self);
        while let Some(t) = cur {
            if t == other {
                return true;
            }
            cur = t.parent();
        }
        false
    }

    /// Least common supertype.
    pub fn union(self, other: Self) -> Self {
        let mut cur = Some(self);
        while let Some(t) = cur {
            if other.is_subtype_of(t) {
                return t;
            }
            cur = t.parent();
        }
        Self::Item
    }

    /// Whether some value could belong to both types.
    pub fn intersects(self, other: Self) -> bool {
        self.is_subtype_of(other) || other.is_subtype_of(self)
    }

    /// Whether this is an atomic type.
    pub fn is_atomic(self) -> bool {
        self.is_subtype_of(Self::AnyAtomic)
    }

    /// Whether the given item is an instance of this type.
    pub fn matches(self, item: &Item) -> bool {
        item.item_type().is_subtype_of(self)
    }

    /// Display name of the type.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Item => "item()",
            Self::Node => "node()",
            Self::AnyAtomic => "xs:anyAtomicType",
            Self::Numeric => "numeric",
            Self::Boolean => "xs:boolean",
            Self::Integer => "xs:integer",
            Self::Double => "xs:double",
            Self::String => "xs:string",
            Self::Untyped => "xs:untypedAtomic",
        }
    }
}

/// Occurrence indicator of a sequence type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Occurrence {
    /// Exactly zero items.
    Empty,
    /// Exactly one item.
    One,
    /// `?`
    ZeroOrOne,
    /// `*`
    ZeroOrMore,
    /// `+`
    OneOrMore,
}

impl Occurrence {
    /// Minimum and maximum item counts; `None` means unbounded.
    pub fn bounds(self) -> (usize, Option<usize>) {
        match self {
            Self::Empty => (0, Some(0)),
            Self::One => (1, Some(1)),
            Self::ZeroOrOne => (0, Some(1)),
            Self::ZeroOrMore => (0, None),
            Self::OneOrMore => (1, None),
        }
    }

    /// Smallest occurrence covering the given bounds.
    pub fn from_bounds(min: usize, max: Option<usize>) -> Self {
        match (min, max) {
            (_, Some(0)) => Self::Empty,
            (0, Some(1)) => Self::ZeroOrOne,
            (_, Some(1)) => Self::One,
            (0, _) => Self::ZeroOrMore,
            _ => Self::OneOrMore,
        }
    }

    pub fn min(self) -> usize {
        self.bounds().0
    }

    pub fn max(self) -> Option<usize> {
        self.bounds().1
    }

    pub fn is_subtype_of(self, other: Self) -> bool {
        let (min_a, max_a) = self.bounds();
        let (min_b, max_b) = other.bounds();
        let max_ok = match (max_a, max_b) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(a), Some(b)) => a <= b,
        };
        min_a >= min_b && max_ok
    }

    /// Occurrence of a value that has either occurrence.
    pub fn union(self, other: Self) -> Self {
        let (min_a, max_a) = self.bounds();
        let (min_b, max_b) = other.bounds();
        let max = max_a.zip(max_b).map(|(a, b)| a.max(b));
        Self::from_bounds(min_a.min(min_b), max)
    }

    /// Occurrence of the concatenation of two sequences.
    pub fn concat(self, other: Self) -> Self {
        let (min_a, max_a) = self.bounds();
        let (min_b, max_b) = other.bounds();
        let max = max_a.zip(max_b).map(|(a, b)| a + b);
        Self::from_bounds(min_a + min_b, max)
    }

    /// Occurrence of `other` evaluated once per item of `self`.
    pub fn product(self, other: Self) -> Self {
        let (min_a, max_a) = self.bounds();
        let (min_b, max_b) = other.bounds();
        let max = match (max_a, max_b) {
            (Some(0), _) | (_, Some(0)) => Some(0),
            (Some(a), Some(b)) => Some(a * b),
            _ => None,
        };
        Self::from_bounds(min_a * min_b, max)
    }

    /// The same occurrence with the lower bound dropped to zero.
    pub fn optional(self) -> Self {
        Self::from_bounds(0, self.max())
    }

    fn indicator(self) -> &'static str {
        match self {
            Self::Empty | Self::One => "",
            Self::ZeroOrOne => "?",
            Self::ZeroOrMore => "*",
            Self::OneOrMore => "+",
        }
    }
}

/// Static type of an expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceType {
    pub item: ItemType,
    pub occurrence: Occurrence,
}

impl SequenceType {
    pub const fn new(item: ItemType, occurrence: Occurrence) -> Self {
        Self { item, occurrence }
    }

    /// `empty-sequence()`
    pub const fn empty() -> Self {
        Self::new(ItemType::Item, Occurrence::Empty)
    }

    /// Exactly one item of the given type.
    pub const fn one(item: ItemType) -> Self {
        Self::new(item, Occurrence::One)
    }

    /// Zero or one item.
    pub const fn optional(item: ItemType) -> Self {
        Self::new(item, Occurrence::ZeroOrOne)
    }

    /// Zero or more items.
    pub const fn star(item: ItemType) -> Self {
        Self::new(item, Occurrence::ZeroOrMore)
    }

    /// One or more items.
    pub const fn plus(item: ItemType) -> Self {
        Self::new(item, Occurrence::OneOrMore)
    }

    /// `item()*`, the type that admits everything.
    pub const fn any() -> Self {
        Self::star(ItemType::Item)
    }

    /// Static type of a constant sequence.
    pub fn of_items(items: &[Item]) -> Self {
        match items.split_first() {
            None => Self::empty(),
            Some((first, rest)) => {
                let item = rest
                    .iter()
                    .fold(first.item_type(), |t, i| t.union(i.item_type()));
                Self::new(item, Occurrence::from_bounds(items.len(), Some(items.len())))
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.occurrence == Occurrence::Empty
    }

    /// Maximum number of items, `None` if unbounded.
    pub fn max_count(&self) -> Option<usize> {
        self.occurrence.max()
    }

    /// Whether values of this type have at most one item.
    pub fn is_singleton_or_empty(&self) -> bool {
        self.max_count().is_some_and(|m| m <= 1)
    }

    /// Whether every item is a built-in atomic value.
    pub fn is_builtin_atomic(&self) -> bool {
        !self.is_empty() && self.item.is_atomic()
    }

    /// Whether every value of `self` is also a value of `other`.
    pub fn is_subtype_of(&self, other: &Self) -> bool {
        if self.is_empty() {
            return other.occurrence.min() == 0;
        }
        self.item.is_subtype_of(other.item) && self.occurrence.is_subtype_of(other.occurrence)
    }

    /// Whether some value could be an instance of both types.
    pub fn intersects(&self, other: &Self) -> bool {
        let (min_a, max_a) = self.occurrence.bounds();
        let (min_b, max_b) = other.occurrence.bounds();
        let counts_overlap = max_a.map_or(true, |m| m >= min_b) && max_b.map_or(true, |m| m >= min_a);
        let allow_empty = min_a == 0 && min_b == 0;
        counts_overlap && (allow_empty || self.item.intersects(other.item))
    }

    fn merge_item(&self, other: &Self) -> ItemType {
        match (self.is_empty(), other.is_empty()) {
            (true, _) => other.item,
            (_, true) => self.item,
            _ => self.item.union(other.item),
        }
    }

    /// Type of a value that has either type.
    pub fn union(&self, other: &Self) -> Self {
        Self::new(self.merge_item(other), self.occurrence.union(other.occurrence))
    }

    /// Type of the concatenation of values of both types.
    pub fn concat(&self, other: &Self) -> Self {
        Self::new(self.merge_item(other), self.occurrence.concat(other.occurrence))
    }

    /// Same item type with a different occurrence.
    pub fn with_occurrence(&self, occurrence: Occurrence) -> Self {
        Self::new(self.item, occurrence)
    }

    /// Whether a concrete sequence is an instance of this type.
    pub fn matches(&self, items: &[Item]) -> bool {
        let (min, max) = self.occurrence.bounds();
        let count_ok = items.len() >= min && max.map_or(true, |m| items.len() <= m);
        count_ok && items.iter().all(|i| self.item.matches(i))
    }
}

impl fmt::Display for SequenceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("empty-sequence()");
        }
        write!(f, "{}{}", self.item.display_name(), self.occurrence.indicator())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_type_hierarchy() {
        assert!(ItemType::Integer.is_subtype_of(ItemType::Numeric));
        assert!(ItemType::Integer.is_subtype_of(ItemType::Item));
        assert!(!ItemType::Node.is_subtype_of(ItemType::AnyAtomic));
        assert_eq!(ItemType::Integer.union(ItemType::Double), ItemType::Numeric);
        assert_eq!(ItemType::String.union(ItemType::Integer), ItemType::AnyAtomic);
        assert_eq!(ItemType::Node.union(ItemType::String), ItemType::Item);
    }

    #[test]
    fn test_occurrence_arithmetic() {
        assert_eq!(Occurrence::One.concat(Occurrence::One), Occurrence::OneOrMore);
        assert_eq!(Occurrence::Empty.concat(Occurrence::ZeroOrOne), Occurrence::ZeroOrOne);
        assert_eq!(Occurrence::One.union(Occurrence::Empty), Occurrence::ZeroOrOne);
        assert_eq!(Occurrence::One.product(Occurrence::One), Occurrence::One);
        assert_eq!(Occurrence::ZeroOrMore.product(Occurrence::Empty), Occurrence::Empty);
        assert!(Occurrence::One.is_subtype_of(Occurrence::ZeroOrMore));
        assert!(!Occurrence::ZeroOrMore.is_subtype_of(Occurrence::OneOrMore));
    }

    #[test]
    fn test_sequence_type_subtyping() {
        let int1 = SequenceType::one(ItemType::Integer);
        let num_star = SequenceType::star(ItemType::Numeric);
        assert!(int1.is_subtype_of(&num_star));
        assert!(!num_star.is_subtype_of(&int1));
        assert!(SequenceType::empty().is_subtype_of(&num_star));
        assert!(!SequenceType::empty().is_subtype_of(&int1));
        assert!(int1.is_singleton_or_empty());
        assert!(int1.is_builtin_atomic());
        assert!(!SequenceType::star(ItemType::Node).is_builtin_atomic());
    }

    #[test]
    fn test_of_items_and_matches() {
        let items = vec![Item::Integer(1), Item::Double(2.0)];
        let t = SequenceType::of_items(&items);
        assert_eq!(t.item, ItemType::Numeric);
        assert_eq!(t.occurrence, Occurrence::OneOrMore);
        assert!(t.matches(&items));
        assert!(!SequenceType::one(ItemType::Integer).matches(&items));
        assert_eq!(SequenceType::of_items(&[]), SequenceType::empty());
    }

    #[test]
    fn test_intersects() {
        let s = SequenceType::one(ItemType::String);
        let i = SequenceType::one(ItemType::Integer);
        assert!(!s.intersects(&i));
        assert!(SequenceType::optional(ItemType::String).intersects(&SequenceType::optional(ItemType::Integer)));
        assert!(s.intersects(&SequenceType::any()));
    }

    #[test]
    fn test_display() {
        assert_eq!(SequenceType::optional(ItemType::Integer).to_string(), "xs:integer?");
        assert_eq!(SequenceType::star(ItemType::Node).to_string(), "node()*");
        assert_eq!(SequenceType::empty().to_string(), "empty-sequence()");
    }
}
