//! Property-based tests for the static type algebra.

use proptest::prelude::*;

use crate::types::{Item, ItemType, Occurrence, SequenceType};

fn arb_item() -> impl Strategy<Value = Item> {
    prop_oneof![
        any::<bool>().prop_map(Item::Boolean),
        any::<i64>().prop_map(Item::Integer),
        any::<i32>().prop_map(|i| Item::Double(f64::from(i))),
        "[a-z]{0,8}".prop_map(Item::String),
        "[0-9]{1,4}".prop_map(Item::Untyped),
    ]
}

fn arb_item_type() -> impl Strategy<Value = ItemType> {
    prop_oneof![
        Just(ItemType::Item),
        Just(ItemType::Node),
        Just(ItemType::AnyAtomic),
        Just(ItemType::Numeric),
        Just(ItemType::Boolean),
        Just(ItemType::Integer),
        Just(ItemType::Double),
        Just(ItemType::String),
        Just(ItemType::Untyped),
    ]
}

fn arb_occurrence() -> impl Strategy<Value = Occurrence> {
    prop_oneof![
        Just(Occurrence::Empty),
        Just(Occurrence::One),
        Just(Occurrence::ZeroOrOne),
        Just(Occurrence::ZeroOrMore),
        Just(Occurrence::OneOrMore),
    ]
}

proptest! {
    #[test]
    fn prop_of_items_matches_its_items(items in prop::collection::vec(arb_item(), 0..6)) {
        let t = SequenceType::of_items(&items);
        prop_assert!(t.matches(&items));
    }

    #[test]
    fn prop_union_is_supertype(a in arb_item_type(), b in arb_item_type()) {
        let u = a.union(b);
        prop_assert!(a.is_subtype_of(u));
        prop_assert!(b.is_subtype_of(u));
    }

    #[test]
    fn prop_occurrence_union_covers_both(a in arb_occurrence(), b in arb_occurrence()) {
        let u = a.union(b);
        prop_assert!(a.is_subtype_of(u));
        prop_assert!(b.is_subtype_of(u));
    }

    #[test]
    fn prop_concat_of_matching_sequences_matches_concat_type(
        left in prop::collection::vec(arb_item(), 0..4),
        right in prop::collection::vec(arb_item(), 0..4),
    ) {
        let lt = SequenceType::of_items(&left);
        let rt = SequenceType::of_items(&right);
        let all: Vec<Item> = left.iter().chain(right.iter()).cloned().collect();
        prop_assert!(lt.concat(&rt).matches(&all));
    }
}
