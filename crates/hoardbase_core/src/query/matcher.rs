use super::predicate::Predicate;
use hoardbase_codec::{Document, Value};

/// Returns true if every condition of `predicate` holds for `document`.
///
/// Each path must resolve to a value equal to the condition's literal;
/// equality is type-strict, so `1` does not match `1.0` or `"1"`. A path
/// that does not resolve never matches.
#[must_use]
pub fn matches(document: &Document, predicate: &Predicate) -> bool {
    predicate
        .conditions()
        .iter()
        .all(|condition| resolve(document, condition.path()) == Some(condition.value()))
}

/// The value at `path`, if every segment but the last names a map.
pub(crate) fn resolve<'a>(document: &'a Document, path: &[String]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut current = document.get(first)?;
    for segment in rest {
        current = current.as_document()?.get(segment)?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoardbase_codec::doc;
    use proptest::prelude::*;

    fn person() -> Document {
        doc! {
            "name" => "Ada",
            "age" => 36,
            "score" => 9.5,
            "tags" => vec!["math", "poetry"],
            "address" => doc! { "city" => "London", "zip" => Value::Null },
        }
    }

    #[test]
    fn empty_predicate_matches_everything() {
        assert!(matches(&person(), &Predicate::all()));
        assert!(matches(&Document::new(), &Predicate::all()));
    }

    #[test]
    fn top_level_equality() {
        assert!(matches(&person(), &Predicate::from(doc! { "name" => "Ada" })));
        assert!(!matches(&person(), &Predicate::from(doc! { "name" => "Bob" })));
    }

    #[test]
    fn all_conditions_must_hold() {
        assert!(matches(
            &person(),
            &Predicate::from(doc! { "name" => "Ada", "age" => 36 })
        ));
        assert!(!matches(
            &person(),
            &Predicate::from(doc! { "name" => "Ada", "age" => 37 })
        ));
    }

    #[test]
    fn equality_is_type_strict() {
        assert!(!matches(&person(), &Predicate::from(doc! { "age" => 36.0 })));
        assert!(!matches(&person(), &Predicate::from(doc! { "age" => "36" })));
        assert!(matches(&person(), &Predicate::from(doc! { "score" => 9.5 })));
    }

    #[test]
    fn missing_field_never_matches() {
        assert!(!matches(&person(), &Predicate::from(doc! { "email" => Value::Null })));
        assert!(!matches(&person(), &Predicate::from(doc! { "address.street" => "x" })));
        // Descending through a non-map
        assert!(!matches(&person(), &Predicate::from(doc! { "name.first" => "A" })));
    }

    #[test]
    fn explicit_null_matches_null() {
        assert!(matches(
            &person(),
            &Predicate::from(doc! { "address.zip" => Value::Null })
        ));
    }

    #[test]
    fn nested_paths() {
        let dotted = Predicate::from(doc! { "address.city" => "London" });
        let nested = Predicate::from(doc! { "address" => doc! { "city" => "London" } });
        assert!(matches(&person(), &dotted));
        assert!(matches(&person(), &nested));
    }

    #[test]
    fn arrays_compare_whole() {
        assert!(matches(
            &person(),
            &Predicate::from(doc! { "tags" => vec!["math", "poetry"] })
        ));
        assert!(!matches(&person(), &Predicate::from(doc! { "tags" => "math" })));
    }

    proptest! {
        #[test]
        fn prop_document_matches_its_own_fields(
            fields in prop::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)
        ) {
            let document: Document = fields.into_iter().collect();
            prop_assert!(matches(&document, &Predicate::from(&document)));
        }
    }
}
