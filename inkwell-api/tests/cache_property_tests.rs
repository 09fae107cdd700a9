//! Property tests for action cache keys and per-service invalidation.

use inkwell_api::{get_cache_key, ActionCache};
use inkwell_test_utils::generators::{arb_action_name, arb_params, arb_param_name};
use proptest::prelude::*;
use serde_json::{json, Map, Value as JsonValue};

fn reversed(params: &Map<String, JsonValue>) -> Map<String, JsonValue> {
    let mut entries: Vec<_> = params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    entries.reverse();
    entries.into_iter().collect()
}

proptest! {
    #[test]
    fn prop_key_ignores_parameter_order(action in arb_action_name(), params in arb_params()) {
        prop_assert_eq!(
            get_cache_key("posts", &action, &params, None),
            get_cache_key("posts", &action, &reversed(&params), None)
        );
    }

    #[test]
    fn prop_key_changes_with_new_parameter(
        params in arb_params(),
        name in arb_param_name(),
        value in "[a-z]{1,8}",
    ) {
        prop_assume!(!params.contains_key(&name));
        let mut extended = params.clone();
        extended.insert(name, JsonValue::String(value));
        prop_assert_ne!(
            get_cache_key("posts", "find", &params, None),
            get_cache_key("posts", "find", &extended, None)
        );
    }

    #[test]
    fn prop_key_is_scoped_by_caller(params in arb_params(), a in "[a-z]{4}", b in "[a-z]{4}") {
        prop_assume!(a != b);
        let shared = get_cache_key("posts", "find", &params, None);
        let for_a = get_cache_key("posts", "find", &params, Some(&a));
        let for_b = get_cache_key("posts", "find", &params, Some(&b));
        prop_assert_ne!(&for_a, &for_b);
        prop_assert_ne!(&shared, &for_a);
    }

    #[test]
    fn prop_invalidation_is_isolated_per_service(params in arb_params(), action in arb_action_name()) {
        let cache = ActionCache::new(true, None);
        let post_key = get_cache_key("posts", &action, &params, None);
        let tag_key = get_cache_key("tags", &action, &params, None);
        prop_assert!(cache.put("posts", post_key.clone(), json!(1), cache.generation("posts")));
        prop_assert!(cache.put("tags", tag_key.clone(), json!(2), cache.generation("tags")));

        prop_assert_eq!(cache.invalidate_service("posts"), 1);
        prop_assert!(cache.get(&post_key).is_none());
        prop_assert_eq!(cache.get(&tag_key), Some(json!(2)));
    }
}

#[test]
fn test_scalars_compare_by_string_form() {
    let number: Map<String, JsonValue> = [("limit".to_string(), json!(5))].into_iter().collect();
    let text: Map<String, JsonValue> = [("limit".to_string(), json!("5"))].into_iter().collect();
    assert_eq!(
        get_cache_key("posts", "pages", &number, None),
        get_cache_key("posts", "pages", &text, None)
    );
}

#[test]
fn test_fill_after_invalidation_is_discarded() {
    let cache = ActionCache::new(true, None);
    let observed = cache.generation("posts");
    cache.invalidate_service("posts");

    let key = get_cache_key("posts", "find", &Map::new(), None);
    assert!(!cache.put("posts", key.clone(), json!([]), observed));
    assert!(cache.get(&key).is_none());
}

#[test]
fn test_disabled_cache_stores_nothing() {
    let cache = ActionCache::new(false, None);
    let key = get_cache_key("posts", "find", &Map::new(), None);
    assert!(!cache.put("posts", key.clone(), json!([]), 0));
    assert_eq!(cache.entries_for("posts"), 0);
}
