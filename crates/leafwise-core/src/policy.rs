//! Filtering and ordering of collection items into a materialized view.
//!
//! Everything here is pure: the same items and filter always produce the
//! same sequence, independent of map iteration or insertion order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::{CollectionPolicy, Entity};
use crate::util::normalize_query;

/// Category tag that disables category filtering
pub const ALL_CATEGORIES: &str = "all";

/// Per-screen view state. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub search: String,
    pub category: String,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            search: String::new(),
            category: ALL_CATEGORIES.to_string(),
        }
    }
}

impl FilterState {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: term.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    fn is_all_categories(&self) -> bool {
        let category = self.category.trim();
        category.is_empty() || category.eq_ignore_ascii_case(ALL_CATEGORIES)
    }
}

/// Filter and order `items` for display.
///
/// An entity is kept when it is not tombstoned, the category matches (or
/// the filter is "all"), and the search term is empty or found
/// case-insensitively in one of the searchable fields. The result is
/// ordered newest first; equal timestamps fall back to descending id.
pub fn materialize<'a>(
    items: impl IntoIterator<Item = &'a Entity>,
    filter: &FilterState,
    policy: &CollectionPolicy,
) -> Vec<Entity> {
    let search = normalize_query(&filter.search);
    let category = (!filter.is_all_categories()).then(|| normalize_query(&filter.category));

    let mut view = items
        .into_iter()
        .filter(|entity| !entity.deleted)
        .filter(|entity| matches_category(entity, category.as_deref(), policy))
        .filter(|entity| matches_search(entity, &search, policy))
        .cloned()
        .collect::<Vec<_>>();
    view.sort_by(newest_first);
    view
}

/// Total display order: descending `created_at`, then descending id.
pub fn newest_first(left: &Entity, right: &Entity) -> Ordering {
    right
        .created_at
        .cmp(&left.created_at)
        .then_with(|| right.id.cmp(&left.id))
}

fn matches_category(entity: &Entity, category: Option<&str>, policy: &CollectionPolicy) -> bool {
    let Some(category) = category else {
        return true;
    };
    let Some(field) = policy.category_field else {
        return true;
    };
    entity
        .text(field)
        .is_some_and(|value| normalize_query(value) == category)
}

fn matches_search(entity: &Entity, search: &str, policy: &CollectionPolicy) -> bool {
    if search.is_empty() {
        return true;
    }
    policy.search_fields.iter().any(|field| {
        entity
            .text(field)
            .is_some_and(|value| value.to_lowercase().contains(search))
    })
}

/// Group a view by a payload field, keeping view order inside each group.
/// Entities without the field land under an empty key.
pub fn group_by(view: &[Entity], field: &str) -> BTreeMap<String, Vec<Entity>> {
    let mut groups: BTreeMap<String, Vec<Entity>> = BTreeMap::new();
    for entity in view {
        let key = entity.text(field).unwrap_or_default().trim().to_string();
        groups.entry(key).or_default().push(entity.clone());
    }
    groups
}

/// Sorted, deduplicated values of a payload field across a view.
pub fn collect_categories<'a>(
    items: impl IntoIterator<Item = &'a Entity>,
    field: &str,
) -> Vec<String> {
    items
        .into_iter()
        .filter(|entity| !entity.deleted)
        .filter_map(|entity| entity.text(field))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};

    use super::*;
    use crate::models::{CollectionKind, EntityId};

    fn entity(id: i64, created_at: i64, value: Value) -> Entity {
        Entity::new(id, value.as_object().cloned().unwrap_or_default(), created_at)
    }

    fn ids(view: &[Entity]) -> Vec<EntityId> {
        view.iter().map(|entity| entity.id.clone()).collect()
    }

    fn forum() -> Vec<Entity> {
        vec![
            entity(1, 100, json!({"title": "Aphid issue", "content": "Tiny bugs", "category": "pest"})),
            entity(2, 200, json!({"title": "Blight", "content": "Brown spots", "category": "fungal"})),
            entity(3, 300, json!({"title": "Watering", "content": "How often?", "category": "Farming Tips"})),
        ]
    }

    #[test]
    fn search_matches_title_case_insensitively() {
        let items = vec![
            entity(1, 100, json!({"title": "Aphid issue", "content": "", "category": "pest"})),
            entity(2, 200, json!({"title": "Blight", "content": "", "category": "fungal"})),
        ];
        let view = materialize(
            &items,
            &FilterState::search("bli"),
            &CollectionKind::Posts.policy(),
        );
        assert_eq!(ids(&view), vec![EntityId::from(2)]);
    }

    #[test]
    fn search_matches_content_too() {
        let view = materialize(
            &forum(),
            &FilterState::search("HOW OFTEN"),
            &CollectionKind::Posts.policy(),
        );
        assert_eq!(ids(&view), vec![EntityId::from(3)]);
    }

    #[test]
    fn category_and_search_combine() {
        let filter = FilterState::search("b").with_category("Fungal");
        let view = materialize(&forum(), &filter, &CollectionKind::Posts.policy());
        assert_eq!(ids(&view), vec![EntityId::from(2)]);

        let filter = FilterState::search("aphid").with_category("fungal");
        assert!(materialize(&forum(), &filter, &CollectionKind::Posts.policy()).is_empty());
    }

    #[test]
    fn all_category_is_case_insensitive() {
        let filter = FilterState::default().with_category("All");
        let view = materialize(&forum(), &filter, &CollectionKind::Posts.policy());
        assert_eq!(view.len(), 3);
    }

    #[test]
    fn orders_newest_first_with_id_tie_break() {
        let items = vec![
            entity(9, 100, json!({"title": "a", "content": ""})),
            entity(10, 100, json!({"title": "b", "content": ""})),
            entity(1, 500, json!({"title": "c", "content": ""})),
        ];
        let view = materialize(&items, &FilterState::default(), &CollectionKind::Posts.policy());
        assert_eq!(
            ids(&view),
            vec![EntityId::from(1), EntityId::from(10), EntityId::from(9)]
        );
    }

    #[test]
    fn materialize_ignores_input_order() {
        let forward = forum();
        let mut reversed = forum();
        reversed.reverse();
        let filter = FilterState::default();
        let policy = CollectionKind::Posts.policy();
        assert_eq!(
            materialize(&forward, &filter, &policy),
            materialize(&reversed, &filter, &policy)
        );
    }

    #[test]
    fn tombstones_are_hidden() {
        let mut items = forum();
        items[0].deleted = true;
        let view = materialize(&items, &FilterState::default(), &CollectionKind::Posts.policy());
        assert!(!ids(&view).contains(&EntityId::from(1)));
    }

    #[test]
    fn groups_library_by_plant_type() {
        let items = vec![
            entity(1, 0, json!({"name": "Tomato Blight", "plant_type": "Tomato"})),
            entity(2, 0, json!({"name": "Wheat Rust", "plant_type": "Wheat"})),
            entity(4, 0, json!({"name": "Late Blight", "plant_type": "Tomato"})),
        ];
        let view = materialize(&items, &FilterState::default(), &CollectionKind::Diseases.policy());
        let groups = group_by(&view, "plant_type");
        assert_eq!(groups.keys().cloned().collect::<Vec<_>>(), vec!["Tomato", "Wheat"]);
        assert_eq!(ids(&groups["Tomato"]), vec![EntityId::from(4), EntityId::from(1)]);
    }

    #[test]
    fn collects_sorted_unique_categories() {
        let mut items = forum();
        items.push(entity(4, 0, json!({"title": "x", "content": "", "category": "pest"})));
        assert_eq!(
            collect_categories(&items, "category"),
            vec!["Farming Tips".to_string(), "fungal".to_string(), "pest".to_string()]
        );
    }
}
