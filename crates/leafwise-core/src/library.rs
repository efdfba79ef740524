//! Built-in disease reference library.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::json;

use crate::auth::IdentityProvider;
use crate::controller::SyncController;
use crate::gateway::{CollectionGateway, InMemoryGateway};
use crate::models::{typed, CollectionKey, CollectionKind, Disease, Entity, Payload};
use crate::policy::{group_by, FilterState};
use crate::Result;

/// Field diseases are grouped by
pub const GROUP_FIELD: &str = "plant_type";

const CATALOG: [(i64, &str, &str, &str); 4] = [
    (1, "Tomato Blight", "Tomato", "Brown spots on leaves"),
    (2, "Wheat Rust", "Wheat", "Reddish-orange pustules on leaves"),
    (3, "Rice Blast", "Rice", "Gray lesions with dark borders"),
    (4, "Late Blight", "Tomato", "Blackened stems and leaves"),
];

/// The catalog as entities. Earlier catalog entries carry later
/// timestamps so the newest-first view keeps catalog order.
pub fn builtin_catalog() -> Vec<Entity> {
    CATALOG
        .iter()
        .map(|(id, name, plant_type, symptoms)| {
            let payload = json!({
                "name": name,
                "plant_type": plant_type,
                "symptoms": symptoms,
            });
            Entity::new(
                *id,
                payload.as_object().cloned().unwrap_or_else(Payload::new),
                -id,
            )
        })
        .collect()
}

pub fn catalog_gateway() -> InMemoryGateway {
    InMemoryGateway::seeded(builtin_catalog())
}

/// Controller for the library, backed by the built-in catalog.
pub fn open_library(identity: Arc<dyn IdentityProvider>) -> SyncController {
    SyncController::new(
        CollectionKey::new(CollectionKind::Diseases),
        Arc::new(catalog_gateway()) as Arc<dyn CollectionGateway>,
        identity,
    )
}

/// Diseases matching `filter`, grouped by plant type.
pub fn grouped_diseases(
    library: &SyncController,
    filter: &FilterState,
) -> Result<BTreeMap<String, Vec<Disease>>> {
    group_by(&library.view(filter), GROUP_FIELD)
        .into_iter()
        .map(|(plant_type, entities)| Ok((plant_type, typed(&entities)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::auth::SessionHandle;

    fn names(diseases: &[Disease]) -> Vec<&str> {
        diseases.iter().map(|disease| disease.name.as_str()).collect()
    }

    #[tokio::test]
    async fn library_groups_by_plant_type_in_catalog_order() {
        let library = open_library(Arc::new(SessionHandle::new()));
        library.refresh().await.unwrap();

        let groups = grouped_diseases(&library, &FilterState::default()).unwrap();
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["Rice", "Tomato", "Wheat"]);
        assert_eq!(names(&groups["Tomato"]), vec!["Tomato Blight", "Late Blight"]);
    }

    #[tokio::test]
    async fn library_search_covers_name_and_symptoms() {
        let library = open_library(Arc::new(SessionHandle::new()));
        library.refresh().await.unwrap();

        let by_name = grouped_diseases(&library, &FilterState::search("blight")).unwrap();
        assert_eq!(names(&by_name["Tomato"]), vec!["Tomato Blight", "Late Blight"]);
        assert_eq!(by_name.len(), 1);

        let by_symptom = grouped_diseases(&library, &FilterState::search("pustules")).unwrap();
        assert_eq!(by_symptom.keys().collect::<Vec<_>>(), vec!["Wheat"]);
    }

    #[tokio::test]
    async fn category_filter_selects_one_plant() {
        let library = open_library(Arc::new(SessionHandle::new()));
        library.refresh().await.unwrap();
        let rice = library.view(&FilterState::default().with_category("rice"));
        assert_eq!(rice.len(), 1);
    }
}
