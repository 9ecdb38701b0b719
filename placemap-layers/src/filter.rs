//! Filter stage applied to the merged collection before it reaches the view
//!
//! Tag predicates come in two modes: `Any` keeps places carrying at least one
//! selected tag, `All` keeps places carrying every selected tag.
//!
//! Tag identity across sources is approximate. Places from eager sources
//! carry tag ids, but places from paged sources may only carry tag names
//! (their catalog is summarized separately). A selected tag therefore
//! matches a place tag either by id or by normalized name, so two different
//! owners' tags that share a name are treated as the same tag.

use placemap_common::model::{normalize_tag_name, SourceMetadata};
use placemap_common::Place;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// How selected tags combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TagMatchMode {
    /// At least one selected tag
    #[default]
    Any,
    /// Every selected tag
    All,
}

/// Active filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct FilterSpec {
    #[serde(default)]
    pub tag_ids: Vec<Uuid>,
    #[serde(default)]
    pub mode: TagMatchMode,
    /// Case-insensitive substring over name, address, category and notes
    #[serde(default)]
    pub query: String,
    /// Keep places in at least one of these collections (empty = no restriction)
    #[serde(default)]
    pub collection_ids: Vec<Uuid>,
}

impl FilterSpec {
    pub fn new(tag_ids: Vec<Uuid>, mode: TagMatchMode, query: impl Into<String>) -> Self {
        Self {
            tag_ids,
            mode,
            query: query.into(),
            collection_ids: Vec::new(),
        }
    }

    pub fn with_collections(mut self, collection_ids: Vec<Uuid>) -> Self {
        self.collection_ids = collection_ids;
        self
    }

    /// True when the filter keeps every place
    pub fn is_empty(&self) -> bool {
        self.tag_ids.is_empty() && self.collection_ids.is_empty() && self.query.trim().is_empty()
    }
}

/// Tag id → normalized name lookup across all active sources
#[derive(Debug, Clone, Default)]
pub struct TagCatalog {
    names: HashMap<Uuid, String>,
}

impl TagCatalog {
    /// Build from tags seen on loaded places plus any metadata catalogs
    pub fn build(places: &[Place], catalogs: &[&SourceMetadata]) -> Self {
        let mut names = HashMap::new();
        for catalog in catalogs {
            for tag in &catalog.tags {
                names.insert(tag.id, normalize_tag_name(&tag.name));
            }
        }
        for place in places {
            for tag in &place.tags {
                if let Some(id) = tag.id {
                    names.entry(id).or_insert_with(|| tag.name_key());
                }
            }
        }
        Self { names }
    }

    pub fn name_of(&self, tag_id: &Uuid) -> Option<&str> {
        self.names.get(tag_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Apply `spec` to `places`, preserving order
pub fn filter_places(places: &[Place], spec: &FilterSpec, catalog: &TagCatalog) -> Vec<Place> {
    if spec.is_empty() {
        return places.to_vec();
    }

    let mut selected: Vec<(Uuid, Option<&str>)> = Vec::with_capacity(spec.tag_ids.len());
    for id in &spec.tag_ids {
        if !selected.iter().any(|(seen, _)| seen == id) {
            selected.push((*id, catalog.name_of(id)));
        }
    }
    let query = spec.query.trim().to_lowercase();

    places
        .iter()
        .filter(|place| matches_tags(place, &selected, spec.mode))
        .filter(|place| matches_collections(place, &spec.collection_ids))
        .filter(|place| matches_query(place, &query))
        .cloned()
        .collect()
}

/// Filter with explicit tag selection, mode and query text
pub fn filter(
    places: &[Place],
    selected_tag_ids: &[Uuid],
    mode: TagMatchMode,
    query_text: &str,
    catalog: &TagCatalog,
) -> Vec<Place> {
    let spec = FilterSpec::new(selected_tag_ids.to_vec(), mode, query_text);
    filter_places(places, &spec, catalog)
}

fn has_tag(place: &Place, id: &Uuid, name_key: Option<&str>) -> bool {
    place.tags.iter().any(|tag| {
        tag.id.as_ref() == Some(id) || name_key.is_some_and(|key| tag.name_key() == key)
    })
}

fn matches_tags(place: &Place, selected: &[(Uuid, Option<&str>)], mode: TagMatchMode) -> bool {
    if selected.is_empty() {
        return true;
    }
    match mode {
        TagMatchMode::Any => selected.iter().any(|(id, key)| has_tag(place, id, *key)),
        TagMatchMode::All => selected.iter().all(|(id, key)| has_tag(place, id, *key)),
    }
}

fn matches_collections(place: &Place, collection_ids: &[Uuid]) -> bool {
    collection_ids.is_empty()
        || place
            .collections
            .iter()
            .any(|c| collection_ids.contains(&c.id))
}

fn matches_query(place: &Place, query: &str) -> bool {
    if query.is_empty() {
        return true;
    }
    [&place.name, &place.address, &place.category, &place.notes]
        .iter()
        .any(|field| field.to_lowercase().contains(query))
}

#[cfg(test)]
mod tests {
    use super::*;
    use placemap_common::model::{CollectionRef, TagRef, TagSummary};
    use placemap_common::SourceId;

    fn tag(id: Uuid, name: &str) -> TagRef {
        TagRef {
            id: Some(id),
            name: name.to_string(),
            color: None,
        }
    }

    fn place(name: &str, tags: Vec<TagRef>) -> Place {
        Place {
            id: Uuid::new_v4(),
            owner: SourceId::Me,
            name: name.to_string(),
            address: String::new(),
            latitude: 0.0,
            longitude: 0.0,
            category: String::new(),
            notes: String::new(),
            tags,
            collections: vec![],
        }
    }

    fn names(places: &[Place]) -> Vec<&str> {
        places.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_all_requires_superset_any_takes_union() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let places = vec![
            place("ab", vec![tag(a, "A"), tag(b, "B")]),
            place("abc", vec![tag(a, "A"), tag(b, "B"), tag(c, "C")]),
            place("a", vec![tag(a, "A")]),
            place("b", vec![tag(b, "B")]),
            place("c", vec![tag(c, "C")]),
            place("none", vec![]),
        ];
        let catalog = TagCatalog::build(&places, &[]);

        let all = filter(&places, &[a, b], TagMatchMode::All, "", &catalog);
        assert_eq!(names(&all), vec!["ab", "abc"]);

        let any = filter(&places, &[a, b], TagMatchMode::Any, "", &catalog);
        assert_eq!(names(&any), vec!["ab", "abc", "a", "b"]);
    }

    #[test]
    fn test_empty_filter_keeps_everything_in_order() {
        let places = vec![place("one", vec![]), place("two", vec![])];
        let out = filter_places(&places, &FilterSpec::default(), &TagCatalog::default());
        assert_eq!(out, places);
    }

    #[test]
    fn test_paged_name_only_tags_match_by_name() {
        let coffee_id = Uuid::new_v4();
        let eager_place = place("eager", vec![tag(coffee_id, "Coffee")]);
        let mut paged_place = place("paged", vec![]);
        paged_place.owner = SourceId::User(Uuid::new_v4());
        paged_place.tags = vec![TagRef {
            id: None,
            name: " coffee ".to_string(),
            color: None,
        }];

        let places = vec![eager_place, paged_place];
        let catalog = TagCatalog::build(&places, &[]);

        let out = filter(&places, &[coffee_id], TagMatchMode::All, "", &catalog);
        assert_eq!(names(&out), vec!["eager", "paged"]);
    }

    #[test]
    fn test_same_name_different_owner_treated_as_equal() {
        // Lossy by construction: another owner's "Coffee" tag matches too
        let mine = Uuid::new_v4();
        let theirs = Uuid::new_v4();
        let places = vec![
            place("mine", vec![tag(mine, "Coffee")]),
            place("theirs", vec![tag(theirs, "Coffee")]),
        ];
        let catalog = TagCatalog::build(&places, &[]);

        let out = filter(&places, &[mine], TagMatchMode::Any, "", &catalog);
        assert_eq!(names(&out), vec!["mine", "theirs"]);
    }

    #[test]
    fn test_catalog_from_metadata_resolves_unseen_tags() {
        let id = Uuid::new_v4();
        let metadata = SourceMetadata {
            total_place_count: 2000,
            tags: vec![TagSummary {
                id,
                name: "Ramen".to_string(),
                color: None,
                usage_count: 4,
            }],
            collections: vec![],
        };
        let places = vec![place(
            "noodles",
            vec![TagRef {
                id: None,
                name: "ramen".to_string(),
                color: None,
            }],
        )];
        let catalog = TagCatalog::build(&places, &[&metadata]);
        assert_eq!(catalog.name_of(&id), Some("ramen"));

        let out = filter(&places, &[id], TagMatchMode::Any, "", &catalog);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_unknown_tag_under_all_matches_nothing() {
        let a = Uuid::new_v4();
        let places = vec![place("a", vec![tag(a, "A")])];
        let catalog = TagCatalog::build(&places, &[]);

        let out = filter(&places, &[a, Uuid::new_v4()], TagMatchMode::All, "", &catalog);
        assert!(out.is_empty());

        let out = filter(&places, &[a, Uuid::new_v4()], TagMatchMode::Any, "", &catalog);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_query_matches_fields_case_insensitively() {
        let mut by_address = place("Joe's", vec![]);
        by_address.address = "12 Bleecker Street".to_string();
        let mut by_notes = place("Other", vec![]);
        by_notes.notes = "Great bagels on BLEECKER".to_string();
        let places = vec![by_address, by_notes, place("Unrelated", vec![])];

        let out = filter(&places, &[], TagMatchMode::Any, "  bleecker ", &TagCatalog::default());
        assert_eq!(names(&out), vec!["Joe's", "Other"]);
    }

    #[test]
    fn test_collection_filter() {
        let weekend = Uuid::new_v4();
        let mut listed = place("listed", vec![]);
        listed.collections = vec![CollectionRef {
            id: weekend,
            name: "Weekend".to_string(),
            color: None,
        }];
        let places = vec![listed, place("unlisted", vec![])];

        let spec = FilterSpec::default().with_collections(vec![weekend]);
        let out = filter_places(&places, &spec, &TagCatalog::default());
        assert_eq!(names(&out), vec!["listed"]);
    }
}
