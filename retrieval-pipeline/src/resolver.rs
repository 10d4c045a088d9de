use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use common::{
    document::Document,
    graph::{attraction_node_id, restaurant_node_id},
};

/// First markdown-style heading in a document body, e.g. `# '해운대해수욕장'`
/// or `# 광안리 맛집 소개`. The quoted form wins when present.
static HEADING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#\s*(?:'([^']+)'|([^#\r\n]+))").unwrap_or_else(|e| panic!("heading regex: {e}"))
});

const FOOD_TERMS: [&str; 4] = ["맛집", "식당", "레스토랑", "카페"];
const SIGHT_TERMS: [&str; 8] = [
    "관광",
    "명소",
    "해수욕장",
    "공원",
    "전망대",
    "타워",
    "다리",
    "문화마을",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Attraction,
    Restaurant,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Attraction => write!(f, "Attraction"),
            EntityKind::Restaurant => write!(f, "Restaurant"),
        }
    }
}

/// A document successfully mapped onto a canonical graph identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntity {
    pub name: String,
    pub kind: EntityKind,
    pub source_id: String,
}

impl ResolvedEntity {
    /// Graph node id this entity should be looked up under. Pure in
    /// `(name, kind, source_id)`.
    pub fn node_id(&self) -> String {
        match self.kind {
            EntityKind::Attraction => attraction_node_id(&self.source_id),
            EntityKind::Restaurant => restaurant_node_id(&self.source_id),
        }
    }
}

/// Attempts to resolve a document to a graph entity.
///
/// Id and kind come from metadata in priority order: `UC_SEQ` marks an
/// attraction, `RSTR_ID` a restaurant, and a bare `content_id` is taken
/// as an attraction by convention. The display name prefers the first
/// content heading, then kind-specific metadata fields. A document that
/// cannot supply all of name, kind and source id is dropped here.
pub fn resolve(document: &Document) -> Option<ResolvedEntity> {
    let mut name: Option<String> = None;
    let mut kind: Option<EntityKind> = None;
    let mut source_id: Option<String> = None;

    if let Some(id) = document.metadata_str("UC_SEQ") {
        source_id = Some(id);
        kind = Some(EntityKind::Attraction);
    } else if let Some(id) = document.metadata_str("RSTR_ID") {
        source_id = Some(id);
        kind = Some(EntityKind::Restaurant);
    } else if let Some(id) = document.metadata_str("content_id") {
        source_id = Some(id);
        kind = Some(EntityKind::Attraction);
    }

    if let Some(captures) = HEADING_RE.captures(&document.content) {
        let heading = captures
            .get(1)
            .or_else(|| captures.get(2))
            .map(|m| m.as_str().trim())
            .filter(|text| !text.is_empty());
        if let Some(heading) = heading {
            name = Some(heading.to_owned());
            if kind.is_none() {
                kind = infer_kind(heading);
            }
        }
    }

    if name.is_none() {
        name = match kind {
            Some(EntityKind::Attraction) => ["MAIN_TITLE", "CONTENT_TITLE", "TITLE", "name"]
                .iter()
                .find_map(|key| document.metadata_str(key)),
            Some(EntityKind::Restaurant) => ["RSTR_NM", "name"]
                .iter()
                .find_map(|key| document.metadata_str(key)),
            None => None,
        };
    }

    match (name, kind, source_id) {
        (Some(name), Some(kind), Some(source_id)) => Some(ResolvedEntity {
            name,
            kind,
            source_id,
        }),
        (name, kind, source_id) => {
            debug!(
                name = name.as_deref().unwrap_or(""),
                kind = kind.map(|k| k.to_string()).unwrap_or_default(),
                source_id = source_id.as_deref().unwrap_or(""),
                "Document did not resolve to an entity"
            );
            None
        }
    }
}

/// Best-effort kind guess from the extracted name. Vocabulary match
/// only, no guaranteed precision.
fn infer_kind(name: &str) -> Option<EntityKind> {
    let lowered = name.to_lowercase();
    if FOOD_TERMS.iter().any(|term| lowered.contains(term)) {
        Some(EntityKind::Restaurant)
    } else if SIGHT_TERMS.iter().any(|term| lowered.contains(term)) {
        Some(EntityKind::Attraction)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(content: &str, metadata: &[(&str, serde_json::Value)]) -> Document {
        let mut map = serde_json::Map::new();
        for (key, value) in metadata {
            map.insert((*key).to_owned(), value.clone());
        }
        Document::new(content, map)
    }

    #[test]
    fn uc_seq_resolves_to_attraction_node_id() {
        let document = doc(
            "# '해운대해수욕장'\n부산의 대표적인 여름 피서지입니다.",
            &[("UC_SEQ", json!("26"))],
        );
        let entity = resolve(&document).unwrap();
        assert_eq!(entity.name, "해운대해수욕장");
        assert_eq!(entity.kind, EntityKind::Attraction);
        assert_eq!(entity.node_id(), "attraction_26");
    }

    #[test]
    fn rstr_id_coerces_numeric_strings() {
        for raw in ["1241", "1241.0"] {
            let document = doc("", &[("RSTR_ID", json!(raw)), ("RSTR_NM", json!("해운대암소갈비집"))]);
            let entity = resolve(&document).unwrap();
            assert_eq!(entity.kind, EntityKind::Restaurant);
            assert_eq!(entity.node_id(), "restaurant_1241", "raw id {raw}");
        }
    }

    #[test]
    fn numeric_metadata_ids_are_accepted() {
        let document = doc("# 자갈치시장", &[("UC_SEQ", json!(27))]);
        let entity = resolve(&document).unwrap();
        assert_eq!(entity.node_id(), "attraction_27");
    }

    #[test]
    fn content_id_is_treated_as_attraction() {
        let document = doc("# 초량이바구길", &[("content_id", json!("58"))]);
        let entity = resolve(&document).unwrap();
        assert_eq!(entity.kind, EntityKind::Attraction);
        assert_eq!(entity.node_id(), "attraction_58");
    }

    #[test]
    fn unquoted_heading_is_extracted_and_trimmed() {
        let document = doc("# 광안리해수욕장 \n본문", &[("UC_SEQ", json!("30"))]);
        assert_eq!(resolve(&document).unwrap().name, "광안리해수욕장");
    }

    #[test]
    fn name_falls_back_to_kind_specific_metadata() {
        let document = doc(
            "heading 없는 본문",
            &[("UC_SEQ", json!("26")), ("MAIN_TITLE", json!("해운대해수욕장"))],
        );
        assert_eq!(resolve(&document).unwrap().name, "해운대해수욕장");

        let document = doc(
            "heading 없는 본문",
            &[("RSTR_ID", json!("7")), ("RSTR_NM", json!("갈비집"))],
        );
        assert_eq!(resolve(&document).unwrap().name, "갈비집");
    }

    #[test]
    fn kind_is_inferred_from_heading_vocabulary() {
        assert_eq!(infer_kind("해운대 맛집 추천"), Some(EntityKind::Restaurant));
        assert_eq!(infer_kind("송도 전망대"), Some(EntityKind::Attraction));
        assert_eq!(infer_kind("그냥 이름"), None);
    }

    #[test]
    fn missing_any_field_means_unresolved() {
        // No source id at all.
        assert!(resolve(&doc("# '해운대해수욕장'", &[])).is_none());
        // Id present but no name anywhere.
        assert!(resolve(&doc("본문뿐", &[("UC_SEQ", json!("26"))])).is_none());
    }

    #[test]
    fn resolution_is_deterministic() {
        let document = doc("# '해운대해수욕장'", &[("UC_SEQ", json!("26"))]);
        let first = resolve(&document).unwrap();
        let second = resolve(&document).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.node_id(), second.node_id());
    }
}
