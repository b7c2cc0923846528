use std::fmt;

use serde::{Deserialize, Serialize};

/// A card as the catalog describes it. Every optional field is explicit;
/// absent fields render as nothing.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct Card {
    pub id: String,
    pub oracle_id: Option<String>,
    pub name: String,
    pub mana_cost: Option<String>,
    pub type_line: Option<String>,
    pub printed_type_line: Option<String>,
    pub rarity: Option<String>,
    pub oracle_text: Option<String>,
    pub printed_text: Option<String>,
    pub flavor_text: Option<String>,
    pub power: Option<String>,
    pub toughness: Option<String>,
    pub loyalty: Option<String>,
    pub image_uris: Option<ImageUris>,
    pub card_faces: Option<Vec<CardFace>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct CardFace {
    pub oracle_id: Option<String>,
    pub name: String,
    pub mana_cost: Option<String>,
    pub type_line: Option<String>,
    pub printed_type_line: Option<String>,
    pub oracle_text: Option<String>,
    pub printed_text: Option<String>,
    pub flavor_text: Option<String>,
    pub power: Option<String>,
    pub toughness: Option<String>,
    pub loyalty: Option<String>,
    pub image_uris: Option<ImageUris>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ImageUris {
    pub small: Option<String>,
    pub normal: Option<String>,
    pub large: Option<String>,
    pub png: Option<String>,
}

impl ImageUris {
    /// normal > large > small > png
    pub fn preferred(&self) -> Option<&str> {
        self.normal
            .as_deref()
            .or(self.large.as_deref())
            .or(self.small.as_deref())
            .or(self.png.as_deref())
    }
}

impl Card {
    /// Faces of a multi-faced card. A single stray face is not a layout the
    /// renderer treats as multi-faced, so it yields nothing here.
    pub fn faces(&self) -> &[CardFace] {
        match self.card_faces.as_deref() {
            Some(faces) if faces.len() >= 2 => faces,
            _ => &[],
        }
    }

    pub fn is_multi_faced(&self) -> bool {
        !self.faces().is_empty()
    }

    /// Stable key used for deduplication: the oracle id, falling back to the
    /// first face's oracle id (reversible layouts), then the printing id.
    pub fn identifier(&self) -> Option<&str> {
        self.oracle_id
            .as_deref()
            .or_else(|| {
                self.card_faces
                    .as_deref()
                    .and_then(|faces| faces.first())
                    .and_then(|face| face.oracle_id.as_deref())
            })
            .or(Some(self.id.as_str()))
            .filter(|id| !id.is_empty())
    }
}

/// Set code, case-insensitive upstream, so kept trimmed and lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SetCode(String);

impl SetCode {
    pub fn new(code: &str) -> Self {
        Self(code.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of a catalog search, or the upstream's error object.
#[derive(Debug, Deserialize)]
#[serde(tag = "object", rename_all = "snake_case")]
pub enum CatalogResponse {
    List(CardList),
    Error(ApiError),
}

#[derive(Debug, Deserialize)]
pub struct CardList {
    #[serde(default)]
    pub total_cards: u64,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_page: Option<String>,
    #[serde(default)]
    pub data: Vec<Card>,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub details: String,
}

/// What a catalog fetch produced. Failures travel as `Err` beside this.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogResult {
    Cards { cards: Vec<Card>, total: u64 },
    Empty,
}

impl CatalogResult {
    pub fn from_cards(cards: Vec<Card>, total: u64) -> Self {
        if total == 0 || cards.is_empty() {
            CatalogResult::Empty
        } else {
            CatalogResult::Cards { cards, total }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_preference_order() {
        let uris = ImageUris {
            small: Some("s".into()),
            png: Some("p".into()),
            ..Default::default()
        };
        assert_eq!(uris.preferred(), Some("s"));

        let uris = ImageUris {
            large: Some("l".into()),
            png: Some("p".into()),
            ..Default::default()
        };
        assert_eq!(uris.preferred(), Some("l"));

        assert_eq!(ImageUris::default().preferred(), None);
    }

    #[test]
    fn identifier_falls_back_through_faces_and_print_id() {
        let card = Card {
            id: "print".into(),
            oracle_id: Some("oracle".into()),
            ..Default::default()
        };
        assert_eq!(card.identifier(), Some("oracle"));

        let reversible = Card {
            id: "print".into(),
            card_faces: Some(vec![
                CardFace {
                    oracle_id: Some("front".into()),
                    ..Default::default()
                },
                CardFace::default(),
            ]),
            ..Default::default()
        };
        assert_eq!(reversible.identifier(), Some("front"));

        let bare = Card {
            id: "print".into(),
            ..Default::default()
        };
        assert_eq!(bare.identifier(), Some("print"));
        assert_eq!(Card::default().identifier(), None);
    }

    #[test]
    fn single_face_is_not_multi_faced() {
        let card = Card {
            card_faces: Some(vec![CardFace::default()]),
            ..Default::default()
        };
        assert!(!card.is_multi_faced());
    }

    #[test]
    fn decodes_list_and_error_objects() {
        let list: CatalogResponse = serde_json::from_str(
            r#"{"object":"list","total_cards":1,"has_more":false,
                "data":[{"id":"x","oracle_id":"o","name":"Ornithopter","rarity":"uncommon",
                         "mana_cost":"{0}","power":"0","toughness":"2","lang":"en"}]}"#,
        )
        .unwrap();
        match list {
            CatalogResponse::List(list) => {
                assert_eq!(list.total_cards, 1);
                assert_eq!(list.data[0].name, "Ornithopter");
                assert_eq!(list.data[0].mana_cost.as_deref(), Some("{0}"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let error: CatalogResponse = serde_json::from_str(
            r#"{"object":"error","code":"not_found","status":404,"details":"No cards found"}"#,
        )
        .unwrap();
        assert!(matches!(error, CatalogResponse::Error(e) if e.code == "not_found"));
    }

    #[test]
    fn set_code_is_normalised() {
        assert_eq!(SetCode::new(" NEO ").as_str(), "neo");
    }
}
