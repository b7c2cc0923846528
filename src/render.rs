//! Card text formatting for chat destinations.
//!
//! Output uses the markdown subset chat platforms understand: `**bold**`
//! and `_italic_`.

use crate::models::{Card, CardFace, ImageUris};

/// Borrowed view over the fields a card and a card face have in common.
struct Face<'a> {
    name: &'a str,
    mana_cost: Option<&'a str>,
    type_line: Option<&'a str>,
    printed_type_line: Option<&'a str>,
    oracle_text: Option<&'a str>,
    printed_text: Option<&'a str>,
    flavor_text: Option<&'a str>,
    loyalty: Option<&'a str>,
    power: Option<&'a str>,
    toughness: Option<&'a str>,
    image_uris: Option<&'a ImageUris>,
}

impl<'a> From<&'a Card> for Face<'a> {
    fn from(card: &'a Card) -> Self {
        Self {
            name: &card.name,
            mana_cost: present(&card.mana_cost),
            type_line: present(&card.type_line),
            printed_type_line: present(&card.printed_type_line),
            oracle_text: present(&card.oracle_text),
            printed_text: present(&card.printed_text),
            flavor_text: present(&card.flavor_text),
            loyalty: present(&card.loyalty),
            power: present(&card.power),
            toughness: present(&card.toughness),
            image_uris: card.image_uris.as_ref(),
        }
    }
}

impl<'a> From<&'a CardFace> for Face<'a> {
    fn from(face: &'a CardFace) -> Self {
        Self {
            name: &face.name,
            mana_cost: present(&face.mana_cost),
            type_line: present(&face.type_line),
            printed_type_line: present(&face.printed_type_line),
            oracle_text: present(&face.oracle_text),
            printed_text: present(&face.printed_text),
            flavor_text: present(&face.flavor_text),
            loyalty: present(&face.loyalty),
            power: present(&face.power),
            toughness: present(&face.toughness),
            image_uris: face.image_uris.as_ref(),
        }
    }
}

/// Upstream sends `""` for fields a card does not have; treat it as absent.
fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|value| !value.is_empty())
}

/// Renders a card to the announcement text sent to a destination.
pub fn render(card: &Card) -> String {
    let rarity = card.rarity.as_deref().map(capitalize);
    let rarity = rarity.as_deref().filter(|r| !r.is_empty());

    if !card.is_multi_faced() {
        return describe(&Face::from(card), rarity).join("\n");
    }

    let mut blocks = vec![format!("**{}** _(2-faced card)_", card.name)];
    let faces: Vec<String> = card
        .faces()
        .iter()
        .map(|face| describe(&Face::from(face), rarity).join("\n"))
        .collect();
    blocks.push(faces.join("\n\n"));
    blocks.join("\n")
}

fn describe(face: &Face<'_>, rarity: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();

    let cost = face.mana_cost.map(strip_braces).unwrap_or_default();
    if cost.is_empty() {
        lines.push(format!("**{}**", face.name));
    } else {
        lines.push(format!("**{}** - {}", face.name, cost));
    }

    if let Some(type_line) = face.type_line {
        let type_line = face.printed_type_line.unwrap_or(type_line);
        match rarity {
            Some(rarity) => lines.push(format!("{type_line} ({rarity})")),
            None => lines.push(type_line.to_owned()),
        }
    }

    if let Some(text) = face.oracle_text {
        lines.push(italicize_reminders(face.printed_text.unwrap_or(text)));
    }

    if let Some(flavor) = face.flavor_text {
        lines.push(format!("_{flavor}_"));
    }

    if let Some(loyalty) = face.loyalty {
        lines.push(format!("**Loyalty: {loyalty}**"));
    }

    if let (Some(power), Some(toughness)) = (face.power, face.toughness) {
        lines.push(format!(
            "**{}/{}**",
            escape_asterisks(power),
            escape_asterisks(toughness)
        ));
    }

    if let Some(url) = face.image_uris.and_then(ImageUris::preferred) {
        lines.push(url.to_owned());
    }

    lines
}

fn strip_braces(cost: &str) -> String {
    cost.chars().filter(|c| !matches!(c, '{' | '}')).collect()
}

fn escape_asterisks(value: &str) -> String {
    value.replace('*', "\\*")
}

/// Every paren is rewritten on its own, so unbalanced ones pass through
/// with a lone marker.
fn italicize_reminders(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        match c {
            '(' => out.push_str("_("),
            ')' => out.push_str(")_"),
            other => out.push(other),
        }
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
