//! Alias tables that map the ways people name origin countries and product
//! categories onto the canonical names stored in the tariff dataset.

use tarifftok_core::SupportedDomain;

pub const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("usa", "USA"),
    ("u s a", "USA"),
    ("united states", "USA"),
    ("america", "USA"),
    ("american", "USA"),
    ("china", "China"),
    ("chinese", "China"),
    ("vietnam", "Vietnam"),
    ("viet nam", "Vietnam"),
    ("vietnamese", "Vietnam"),
    ("mexico", "Mexico"),
    ("mexican", "Mexico"),
    ("india", "India"),
    ("indian", "India"),
];

pub const CATEGORY_ALIASES: &[(&str, &str)] = &[
    ("electronic", "Electronics"),
    ("electronics", "Electronics"),
    ("tech", "Electronics"),
    ("technology", "Electronics"),
    ("clothing", "Apparel"),
    ("clothes", "Apparel"),
    ("apparel", "Apparel"),
    ("garments", "Apparel"),
    ("fashion", "Apparel"),
    ("home goods", "Home"),
    ("housewares", "Home"),
    ("household", "Home"),
    ("home", "Home"),
    ("toy", "Toys"),
    ("toys", "Toys"),
    ("games", "Toys"),
    ("playthings", "Toys"),
];

/// Lowercases and replaces punctuation with spaces, padding both ends so
/// phrases can be matched on word boundaries with `" phrase "`.
pub(crate) fn normalize_text(text: &str) -> String {
    let mut normalized = String::with_capacity(text.len() + 2);
    normalized.push(' ');
    let mut last_was_space = true;
    for character in text.chars() {
        if character.is_alphanumeric() {
            normalized.extend(character.to_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            normalized.push(' ');
            last_was_space = true;
        }
    }
    if !last_was_space {
        normalized.push(' ');
    }
    normalized
}

pub(crate) fn contains_phrase(normalized: &str, phrase: &str) -> bool {
    first_position(normalized, phrase).is_some()
}

fn first_position(normalized: &str, phrase: &str) -> Option<usize> {
    normalized.find(&format!(" {phrase} "))
}

/// Countries mentioned in `text`, canonicalised against `domain`, in order of
/// first mention.
pub fn mentioned_countries(text: &str, domain: &SupportedDomain) -> Vec<String> {
    let normalized = normalize_text(text);
    let mut hits = mentions(&normalized, COUNTRY_ALIASES, &domain.countries);
    // A bare upper-case "US" is a country; lower-case "us" is a pronoun.
    if let Some(position) = standalone_us(text) {
        if let Some(usa) = domain.canonical_country("USA") {
            hits.push((position_in_normalized(text, position, &normalized), usa.to_string()));
        }
    }
    ordered(hits, |name| domain.canonical_country(name).map(str::to_string))
}

/// Product categories mentioned in `text`, canonicalised against `domain`.
pub fn mentioned_categories(text: &str, domain: &SupportedDomain) -> Vec<String> {
    let normalized = normalize_text(text);
    let hits = mentions(&normalized, CATEGORY_ALIASES, &domain.product_categories);
    ordered(hits, |name| domain.canonical_category(name).map(str::to_string))
}

/// Resolves a single free-form country name, accepting aliases.
pub fn canonical_country(name: &str, domain: &SupportedDomain) -> Option<String> {
    if let Some(found) = domain.canonical_country(name) {
        return Some(found.to_string());
    }
    if name.trim() == "US" {
        return domain.canonical_country("USA").map(str::to_string);
    }
    resolve_alias(name, COUNTRY_ALIASES).and_then(|target| domain.canonical_country(target)).map(str::to_string)
}

/// Resolves a single free-form product category name, accepting aliases.
pub fn canonical_category(name: &str, domain: &SupportedDomain) -> Option<String> {
    if let Some(found) = domain.canonical_category(name) {
        return Some(found.to_string());
    }
    resolve_alias(name, CATEGORY_ALIASES)
        .and_then(|target| domain.canonical_category(target))
        .map(str::to_string)
}

fn resolve_alias(name: &str, table: &[(&str, &'static str)]) -> Option<&'static str> {
    let key = normalize_text(name);
    let key = key.trim();
    table.iter().find(|(alias, _)| *alias == key).map(|(_, target)| *target)
}

fn mentions(
    normalized: &str,
    table: &[(&str, &str)],
    known: &[String],
) -> Vec<(usize, String)> {
    let mut hits = Vec::new();
    for (alias, target) in table {
        if let Some(position) = first_position(normalized, alias) {
            hits.push((position, (*target).to_string()));
        }
    }
    for name in known {
        let phrase = normalize_text(name);
        if let Some(position) = first_position(normalized, phrase.trim()) {
            hits.push((position, name.clone()));
        }
    }
    hits
}

fn ordered(
    mut hits: Vec<(usize, String)>,
    canonicalize: impl Fn(&str) -> Option<String>,
) -> Vec<String> {
    hits.sort_by_key(|(position, _)| *position);
    let mut names: Vec<String> = Vec::new();
    for (_, name) in hits {
        let Some(canonical) = canonicalize(&name) else {
            continue;
        };
        if !names.contains(&canonical) {
            names.push(canonical);
        }
    }
    names
}

fn standalone_us(text: &str) -> Option<usize> {
    text.match_indices("US").map(|(index, _)| index).find(|index| {
        let before = text[..*index].chars().next_back();
        let after = text[index + 2..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Approximates where a raw-text byte offset lands in the normalized text so
/// ordering by first mention still holds.
fn position_in_normalized(text: &str, raw_index: usize, normalized: &str) -> usize {
    let prefix = normalize_text(&text[..raw_index]);
    prefix.len().saturating_sub(1).min(normalized.len())
}
