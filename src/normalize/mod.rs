//! Reshaping of raw uNoGS payloads.
//!
//! Every endpoint wraps its content in an `ITEMS` array, but the elements
//! differ per endpoint: title objects with string-typed fields, genre
//! listings as a run of single-key objects, and regions as positional
//! tuples scraped from the provider's pricing pages.

use crate::error::CatalogError;
use crate::models::{parse_id_list, GenreMap, RegionMap, TitleKind, TitleRecord};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

const SUPERCATEGORY_PREFIX: &str = "All ";

/// Extract the `ITEMS` array from a raw response.
pub fn verify(raw: &Value) -> Result<Vec<Value>, CatalogError> {
    let items = raw
        .get("ITEMS")
        .ok_or_else(|| CatalogError::MalformedResponse("response has no ITEMS field".to_string()))?
        .as_array()
        .ok_or_else(|| CatalogError::MalformedResponse("ITEMS is not an array".to_string()))?;

    if items.is_empty() {
        debug!("Response contains no items");
        return Err(CatalogError::EmptyResult);
    }

    Ok(items.clone())
}

/// Provider values are strings in practice, but ids and ratings have been
/// seen as bare numbers too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    fn text(&self) -> String {
        match self {
            Scalar::Text(s) => s.trim().to_string(),
            Scalar::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTitle {
    netflixid: Scalar,
    title: String,
    image: String,
    synopsis: String,
    rating: Scalar,
    #[serde(rename = "type")]
    kind: String,
    released: Scalar,
    runtime: String,
}

/// Map raw title objects to [`TitleRecord`]s.
///
/// A single malformed element fails the whole batch, so a provider format
/// change is reported instead of silently shrinking the results.
pub fn normalize_titles(items: &[Value]) -> Result<Vec<TitleRecord>, CatalogError> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let raw: RawTitle = serde_json::from_value(item.clone()).map_err(|e| {
                CatalogError::MalformedResponse(format!("title #{}: {}", index, e))
            })?;
            title_from_raw(raw)
                .map_err(|reason| CatalogError::MalformedResponse(format!("title #{}: {}", index, reason)))
        })
        .collect()
}

fn title_from_raw(raw: RawTitle) -> Result<TitleRecord, String> {
    let kind = match raw.kind.trim().to_ascii_lowercase().as_str() {
        "movie" => TitleKind::Movie,
        "series" => TitleKind::Series,
        other => return Err(format!("unknown title type '{}'", other)),
    };

    let id = raw.netflixid.text();
    if id.is_empty() {
        return Err("empty netflixid".to_string());
    }

    Ok(TitleRecord {
        id,
        name: raw.title.trim().to_string(),
        poster_url: raw.image.trim().to_string(),
        synopsis: raw.synopsis.trim().to_string(),
        rating: raw.rating.text().parse().ok(),
        kind,
        release_year: raw.released.text().parse().ok(),
        runtime_minutes: parse_runtime(&raw.runtime),
    })
}

/// Parse runtimes like `"1h54m"`, `"2h"`, `"48m"` or a bare `"114"`.
fn parse_runtime(runtime: &str) -> Option<u32> {
    let runtime = runtime.trim();
    if runtime.is_empty() {
        return None;
    }
    if let Ok(minutes) = runtime.parse() {
        return Some(minutes);
    }

    let mut total = 0u32;
    let mut digits = String::new();
    for c in runtime.chars() {
        match c {
            '0'..='9' => digits.push(c),
            'h' | 'm' => {
                let value: u32 = digits.parse().ok()?;
                let minutes = if c == 'h' { value.checked_mul(60)? } else { value };
                total = total.checked_add(minutes)?;
                digits.clear();
            }
            ' ' => {}
            _ => return None,
        }
    }
    if !digits.is_empty() {
        return None;
    }
    Some(total)
}

/// Collect the supercategory genres from a genre listing.
///
/// The provider lists supercategories first, each keyed `"All <name>"`.
/// Reading stops at the first key without that prefix.
pub fn normalize_genres(items: &[Value]) -> Result<GenreMap, CatalogError> {
    let mut genres = GenreMap::new();

    'items: for (index, item) in items.iter().enumerate() {
        let entry = item.as_object().ok_or_else(|| {
            CatalogError::UnexpectedFormat(format!("genre entry #{} is not an object", index))
        })?;

        for (key, value) in entry {
            let Some(name) = key.strip_prefix(SUPERCATEGORY_PREFIX) else {
                debug!("Supercategories end before '{}'", key);
                break 'items;
            };
            if name.trim().is_empty() {
                return Err(CatalogError::UnexpectedFormat(format!(
                    "genre entry #{} has no name after '{}'",
                    index, SUPERCATEGORY_PREFIX
                )));
            }
            let ids = parse_id_list(value).ok_or_else(|| {
                CatalogError::UnexpectedFormat(format!("genre '{}' has no id list", key))
            })?;
            genres.insert(name, ids);
        }
    }

    if genres.is_empty() {
        warn!("No supercategory genres found in response");
        return Err(CatalogError::UnexpectedFormat(
            "could not extract the genres from the response".to_string(),
        ));
    }

    debug!("Extracted {} supercategory genres", genres.len());
    Ok(genres)
}

/// Build the region map from `[code, country, name, ...]` tuples.
pub fn normalize_regions(items: &[Value]) -> Result<RegionMap, CatalogError> {
    let mut regions = RegionMap::new();

    for (index, item) in items.iter().enumerate() {
        let (code, name) = decode_region(item).ok_or_else(|| {
            CatalogError::UnexpectedFormat(format!(
                "could not extract region #{} from the response",
                index
            ))
        })?;
        regions.insert(name, code);
    }

    debug!("Extracted {} regions", regions.len() - 1);
    Ok(regions)
}

fn decode_region(item: &Value) -> Option<(String, String)> {
    let tuple = item.as_array()?;
    if tuple.len() < 3 {
        return None;
    }
    let code = match &tuple[0] {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let name = tuple[2].as_str()?.trim().to_string();
    if code.is_empty() || name.is_empty() {
        return None;
    }
    Some((code, name))
}
