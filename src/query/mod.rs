use crate::error::CatalogError;
use crate::models::{
    GenreMap, GenreSelection, QueryFilters, RegionMap, ALL_GENRES_ID, ALL_REGIONS, ALL_REGIONS_CODE,
};
use std::collections::BTreeSet;
use std::fmt;

pub const DEFAULT_BASE_URL: &str = "https://unogs-unogs-v1.p.rapidapi.com";
pub const DEFAULT_API_HOST: &str = "unogs-unogs-v1.p.rapidapi.com";

/// Deterministic encoding of a title search.
///
/// The same string is sent as the provider query and stored as the cache
/// key, so a cache hit always corresponds to the request that would be made.
/// Only the region code and genre ids vary; release years, ratings, type,
/// audio, subtitles and votes are pinned to "include everything".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Build from an already-resolved region code and genre id set.
    ///
    /// An empty id set means "all genres".
    pub fn from_parts(region_code: &str, genre_ids: &BTreeSet<u64>) -> Self {
        let genres = if genre_ids.is_empty() {
            ALL_GENRES_ID.to_string()
        } else {
            genre_ids
                .iter()
                .map(u64::to_string)
                .collect::<Vec<_>>()
                .join("%2C")
        };

        Fingerprint(format!(
            "q=-!0%2C3000-!0%2C10-!0%2C10-!{}-!Any-!Any-!Any-!-!&t=ns&cl={}&st=adv&ob=Relevance&p=1&sa=or",
            genres,
            urlencoding::encode(region_code)
        ))
    }

    /// Resolve the filters' region and genre names and build the fingerprint.
    pub fn resolve(
        filters: &QueryFilters,
        regions: Option<&RegionMap>,
        genres: Option<&GenreMap>,
    ) -> Result<Self, CatalogError> {
        let region_code = resolve_region(&filters.region, regions)?;
        let genre_ids = resolve_genres(&filters.genres, genres)?;
        Ok(Self::from_parts(&region_code, &genre_ids))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn resolve_region(region: &str, regions: Option<&RegionMap>) -> Result<String, CatalogError> {
    if region == ALL_REGIONS {
        return Ok(ALL_REGIONS_CODE.to_string());
    }
    regions
        .and_then(|map| map.code(region))
        .map(str::to_string)
        .ok_or_else(|| CatalogError::PreconditionViolation(format!("unknown region '{}'", region)))
}

fn resolve_genres(
    selection: &GenreSelection,
    genres: Option<&GenreMap>,
) -> Result<BTreeSet<u64>, CatalogError> {
    let names = match selection {
        GenreSelection::Any => return Ok(BTreeSet::new()),
        GenreSelection::Only(names) => names,
    };

    if names.is_empty() {
        return Err(CatalogError::PreconditionViolation(
            "at least one genre must be selected".to_string(),
        ));
    }

    let mut ids = BTreeSet::new();
    for name in names {
        let genre_ids = genres
            .and_then(|map| map.ids(name))
            .ok_or_else(|| CatalogError::PreconditionViolation(format!("unknown genre '{}'", name)))?;
        ids.extend(genre_ids.iter().copied());
    }
    Ok(ids)
}

/// Provider endpoint URLs.
#[derive(Debug, Clone)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    pub fn titles(&self, fingerprint: &Fingerprint) -> String {
        format!("{}/aaapi.cgi?{}", self.base_url, fingerprint)
    }

    pub fn genres(&self) -> String {
        format!("{}/api.cgi?t=genres", self.base_url)
    }

    pub fn regions(&self) -> String {
        format!("{}/aaapi.cgi?t=lc&q=available", self.base_url)
    }
}
