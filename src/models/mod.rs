use crate::error::CatalogError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Display name of the "no region filter" choice.
pub const ALL_REGIONS: &str = "All regions";
/// Provider code sent for [`ALL_REGIONS`].
pub const ALL_REGIONS_CODE: &str = "all";
/// Provider genre id meaning "every genre".
pub const ALL_GENRES_ID: &str = "0";

pub const MIN_RATING: f32 = 0.0;
pub const MAX_RATING: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Titles,
    Genres,
    Regions,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Titles => "titles",
            QueryKind::Genres => "genres",
            QueryKind::Regions => "regions",
        }
    }
}

impl std::fmt::Display for QueryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleKind {
    Movie,
    Series,
}

impl std::fmt::Display for TitleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TitleKind::Movie => f.write_str("Movie"),
            TitleKind::Series => f.write_str("Series"),
        }
    }
}

/// Title type filter chosen by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TitleType {
    #[default]
    Any,
    Movie,
    Series,
}

impl TitleType {
    pub fn admits(&self, kind: TitleKind) -> bool {
        match self {
            TitleType::Any => true,
            TitleType::Movie => kind == TitleKind::Movie,
            TitleType::Series => kind == TitleKind::Series,
        }
    }
}

/// A normalized catalog title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleRecord {
    pub id: String,
    pub name: String,
    pub poster_url: String,
    pub synopsis: String,
    /// Blank in the provider data for titles nobody rated yet.
    pub rating: Option<f32>,
    pub kind: TitleKind,
    pub release_year: Option<u16>,
    pub runtime_minutes: Option<u32>,
}

impl TitleRecord {
    pub fn netflix_url(&self) -> String {
        format!("https://www.netflix.com/title/{}", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum GenreSelection {
    #[default]
    Any,
    Only(BTreeSet<String>),
}

/// The user's filter choices for a title search.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilters {
    pub region: String,
    pub genres: GenreSelection,
    pub min_rating: f32,
    pub max_rating: f32,
    pub title_type: TitleType,
}

impl Default for QueryFilters {
    fn default() -> Self {
        Self {
            region: ALL_REGIONS.to_string(),
            genres: GenreSelection::Any,
            min_rating: MIN_RATING,
            max_rating: MAX_RATING,
            title_type: TitleType::Any,
        }
    }
}

impl QueryFilters {
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_genres<I, S>(mut self, genres: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.genres = GenreSelection::Only(genres.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_ratings(mut self, min: f32, max: f32) -> Self {
        self.min_rating = min;
        self.max_rating = max;
        self
    }

    pub fn with_title_type(mut self, title_type: TitleType) -> Self {
        self.title_type = title_type;
        self
    }

    /// Reject filter combinations the caller should have caught.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let in_range = |r: f32| (MIN_RATING..=MAX_RATING).contains(&r);
        if !in_range(self.min_rating) || !in_range(self.max_rating) {
            return Err(CatalogError::PreconditionViolation(format!(
                "ratings must be within {}..={}, got {}..={}",
                MIN_RATING, MAX_RATING, self.min_rating, self.max_rating
            )));
        }
        if self.min_rating > self.max_rating {
            return Err(CatalogError::PreconditionViolation(format!(
                "minimum rating {} exceeds maximum rating {}",
                self.min_rating, self.max_rating
            )));
        }
        if matches!(&self.genres, GenreSelection::Only(set) if set.is_empty()) {
            return Err(CatalogError::PreconditionViolation(
                "at least one genre must be selected".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a title passes the rating and type filters.
    ///
    /// Unrated titles only pass when the minimum rating is left at zero.
    pub fn admits(&self, title: &TitleRecord) -> bool {
        if !self.title_type.admits(title.kind) {
            return false;
        }
        match title.rating {
            Some(rating) => rating >= self.min_rating && rating <= self.max_rating,
            None => self.min_rating <= MIN_RATING,
        }
    }
}

/// Supercategory genre name to the ids of its subcategories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenreMap {
    genres: BTreeMap<String, Vec<u64>>,
}

impl GenreMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, name: impl Into<String>, ids: Vec<u64>) {
        self.genres.insert(name.into(), ids);
    }

    pub fn ids(&self, name: &str) -> Option<&[u64]> {
        self.genres.get(name).map(Vec::as_slice)
    }

    /// Genre names in alphabetical order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.genres.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.genres.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genres.is_empty()
    }

    /// Cached form: a single object mapping each name to its id list.
    pub fn to_items(&self) -> Vec<Value> {
        let object: Map<String, Value> = self
            .genres
            .iter()
            .map(|(name, ids)| (name.clone(), Value::from(ids.clone())))
            .collect();
        vec![Value::Object(object)]
    }

    pub fn from_items(items: &[Value]) -> Result<Self, CatalogError> {
        let object = items
            .first()
            .and_then(Value::as_object)
            .ok_or_else(|| CatalogError::UnexpectedFormat("cached genres are not an object".to_string()))?;

        let mut map = GenreMap::new();
        for (name, value) in object {
            let ids = parse_id_list(value).ok_or_else(|| {
                CatalogError::UnexpectedFormat(format!("cached genre '{}' has no id list", name))
            })?;
            map.insert(name.clone(), ids);
        }

        if map.is_empty() {
            return Err(CatalogError::UnexpectedFormat("cached genre map is empty".to_string()));
        }
        Ok(map)
    }
}

/// Parse `[801362, "1568", ...]` into numeric ids.
pub(crate) fn parse_id_list(value: &Value) -> Option<Vec<u64>> {
    value
        .as_array()?
        .iter()
        .map(|id| match id {
            Value::Number(n) => n.as_u64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .collect()
}

/// Region display name to provider region code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionMap {
    regions: BTreeMap<String, String>,
}

impl Default for RegionMap {
    fn default() -> Self {
        Self::new()
    }
}

impl RegionMap {
    /// A map holding only the "All regions" entry.
    pub fn new() -> Self {
        let mut regions = BTreeMap::new();
        regions.insert(ALL_REGIONS.to_string(), ALL_REGIONS_CODE.to_string());
        Self { regions }
    }

    /// Add a region. The "All regions" entry is reserved and never replaced.
    pub(crate) fn insert(&mut self, name: impl Into<String>, code: impl Into<String>) {
        let name = name.into();
        if name == ALL_REGIONS {
            return;
        }
        self.regions.insert(name, code.into());
    }

    pub fn code(&self, name: &str) -> Option<&str> {
        self.regions.get(name).map(String::as_str)
    }

    /// Region names, alphabetical, with "All regions" first.
    pub fn names(&self) -> Vec<&str> {
        let mut names = vec![ALL_REGIONS];
        names.extend(
            self.regions
                .keys()
                .map(String::as_str)
                .filter(|name| *name != ALL_REGIONS),
        );
        names
    }

    /// Number of entries, counting the "All regions" entry.
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn to_items(&self) -> Vec<Value> {
        let object: Map<String, Value> = self
            .regions
            .iter()
            .map(|(name, code)| (name.clone(), Value::String(code.clone())))
            .collect();
        vec![Value::Object(object)]
    }

    pub fn from_items(items: &[Value]) -> Result<Self, CatalogError> {
        let object = items
            .first()
            .and_then(Value::as_object)
            .ok_or_else(|| CatalogError::UnexpectedFormat("cached regions are not an object".to_string()))?;

        let mut map = RegionMap::new();
        for (name, code) in object {
            let code = code.as_str().ok_or_else(|| {
                CatalogError::UnexpectedFormat(format!("cached region '{}' has no code", name))
            })?;
            map.insert(name.clone(), code);
        }
        Ok(map)
    }
}
