use serde::{Deserialize, Serialize};

use crate::kinopoisk::{CatalogError, FilmItem, StaffEntry};

/// Stored when the catalog has neither a localized nor an original title.
pub const UNTITLED_FILM_NAME: &str = "Без названия";

const MAX_NAME_CHARS: usize = 255;
const MAX_POSTER_URL_CHARS: usize = 500;

/// A film item from the catalog, reduced to the columns kept locally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FilmRecord {
    pub kinopoisk_id: i32,
    pub name: String,
    pub year: Option<i32>,
}

impl FilmRecord {
    /// `None` when the item carries no catalog id; such items cannot be reconciled.
    pub fn from_item(item: &FilmItem) -> Option<Self> {
        let kinopoisk_id = item.kinopoisk_id?;
        let name = non_blank(item.name_ru.as_deref())
            .or_else(|| non_blank(item.name_original.as_deref()))
            .unwrap_or(UNTITLED_FILM_NAME);

        Some(Self {
            kinopoisk_id,
            name: truncate_name(name),
            year: item.year,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActorRecord {
    pub staff_id: i32,
    pub name: Option<String>,
    pub poster_url: Option<String>,
    pub profession: Option<String>,
}

impl ActorRecord {
    pub fn from_entry(entry: &StaffEntry) -> Result<Self, CatalogError> {
        let Some(staff_id) = entry.staff_id else {
            return Err(CatalogError::invalid("staff", "entry without staffId"));
        };

        let poster_url = match non_blank(entry.poster_url.as_deref()) {
            Some(url) => Some(
                check_poster_url(url)
                    .map_err(|reason| CatalogError::invalid("staff", format!("{staff_id}: {reason}")))?,
            ),
            None => None,
        };

        let name = non_blank(entry.name_ru.as_deref())
            .or_else(|| non_blank(entry.name_en.as_deref()))
            .map(truncate_name);

        Ok(Self {
            staff_id,
            name,
            poster_url,
            profession: non_blank(entry.profession_text.as_deref()).map(truncate_name),
        })
    }
}

/// Validates a whole staff list up front so nothing is written for a film
/// whose payload is partly malformed.
pub fn actor_records(entries: &[StaffEntry]) -> Result<Vec<ActorRecord>, CatalogError> {
    entries.iter().map(ActorRecord::from_entry).collect()
}

pub fn check_poster_url(raw: &str) -> Result<String, String> {
    let raw = raw.trim();
    if raw.chars().count() > MAX_POSTER_URL_CHARS {
        return Err(format!("poster url longer than {MAX_POSTER_URL_CHARS} characters"));
    }
    let parsed = url::Url::parse(raw).map_err(|e| format!("poster url is not a valid url: {e}"))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err("poster url must use http or https".to_string());
    }
    Ok(raw.to_string())
}

fn truncate_name(value: &str) -> String {
    value.chars().take(MAX_NAME_CHARS).collect()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub synced_count: usize,
    pub total_pages: u32,
    pub current_page: u32,
}
