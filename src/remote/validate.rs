//! # Validators
//!
//! Turn a [`RawResponse`] into a typed value, or refuse it outright.
//! A validator never returns a half-filled record: a missing required field
//! or a field of the wrong JSON type fails the whole response.
//!
//! Also home to the local input checks (query, page, id, poster path) that
//! run before anything is sent.

use serde::Deserialize;
use std::fmt;

use super::types::{
    Availability, ImageBlob, ImageFormat, Listing, MediaDetail, MediaItem, MediaKind, PosterSize,
    RawResponse, RequestConfirmation,
};

pub const MAX_QUERY_CHARS: usize = 200;
pub const MAX_PAGE: u32 = 1000;
const TMDB_IMAGE_BASE: &str = "https://image.tmdb.org/t/p";
const FORBIDDEN_QUERY_CHARS: &[char] = &['<', '>', '"', '\'', ';', '&', '|', '`', '$'];

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Body is not JSON, or a field has the wrong type.
    Malformed(String),
    MissingField(&'static str),
    InvalidField { field: &'static str, reason: String },
    UnexpectedStatus(u16),
    /// Local input rejected before any request was made.
    Input(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Malformed(msg) => write!(f, "malformed response: {msg}"),
            ValidationError::MissingField(field) => write!(f, "missing field `{field}`"),
            ValidationError::InvalidField { field, reason } => {
                write!(f, "invalid field `{field}`: {reason}")
            }
            ValidationError::UnexpectedStatus(status) => write!(f, "unexpected HTTP {status}"),
            ValidationError::Input(msg) => write!(f, "invalid input: {msg}"),
        }
    }
}

impl std::error::Error for ValidationError {}

// ============================================================================
// Wire shapes
// ============================================================================

#[derive(Deserialize, Debug)]
struct WireListing {
    #[serde(default)]
    page: Option<u32>,
    #[serde(rename = "totalPages", default)]
    total_pages: Option<u32>,
    results: Vec<WireItem>,
}

#[derive(Deserialize, Debug)]
struct WireItem {
    id: u64,
    #[serde(rename = "mediaType")]
    media_type: String,
    title: Option<String>,
    name: Option<String>,
    overview: Option<String>,
    #[serde(rename = "releaseDate")]
    release_date: Option<String>,
    #[serde(rename = "firstAirDate")]
    first_air_date: Option<String>,
    #[serde(rename = "posterPath")]
    poster_path: Option<String>,
    #[serde(rename = "voteAverage")]
    vote_average: Option<f64>,
}

#[derive(Deserialize, Debug)]
struct WireDetail {
    id: u64,
    title: Option<String>,
    name: Option<String>,
    overview: Option<String>,
    #[serde(rename = "releaseDate")]
    release_date: Option<String>,
    #[serde(rename = "firstAirDate")]
    first_air_date: Option<String>,
    #[serde(rename = "posterPath")]
    poster_path: Option<String>,
    #[serde(rename = "voteAverage")]
    vote_average: Option<f64>,
    runtime: Option<u32>,
    #[serde(rename = "episodeRunTime")]
    episode_run_time: Option<Vec<u32>>,
    #[serde(default)]
    genres: Vec<WireGenre>,
    #[serde(rename = "mediaInfo")]
    media_info: Option<WireMediaInfo>,
}

#[derive(Deserialize, Debug)]
struct WireGenre {
    name: String,
}

#[derive(Deserialize, Debug)]
struct WireMediaInfo {
    status: Option<u8>,
}

#[derive(Deserialize, Debug)]
struct WireConfirmation {
    id: u64,
}

#[derive(Deserialize, Debug)]
struct WireStatus {
    version: Option<String>,
}

// ============================================================================
// Response validators
// ============================================================================

fn parse<'a, T: Deserialize<'a>>(raw: &'a RawResponse) -> Result<T, ValidationError> {
    if !(200..300).contains(&raw.status) {
        return Err(ValidationError::UnexpectedStatus(raw.status));
    }
    serde_json::from_slice(&raw.body).map_err(|e| ValidationError::Malformed(e.to_string()))
}

fn require_id(id: u64) -> Result<u64, ValidationError> {
    if id == 0 {
        return Err(ValidationError::InvalidField {
            field: "id",
            reason: "must be positive".to_string(),
        });
    }
    Ok(id)
}

/// Leading four-digit year of an ISO date, if there is one.
fn year_of(date: Option<&str>) -> Option<String> {
    let year = date?.get(..4)?;
    year.chars().all(|c| c.is_ascii_digit()).then(|| year.to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Validates a search or discover page.
///
/// Entries of other media types (people, collections, the other kind) are
/// dropped; a malformed entry of any type fails the whole listing.
/// `limit` truncates the surviving entries.
pub fn validate_listing(
    raw: &RawResponse,
    kind: MediaKind,
    limit: Option<usize>,
) -> Result<Listing, ValidationError> {
    let wire: WireListing = parse(raw)?;

    let mut items = Vec::with_capacity(wire.results.len());
    for entry in wire.results {
        let id = require_id(entry.id)?;
        if MediaKind::from_wire(&entry.media_type) != Some(kind) {
            continue;
        }
        let date = match kind {
            MediaKind::Movie => entry.release_date.as_deref(),
            MediaKind::Tv => entry.first_air_date.as_deref(),
        };
        let title = match kind {
            MediaKind::Movie => entry.title.or(entry.name),
            MediaKind::Tv => entry.name.or(entry.title),
        };
        items.push(MediaItem {
            id,
            kind,
            title: non_blank(title).unwrap_or_else(|| "Unknown".to_string()),
            year: year_of(date),
            overview: non_blank(entry.overview),
            poster_path: entry.poster_path.and_then(|p| sanitize_poster_path(&p)),
            rating: entry.vote_average,
        });
    }

    if let Some(limit) = limit {
        items.truncate(limit);
    }

    Ok(Listing {
        items,
        page: wire.page.unwrap_or(1),
        total_pages: wire.total_pages.unwrap_or(1),
    })
}

/// Validates a movie or TV detail record. Movies need `title`, shows need `name`.
pub fn validate_detail(raw: &RawResponse, kind: MediaKind) -> Result<MediaDetail, ValidationError> {
    let wire: WireDetail = parse(raw)?;
    let id = require_id(wire.id)?;

    let (title, date, runtime) = match kind {
        MediaKind::Movie => (
            non_blank(wire.title).ok_or(ValidationError::MissingField("title"))?,
            wire.release_date,
            wire.runtime,
        ),
        MediaKind::Tv => (
            non_blank(wire.name).ok_or(ValidationError::MissingField("name"))?,
            wire.first_air_date,
            wire.episode_run_time.and_then(|r| r.first().copied()),
        ),
    };

    let availability = match wire.media_info.and_then(|info| info.status) {
        Some(status) => Some(Availability::from_status(status).ok_or_else(|| {
            ValidationError::InvalidField {
                field: "mediaInfo.status",
                reason: format!("unknown status {status}"),
            }
        })?),
        None => None,
    };

    Ok(MediaDetail {
        item: MediaItem {
            id,
            kind,
            title,
            year: year_of(date.as_deref()),
            overview: non_blank(wire.overview),
            poster_path: wire.poster_path.and_then(|p| sanitize_poster_path(&p)),
            rating: wire.vote_average,
        },
        runtime_minutes: runtime,
        genres: wire.genres.into_iter().map(|g| g.name).collect(),
        availability,
    })
}

/// Health check: any JSON object from `/status` counts. Returns the
/// reported server version, if any.
pub fn validate_status(raw: &RawResponse) -> Result<Option<String>, ValidationError> {
    let wire: WireStatus = parse(raw)?;
    Ok(non_blank(wire.version))
}

/// A request only counts as submitted when the server hands back its id.
pub fn validate_confirmation(raw: &RawResponse) -> Result<RequestConfirmation, ValidationError> {
    let wire: WireConfirmation = parse(raw)?;
    Ok(RequestConfirmation {
        request_id: require_id(wire.id)?,
    })
}

/// Accepts the body only if its magic bytes name a format we can show.
pub fn validate_image(raw: &RawResponse) -> Result<ImageBlob, ValidationError> {
    if !(200..300).contains(&raw.status) {
        return Err(ValidationError::UnexpectedStatus(raw.status));
    }
    let body = &raw.body;
    let format = if body.starts_with(&[0xFF, 0xD8, 0xFF]) {
        ImageFormat::Jpeg
    } else if body.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        ImageFormat::Png
    } else if body.starts_with(b"GIF87a") || body.starts_with(b"GIF89a") {
        ImageFormat::Gif
    } else if body.len() >= 12 && &body[..4] == b"RIFF" && &body[8..12] == b"WEBP" {
        ImageFormat::Webp
    } else if body.is_empty() {
        return Err(ValidationError::Malformed("empty image body".to_string()));
    } else {
        return Err(ValidationError::InvalidField {
            field: "body",
            reason: "unrecognized image format".to_string(),
        });
    };
    Ok(ImageBlob::new(format, raw.body.clone()))
}

// ============================================================================
// Input checks
// ============================================================================

/// Trims the query, strips shell/markup metacharacters, and enforces length.
pub fn sanitize_query(query: &str) -> Result<String, ValidationError> {
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(ValidationError::Input(format!(
            "query exceeds {MAX_QUERY_CHARS} characters"
        )));
    }
    let cleaned: String = query
        .chars()
        .filter(|c| !FORBIDDEN_QUERY_CHARS.contains(c))
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(ValidationError::Input("query is empty".to_string()));
    }
    Ok(cleaned.to_string())
}

pub fn validate_page(page: u32) -> Result<u32, ValidationError> {
    if page == 0 || page > MAX_PAGE {
        return Err(ValidationError::Input(format!(
            "page {page} outside 1..={MAX_PAGE}"
        )));
    }
    Ok(page)
}

pub fn validate_media_id(id: u64) -> Result<u64, ValidationError> {
    if id == 0 {
        return Err(ValidationError::Input("media id must be positive".to_string()));
    }
    Ok(id)
}

/// Returns the path if it is a plain absolute TMDB path.
pub fn sanitize_poster_path(path: &str) -> Option<String> {
    if !path.starts_with('/') || path.contains("..") || path.contains("//") {
        log::warn!("Rejected poster path: {:?}", path);
        return None;
    }
    Some(path.to_string())
}

pub fn poster_url(path: &str, size: PosterSize) -> Option<String> {
    let path = sanitize_poster_path(path)?;
    Some(format!("{TMDB_IMAGE_BASE}/{}{path}", size.as_str()))
}
