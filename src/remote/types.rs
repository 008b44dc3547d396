use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// The two kinds of media the server knows how to request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Tv,
}

impl MediaKind {
    /// Wire name, as used in `mediaType` fields and URL paths.
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Tv => "tv",
        }
    }

    pub fn from_wire(value: &str) -> Option<MediaKind> {
        match value {
            "movie" => Some(MediaKind::Movie),
            "tv" => Some(MediaKind::Tv),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MediaKind::Movie => "Movies",
            MediaKind::Tv => "TV Shows",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validated search or discover entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaItem {
    pub id: u64,
    pub kind: MediaKind,
    pub title: String,
    pub year: Option<String>,
    pub overview: Option<String>,
    /// Only set when the path passed [`crate::remote::validate::sanitize_poster_path`].
    pub poster_path: Option<String>,
    pub rating: Option<f64>,
}

impl MediaItem {
    /// "Title (1999)" or just "Title".
    pub fn display_title(&self) -> String {
        match &self.year {
            Some(year) => format!("{} ({})", self.title, year),
            None => self.title.clone(),
        }
    }
}

/// A validated page of results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Listing {
    pub items: Vec<MediaItem>,
    pub page: u32,
    pub total_pages: u32,
}

impl Listing {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Where a title stands on the media server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Unknown,
    Pending,
    Processing,
    PartiallyAvailable,
    Available,
}

impl Availability {
    pub fn from_status(status: u8) -> Option<Availability> {
        match status {
            1 => Some(Availability::Unknown),
            2 => Some(Availability::Pending),
            3 => Some(Availability::Processing),
            4 => Some(Availability::PartiallyAvailable),
            5 => Some(Availability::Available),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Availability::Unknown => "Not requested",
            Availability::Pending => "Pending approval",
            Availability::Processing => "Processing",
            Availability::PartiallyAvailable => "Partially available",
            Availability::Available => "Available",
        }
    }
}

/// A validated detail record for one title.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaDetail {
    pub item: MediaItem,
    pub runtime_minutes: Option<u32>,
    pub genres: Vec<String>,
    pub availability: Option<Availability>,
}

/// Server acknowledgement of a media request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestConfirmation {
    pub request_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

/// Validated image bytes, shared between the cache and any reader.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBlob {
    pub format: ImageFormat,
    bytes: Arc<[u8]>,
}

impl ImageBlob {
    pub fn new(format: ImageFormat, bytes: Vec<u8>) -> Self {
        Self {
            format,
            bytes: Arc::from(bytes),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Bytes accounted against the cache's size bound.
    pub fn byte_size(&self) -> usize {
        self.bytes.len()
    }
}

/// An undecoded server answer. Nothing downstream sees this until a
/// validator has turned it into one of the types above.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }
}

/// TMDB poster widths.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum PosterSize {
    W92,
    W154,
    W185,
    W342,
    #[default]
    W500,
    W780,
    Original,
}

impl PosterSize {
    pub fn as_str(self) -> &'static str {
        match self {
            PosterSize::W92 => "w92",
            PosterSize::W154 => "w154",
            PosterSize::W185 => "w185",
            PosterSize::W342 => "w342",
            PosterSize::W500 => "w500",
            PosterSize::W780 => "w780",
            PosterSize::Original => "original",
        }
    }
}
