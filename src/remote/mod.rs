//! # Remote Service
//!
//! Everything that touches the media server: the HTTP client, the raw and
//! validated data types, and the validators that sit between them.

pub mod client;
pub mod types;
pub mod validate;

pub use client::{ClientError, SeerrClient, TransportError, WireClient};
pub use types::{
    Availability, ImageBlob, ImageFormat, Listing, MediaDetail, MediaItem, MediaKind, PosterSize,
    RawResponse, RequestConfirmation,
};
pub use validate::ValidationError;
