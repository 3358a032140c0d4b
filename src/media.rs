//! Media references and normalization.
//!
//! Nodes store media in heterogeneous encodings: embedded base64 bytes
//! (typically pasted or freshly generated), a remote locator returned by a
//! backend or the staging service, or a local ephemeral handle owned by the
//! (excluded) renderer. [`MediaRef`] is the single normalized form the rest
//! of the engine works with; [`MediaRef::parse`] folds raw string encodings
//! into it.
//!
//! # Examples
//!
//! ```rust
//! use musegraph::media::MediaRef;
//!
//! let remote = MediaRef::parse("https://cdn.example.com/a.png");
//! assert!(matches!(remote, MediaRef::Remote { .. }));
//!
//! let embedded = MediaRef::from_bytes("image/png", &[0x89, 0x50]);
//! assert!(embedded.is_embedded());
//! let bytes = embedded.decode_embedded().unwrap();
//! assert_eq!(bytes, vec![0x89, 0x50]);
//! ```

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while decoding or normalizing media references.
#[derive(Debug, Error, Diagnostic)]
pub enum MediaError {
    /// The embedded payload is not valid base64.
    #[error("embedded media payload is not valid base64: {source}")]
    #[diagnostic(code(musegraph::media::base64))]
    Base64 {
        #[from]
        source: base64::DecodeError,
    },

    /// A data URL was structurally malformed.
    #[error("malformed data url: {reason}")]
    #[diagnostic(
        code(musegraph::media::data_url),
        help("Expected the form `data:<mime>;base64,<payload>`.")
    )]
    MalformedDataUrl { reason: &'static str },

    /// An ephemeral handle cannot be resolved outside the renderer process.
    #[error("ephemeral media handle `{handle}` cannot be fetched by the engine")]
    #[diagnostic(
        code(musegraph::media::ephemeral),
        help("Stage the media to a stable locator before running the node.")
    )]
    EphemeralUnfetchable { handle: String },

    /// Inline decode was requested on a non-embedded reference.
    #[error("`{locator}` carries no inline payload to decode")]
    #[diagnostic(code(musegraph::media::not_embedded))]
    NotEmbedded { locator: String },
}

/// A normalized reference to a piece of media.
///
/// `Embedded` carries the bytes inline (base64); `Remote` points at a stable
/// locator; `Ephemeral` is a renderer-local handle that the engine can pass
/// through but never fetch or submit to a backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MediaRef {
    Embedded { mime: String, data: String },
    Remote { url: String },
    Ephemeral { handle: String },
}

impl MediaRef {
    /// Embed raw bytes as a base64 payload.
    #[must_use]
    pub fn from_bytes(mime: impl Into<String>, bytes: &[u8]) -> Self {
        Self::Embedded {
            mime: mime.into(),
            data: BASE64.encode(bytes),
        }
    }

    /// Wrap a stable remote locator.
    #[must_use]
    pub fn remote(url: impl Into<String>) -> Self {
        Self::Remote { url: url.into() }
    }

    /// Normalize a raw string-encoded reference.
    ///
    /// - `data:` URLs become `Embedded`
    /// - `http://` / `https://` become `Remote`
    /// - anything else (e.g. `blob:` handles) becomes `Ephemeral`
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("data:") {
            Self::from_data_url(raw).unwrap_or_else(|_| Self::Ephemeral {
                handle: raw.to_string(),
            })
        } else if raw.starts_with("http://") || raw.starts_with("https://") {
            Self::Remote {
                url: raw.to_string(),
            }
        } else {
            Self::Ephemeral {
                handle: raw.to_string(),
            }
        }
    }

    /// Parse a `data:<mime>;base64,<payload>` URL into an embedded reference.
    pub fn from_data_url(url: &str) -> Result<Self, MediaError> {
        let rest = url
            .strip_prefix("data:")
            .ok_or(MediaError::MalformedDataUrl {
                reason: "missing `data:` scheme",
            })?;
        let (head, payload) = rest.split_once(',').ok_or(MediaError::MalformedDataUrl {
            reason: "missing `,` separator",
        })?;
        let mime = head
            .strip_suffix(";base64")
            .ok_or(MediaError::MalformedDataUrl {
                reason: "only base64 data urls are supported",
            })?;
        Ok(Self::Embedded {
            mime: if mime.is_empty() {
                "application/octet-stream".to_string()
            } else {
                mime.to_string()
            },
            data: payload.to_string(),
        })
    }

    /// Render an embedded reference as a data URL; remote and ephemeral
    /// references return their locator unchanged.
    #[must_use]
    pub fn as_locator(&self) -> String {
        match self {
            Self::Embedded { mime, data } => format!("data:{mime};base64,{data}"),
            Self::Remote { url } => url.clone(),
            Self::Ephemeral { handle } => handle.clone(),
        }
    }

    /// Returns `true` for inline base64 payloads.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        matches!(self, Self::Embedded { .. })
    }

    /// Decode the inline payload.
    pub fn decode_embedded(&self) -> Result<Vec<u8>, MediaError> {
        match self {
            Self::Embedded { data, .. } => Ok(BASE64.decode(data)?),
            Self::Remote { .. } => Err(MediaError::NotEmbedded {
                locator: self.as_locator(),
            }),
            Self::Ephemeral { handle } => Err(MediaError::EphemeralUnfetchable {
                handle: handle.clone(),
            }),
        }
    }
}

/// A crop rectangle declared against a coordinate space of
/// `declared_width × declared_height` pixels.
///
/// The declared space is whatever the base reference measured when the user
/// drew the rectangle; the actual decode may be a downscaled preview, so the
/// resolver rescales by `decoded/declared` before sampling
/// (see [`resolver::crop`](crate::resolver::crop)).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    #[must_use]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Returns `true` when the rectangle samples a positive area.
    #[must_use]
    pub fn is_positive(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}
