use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Base64 characters decoded per step; a multiple of 4 so chunks never split a quantum.
const DECODE_CHUNK: usize = 1024;

/// Server-assigned contact identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(pub i64);

impl std::fmt::Display for ContactId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ContactId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

/// Image bytes held locally before they have a durable URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime: String,
    pub data: Vec<u8>,
}

impl InlineImage {
    pub fn new(mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            data,
        }
    }

    /// Parse a `data:image/...;base64,...` URL.
    pub fn from_data_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| Error::InvalidPhoto("not a data URL".into()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::InvalidPhoto("data URL has no payload".into()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| Error::InvalidPhoto("data URL is not base64 encoded".into()))?;
        if !mime.starts_with("image/") {
            return Err(Error::InvalidPhoto(format!("unsupported type {}", mime)));
        }
        Ok(Self::new(mime, decode_base64_chunked(payload)?))
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.data))
    }
}

/// Decode base64 text in fixed-size slices into a single buffer.
pub fn decode_base64_chunked(payload: &str) -> Result<Vec<u8>> {
    let payload: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let mut out = Vec::with_capacity(payload.len() / 4 * 3);
    for chunk in payload.as_bytes().chunks(DECODE_CHUNK) {
        STANDARD
            .decode_vec(chunk, &mut out)
            .map_err(|e| Error::InvalidPhoto(format!("bad base64 data: {}", e)))?;
    }
    Ok(out)
}

/// A contact photo: nothing, an image awaiting upload, or a hosted URL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Photo {
    #[default]
    None,
    Inline(InlineImage),
    Remote(String),
}

impl Photo {
    /// Interpret the single-string wire form.
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();
        if value.is_empty() {
            Ok(Self::None)
        } else if value.starts_with("data:") {
            InlineImage::from_data_url(value).map(Self::Inline)
        } else {
            Ok(Self::Remote(value.to_string()))
        }
    }

    pub fn to_wire(&self) -> String {
        match self {
            Self::None => String::new(),
            Self::Inline(img) => img.to_data_url(),
            Self::Remote(url) => url.clone(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn remote_url(&self) -> Option<&str> {
        match self {
            Self::Remote(url) => Some(url.as_str()),
            _ => None,
        }
    }
}

impl Serialize for Photo {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wire())
    }
}

impl<'de> Deserialize<'de> for Photo {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Photo::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Contact fields without the identifier: request bodies and form drafts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactFields {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub photo: Photo,
}

impl ContactFields {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub photo: Photo,
}

impl Contact {
    pub fn from_fields(id: ContactId, fields: ContactFields) -> Self {
        Self {
            id,
            name: fields.name,
            email: fields.email,
            phone: fields.phone,
            address: fields.address,
            photo: fields.photo,
        }
    }

    pub fn fields(&self) -> ContactFields {
        ContactFields {
            name: self.name.clone(),
            email: self.email.clone(),
            phone: self.phone.clone(),
            address: self.address.clone(),
            photo: self.photo.clone(),
        }
    }

    /// Upper-cased first letter of the name, shown when there is no photo.
    pub fn initial(&self) -> String {
        self.name
            .trim()
            .chars()
            .next()
            .map(|c| c.to_uppercase().collect())
            .unwrap_or_default()
    }
}

/// A contact as the server returns it; any field may be missing or null.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteContact {
    pub id: ContactId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
}

impl RemoteContact {
    /// Fill every absent field with its empty value.
    pub fn normalize(self) -> Contact {
        let photo = self.photo.unwrap_or_default();
        let photo = match Photo::parse(&photo) {
            Ok(p) => p,
            Err(e) => {
                log::warn!("Contact {} has an unreadable photo: {}", self.id, e);
                Photo::None
            }
        };
        Contact {
            id: self.id,
            name: self.name.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            phone: self.phone.unwrap_or_default(),
            address: self.address.unwrap_or_default(),
            photo,
        }
    }
}
