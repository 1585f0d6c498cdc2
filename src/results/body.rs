use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Request or response payload carried by a processed result.
///
/// Text bodies serialise as a plain JSON string. Byte bodies serialise as
/// `{"encoding": "utf8", "value": ...}` when they are valid UTF-8 and as
/// `{"encoding": "base64", "value": ...}` otherwise, so decoding always
/// restores the original variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Text(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum BodyEncoding {
    Utf8,
    Base64,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum BodyRepr {
    Text(String),
    Encoded { encoding: BodyEncoding, value: String },
}

impl Body {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Bytes(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Body {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Body {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<Vec<u8>> for Body {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl Serialize for Body {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let repr = match self {
            Self::Text(text) => BodyRepr::Text(text.clone()),
            Self::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => BodyRepr::Encoded {
                    encoding: BodyEncoding::Utf8,
                    value: text.to_owned(),
                },
                Err(_) => BodyRepr::Encoded {
                    encoding: BodyEncoding::Base64,
                    value: STANDARD.encode(bytes),
                },
            },
        };
        repr.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Body {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match BodyRepr::deserialize(deserializer)? {
            BodyRepr::Text(text) => Ok(Self::Text(text)),
            BodyRepr::Encoded {
                encoding: BodyEncoding::Utf8,
                value,
            } => Ok(Self::Bytes(value.into_bytes())),
            BodyRepr::Encoded {
                encoding: BodyEncoding::Base64,
                value,
            } => STANDARD
                .decode(value.as_bytes())
                .map(Self::Bytes)
                .map_err(serde::de::Error::custom),
        }
    }
}
