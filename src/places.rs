use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A finite latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Returns `None` unless both components are finite.
    pub fn new(latitude: f64, longitude: f64) -> Option<Self> {
        if latitude.is_finite() && longitude.is_finite() {
            Some(Self {
                latitude,
                longitude,
            })
        } else {
            None
        }
    }

    pub fn from_fields(lat: &CoordinateField, lng: &CoordinateField) -> Option<Self> {
        Self::new(lat.to_finite()?, lng.to_finite()?)
    }
}

/// A coordinate as it arrives from upstream: a JSON number or a decimal string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CoordinateField {
    Number(f64),
    Text(String),
}

impl CoordinateField {
    /// `null` and blank strings read as absent; any other non-numeric value is
    /// kept as text so it counts as present-but-malformed.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(number) => number.as_f64().map(CoordinateField::Number),
            Value::String(text) if text.trim().is_empty() => None,
            Value::String(text) => Some(CoordinateField::Text(text.clone())),
            other => Some(CoordinateField::Text(other.to_string())),
        }
    }

    pub fn to_finite(&self) -> Option<f64> {
        let value = match self {
            CoordinateField::Number(value) => *value,
            CoordinateField::Text(text) => text.trim().parse::<f64>().ok()?,
        };
        value.is_finite().then_some(value)
    }
}

/// A named geographic point. Coordinates are both present or both absent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Place {
    pub name: String,
    #[serde(flatten)]
    pub coordinates: Option<Coordinates>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Place {
    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            coordinates: None,
            display_name: None,
            description: None,
        }
    }

    pub fn resolved(
        name: impl Into<String>,
        coordinates: Coordinates,
        display_name: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            coordinates: Some(coordinates),
            display_name,
            description: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.coordinates.is_some()
    }

    pub fn latitude(&self) -> Option<f64> {
        self.coordinates.map(|c| c.latitude)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.coordinates.map(|c| c.longitude)
    }

    /// Label shown to readers: the resolved display name, else the queried name.
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.name)
    }
}

/// A place candidate as extracted from model text, before coercion or resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialPlace {
    pub name: String,
    pub lat: Option<CoordinateField>,
    pub lng: Option<CoordinateField>,
    pub description: Option<String>,
}

impl PartialPlace {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lat: None,
            lng: None,
            description: None,
        }
    }

    pub fn with_coordinates(name: impl Into<String>, lat: f64, lng: f64) -> Self {
        Self {
            name: name.into(),
            lat: Some(CoordinateField::Number(lat)),
            lng: Some(CoordinateField::Number(lng)),
            description: None,
        }
    }

    /// Both coordinate fields are present, whether or not they coerce.
    pub fn carries_coordinates(&self) -> bool {
        self.lat.is_some() && self.lng.is_some()
    }

    pub fn coordinates(&self) -> Option<Coordinates> {
        match (&self.lat, &self.lng) {
            (Some(lat), Some(lng)) => Coordinates::from_fields(lat, lng),
            _ => None,
        }
    }

    /// Coerce inline coordinates; malformed or partial pairs demote to name-only.
    pub fn into_place(self) -> Place {
        let coordinates = self.coordinates();
        Place {
            name: self.name,
            coordinates,
            display_name: None,
            description: self.description,
        }
    }
}

/// The normalized message handed to the chat and map views.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredReply {
    pub text: String,
    pub places: Vec<Place>,
}

impl StructuredReply {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            places: Vec::new(),
        }
    }

    /// Places that can be pinned on the map.
    pub fn mappable(&self) -> impl Iterator<Item = &Place> {
        self.places.iter().filter(|place| place.is_resolved())
    }
}
