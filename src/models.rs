//! Modelos de dominio: proyectos inmobiliarios, comentarios y desgloses de
//! valoración tal y como los consume el panel, ya validados.

use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// Por debajo de esta valoración un proyecto se marca como "requiere atención".
pub const LOW_RATING_THRESHOLD: f64 = 3.5;

pub const MIN_RATING: f64 = 0.0;
pub const MAX_RATING: f64 = 5.0;

/// Un proyecto inmobiliario descubierto por el modelo, ya normalizado.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    #[serde(rename = "projectName")]
    pub name: String,
    pub address: String,
    /// Siempre dentro de [0, 5] tras la normalización.
    pub rating: f64,
    /// `None` significa "desconocido", que no es lo mismo que 0 reseñas.
    pub review_count: Option<u64>,
    pub comments: Vec<CommentRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_breakdown: Option<RatingBreakdown>,
}

impl ProjectRecord {
    pub fn needs_attention(&self) -> bool {
        self.rating < LOW_RATING_THRESHOLD
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentRecord {
    pub text: String,
    pub sentiment: Sentiment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sentiment {
    Positive,
    Negative,
    Neutral,
}

impl Sentiment {
    /// Acepta la etiqueta sin distinguir mayúsculas; cualquier otra cosa es neutral.
    pub fn parse_lenient(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "positive" => Self::Positive,
            "negative" => Self::Negative,
            _ => Self::Neutral,
        }
    }
}

/// Los cinco cubos fijos del desglose, de mayor a menor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarBucket {
    Five,
    Four,
    Three,
    Two,
    One,
}

impl StarBucket {
    pub const ALL: [StarBucket; 5] = [
        StarBucket::Five,
        StarBucket::Four,
        StarBucket::Three,
        StarBucket::Two,
        StarBucket::One,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Five => "5",
            Self::Four => "4",
            Self::Three => "3",
            Self::Two => "2",
            Self::One => "1",
        }
    }

    /// Reconoce tanto `"5"` como las variantes `"5-star"`, `"5_star"` o `"5 star"`.
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        let digit = key
            .strip_suffix("star")
            .map(|rest| rest.trim_end_matches(['-', '_', ' ']))
            .unwrap_or(key.as_str());
        Self::ALL.into_iter().find(|bucket| bucket.label() == digit)
    }

    fn index(self) -> usize {
        match self {
            Self::Five => 0,
            Self::Four => 1,
            Self::Three => 2,
            Self::Two => 3,
            Self::One => 4,
        }
    }
}

/// Número de reseñas por cubo de estrellas. Es información orientativa:
/// no se garantiza que la suma coincida con `review_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RatingBreakdown {
    counts: [u64; 5],
}

impl RatingBreakdown {
    pub fn from_counts(counts: [(StarBucket, u64); 5]) -> Self {
        let mut breakdown = Self::default();
        for (bucket, count) in counts {
            breakdown.counts[bucket.index()] = count;
        }
        breakdown
    }

    pub fn get(&self, bucket: StarBucket) -> u64 {
        self.counts[bucket.index()]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (StarBucket, u64)> + '_ {
        StarBucket::ALL.into_iter().map(|bucket| (bucket, self.get(bucket)))
    }
}

impl Serialize for RatingBreakdown {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(5))?;
        for (bucket, count) in self.iter() {
            map.serialize_entry(bucket.label(), &count)?;
        }
        map.end()
    }
}

/// Coordenadas sobre las que se lanza la búsqueda.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(anyhow!("Latitud fuera de rango: {latitude}"));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(anyhow!("Longitud fuera de rango: {longitude}"));
        }
        Ok(Self { latitude, longitude })
    }
}

/// Intervalo de fechas (ambas inclusive) para filtrar los comentarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self> {
        if from > to {
            return Err(anyhow!(
                "La fecha inicial ({from}) es posterior a la final ({to})"
            ));
        }
        Ok(Self { from, to })
    }
}

// --- Forma esperada de la respuesta del modelo (sólo para el prompt) ---

mod payload {
    // Sólo se leen a través del esquema generado.
    #![allow(dead_code)]

    use schemars::JsonSchema;

    #[derive(JsonSchema)]
    #[serde(rename_all = "camelCase")]
    pub(super) struct ProjectPayload {
        project_name: String,
        address: String,
        /// Valoración media sobre 5.
        rating: f64,
        review_count: Option<u64>,
        /// Entre 3 y 5 comentarios recientes.
        comments: Vec<CommentPayload>,
        rating_breakdown: Option<BreakdownPayload>,
    }

    #[derive(JsonSchema)]
    struct CommentPayload {
        text: String,
        /// "Positive", "Negative" o "Neutral".
        sentiment: String,
    }

    #[derive(JsonSchema)]
    struct BreakdownPayload {
        #[serde(rename = "5-star")]
        five: u64,
        #[serde(rename = "4-star")]
        four: u64,
        #[serde(rename = "3-star")]
        three: u64,
        #[serde(rename = "2-star")]
        two: u64,
        #[serde(rename = "1-star")]
        one: u64,
    }
}

/// Esquema JSON del array que se pide al modelo, para incluirlo en el prompt.
pub fn payload_schema_json() -> String {
    let schema = schemars::schema_for!(Vec<payload::ProjectPayload>);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
