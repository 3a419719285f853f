//! Convierte el JSON sin tipar devuelto por el modelo en `ProjectRecord`s.
//!
//! Política por campo:
//! - `projectName` y `address` son obligatorios: si faltan, el elemento se
//!   descarta y se cuenta.
//! - `rating` se recorta a [0, 5] en lugar de descartar el proyecto.
//! - `reviewCount` inválido pasa a "desconocido", nunca a 0.
//! - Un `sentiment` desconocido se trata como neutral.
//! - Un desglose incompleto se ignora; uno con todo a cero se conserva y
//!   es el panel quien decide no dibujarlo.
//!
//! Sólo un valor raíz que no sea array es un error.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ExtractionError;
use crate::models::{
    CommentRecord, ProjectRecord, RatingBreakdown, Sentiment, StarBucket, MAX_RATING, MIN_RATING,
};

/// Resultado de una normalización: proyectos válidos más los descartados.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Normalized {
    pub records: Vec<ProjectRecord>,
    pub dropped: usize,
}

impl Normalized {
    /// Todos los elementos se descartaron (distinto de recibir un array vacío).
    pub fn is_all_dropped(&self) -> bool {
        self.records.is_empty() && self.dropped > 0
    }
}

pub fn normalize(raw: &Value) -> Result<Normalized, ExtractionError> {
    let items = raw.as_array().ok_or(ExtractionError::NotAnArray {
        found: json_type_name(raw),
    })?;

    let mut normalized = Normalized::default();
    for (index, item) in items.iter().enumerate() {
        match normalize_project(item) {
            Some(record) => normalized.records.push(record),
            None => {
                debug!("Proyecto #{index} descartado por falta de nombre o dirección");
                normalized.dropped += 1;
            }
        }
    }
    Ok(normalized)
}

fn normalize_project(item: &Value) -> Option<ProjectRecord> {
    let obj = item.as_object()?;

    let name = obj.get("projectName")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let address = obj.get("address")?.as_str()?.trim();

    let comments: Vec<CommentRecord> = obj
        .get("comments")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(normalize_comment).collect())
        .unwrap_or_default();

    let rating_breakdown = obj
        .get("ratingBreakdown")
        .or_else(|| obj.get("ratingBifurcation"))
        .and_then(Value::as_object)
        .and_then(normalize_breakdown);

    Some(ProjectRecord {
        name: name.to_string(),
        address: address.to_string(),
        rating: normalize_rating(obj.get("rating")),
        review_count: obj.get("reviewCount").and_then(as_count),
        comments,
        rating_breakdown,
    })
}

fn normalize_rating(value: Option<&Value>) -> f64 {
    let rating = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match rating {
        Some(r) if r.is_finite() => r.clamp(MIN_RATING, MAX_RATING),
        _ => MIN_RATING,
    }
}

/// Entero no negativo; acepta cadenas numéricas con separadores de miles.
fn as_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .map(|f| f as u64)
        }),
        Value::String(s) => s.trim().replace([',', '_'], "").parse::<u64>().ok(),
        _ => None,
    }
}

fn normalize_comment(item: &Value) -> Option<CommentRecord> {
    let obj = item.as_object()?;
    let text = obj.get("text")?.as_str()?;
    let sentiment = obj
        .get("sentiment")
        .and_then(Value::as_str)
        .map(Sentiment::parse_lenient)
        .unwrap_or(Sentiment::Neutral);

    Some(CommentRecord {
        text: text.to_string(),
        sentiment,
    })
}

fn normalize_breakdown(obj: &Map<String, Value>) -> Option<RatingBreakdown> {
    let mut counts: [Option<u64>; 5] = [None; 5];
    for (key, value) in obj {
        if let Some(bucket) = StarBucket::from_key(key) {
            let slot = StarBucket::ALL.iter().position(|b| *b == bucket)?;
            counts[slot] = Some(as_count(value)?);
        }
    }

    let mut pairs = [(StarBucket::Five, 0u64); 5];
    for (slot, bucket) in StarBucket::ALL.into_iter().enumerate() {
        pairs[slot] = (bucket, counts[slot]?);
    }
    Some(RatingBreakdown::from_counts(pairs))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "un booleano",
        Value::Number(_) => "un número",
        Value::String(_) => "una cadena",
        Value::Array(_) => "un array",
        Value::Object(_) => "un objeto",
    }
}
