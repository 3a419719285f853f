//! Búsqueda de proyectos cercanos con el LLM.
//!
//! Flujo:
//!   1. Construcción del prompt (ubicación, promotora, fechas, esquema).
//!   2. Llamada al modelo de búsqueda, que devuelve texto libre.
//!   3. Extracción del array JSON y normalización a `ProjectRecord`s.
//!   4. Alertas de valoración baja.
//!   5. Análisis en prosa con el segundo modelo, convertido a HTML mínimo.

use std::sync::{Arc, Mutex};

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    app_state::Status,
    config::AppConfig,
    error::ExtractionError,
    extract::{extract_with, ArraySlicing},
    llm::{build_analysis_prompt, build_search_prompt, LlmManager},
    markup::to_display_markup,
    models::{DateRange, Location, ProjectRecord},
    normalize::{normalize, Normalized},
};

const NOTHING_TO_ANALYZE: &str = "No hay proyectos para analizar.";
const ANALYSIS_FAILED: &str = "No se pudo generar el análisis por un error del servicio de IA.";

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub location: Location,
    pub date_range: Option<DateRange>,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    // Los fallos del proveedor (red, cuota, credencial) no se distinguen.
    #[error("error del servicio de IA: {0:#}")]
    Upstream(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum OutcomeState {
    Found,
    /// El modelo devolvió un array vacío.
    Empty,
    /// Había elementos, pero ninguno superó la validación.
    AllDropped,
}

/// Proyecto listo para la interfaz, con la marca de valoración baja ya calculada.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    #[serde(flatten)]
    pub record: ProjectRecord,
    pub needs_attention: bool,
}

impl From<ProjectRecord> for ProjectView {
    fn from(record: ProjectRecord) -> Self {
        Self {
            needs_attention: record.needs_attention(),
            record,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LowRatingAlert {
    pub id: Uuid,
    pub project_name: String,
    pub rating: f64,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchOutcome {
    pub request_id: Uuid,
    pub location: Location,
    pub state: OutcomeState,
    pub projects: Vec<ProjectView>,
    pub dropped: usize,
    pub alerts: Vec<LowRatingAlert>,
    pub analysis_html: String,
}

impl SearchOutcome {
    fn new(request_id: Uuid, location: Location, normalized: Normalized, analysis_html: String) -> Self {
        let state = outcome_state(&normalized);
        let alerts = low_rating_alerts(&normalized.records);
        Self {
            request_id,
            location,
            state,
            projects: normalized.records.into_iter().map(ProjectView::from).collect(),
            dropped: normalized.dropped,
            alerts,
            analysis_html,
        }
    }
}

/// Lanza una búsqueda completa. Actualiza `status` con el progreso.
pub async fn search_projects(
    llm: &LlmManager,
    cfg: &AppConfig,
    request: &SearchRequest,
    status: &Arc<Mutex<Status>>,
) -> Result<SearchOutcome, SearchError> {
    let request_id = Uuid::new_v4();
    info!(
        "[{request_id}] Buscando proyectos cerca de ({:.4}, {:.4})",
        request.location.latitude, request.location.longitude
    );

    report(status, "Buscando proyectos cercanos...", 0.1);
    let prompt = build_search_prompt(
        &request.location,
        request.date_range.as_ref(),
        cfg.project_developer.as_deref(),
    );
    let raw = llm.find_projects(&prompt).await.map_err(|e| {
        error!("[{request_id}] Error del modelo de búsqueda: {e:#}");
        SearchError::Upstream(e)
    })?;

    report(status, "Validando la respuesta del modelo...", 0.5);
    let normalized = interpret_response(&raw, cfg.extraction_mode)?;
    info!(
        "[{request_id}] {} proyectos válidos, {} descartados",
        normalized.records.len(),
        normalized.dropped
    );

    report(status, "Generando el análisis...", 0.7);
    let analysis_html = analyze(llm, &normalized.records).await;

    Ok(SearchOutcome::new(request_id, request.location, normalized, analysis_html))
}

/// Extracción + normalización del texto devuelto por el modelo.
pub fn interpret_response(raw: &str, slicing: ArraySlicing) -> Result<Normalized, ExtractionError> {
    let value = extract_with(raw, slicing).map_err(|e| {
        match &e {
            ExtractionError::MalformedJson { snippet, reason } => {
                warn!("JSON mal formado en la respuesta del modelo: {reason}. Fragmento: '{snippet}'")
            }
            other => warn!("No se pudo extraer el array de proyectos: {other}"),
        }
        e
    })?;

    let normalized = normalize(&value).map_err(|e| {
        warn!("Respuesta del modelo con forma inesperada: {e}");
        e
    })?;
    if normalized.dropped > 0 {
        warn!(
            "Se descartaron {} de {} proyectos mal formados",
            normalized.dropped,
            normalized.dropped + normalized.records.len()
        );
    }
    Ok(normalized)
}

pub fn outcome_state(normalized: &Normalized) -> OutcomeState {
    if !normalized.records.is_empty() {
        OutcomeState::Found
    } else if normalized.is_all_dropped() {
        OutcomeState::AllDropped
    } else {
        OutcomeState::Empty
    }
}

pub fn low_rating_alerts(records: &[ProjectRecord]) -> Vec<LowRatingAlert> {
    records
        .iter()
        .filter(|r| r.needs_attention())
        .map(|r| LowRatingAlert {
            id: Uuid::new_v4(),
            project_name: r.name.clone(),
            rating: r.rating,
            message: format!("'{}' tiene una valoración baja de {:.1}.", r.name, r.rating),
        })
        .collect()
}

/// El análisis nunca hace fallar la búsqueda: ante un error se devuelve un
/// mensaje fijo.
async fn analyze(llm: &LlmManager, records: &[ProjectRecord]) -> String {
    if records.is_empty() {
        return NOTHING_TO_ANALYZE.to_string();
    }

    let data = match serde_json::to_string_pretty(records) {
        Ok(data) => data,
        Err(e) => {
            warn!("No se pudieron serializar los proyectos para el análisis: {e}");
            return ANALYSIS_FAILED.to_string();
        }
    };

    match llm.analyze_projects(&build_analysis_prompt(&data)).await {
        Ok(text) => to_display_markup(&text),
        Err(e) => {
            warn!("Error generando el análisis: {e:#}");
            ANALYSIS_FAILED.to_string()
        }
    }
}

fn report(status: &Mutex<Status>, message: &str, progress: f32) {
    let mut status = status.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    status.message = message.to_string();
    status.progress = progress;
}
