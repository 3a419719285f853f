use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::spawn;
use tracing::{error, info, warn};

use crate::{
    app_state::{AppState, Status},
    models::{DateRange, Location},
    search::{self, SearchError, SearchOutcome, SearchRequest},
};

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads y Respuestas de la API ---

/// Coordenadas ausentes = el navegador no concedió la geolocalización.
#[derive(Debug, Default, Deserialize)]
pub struct SearchPayload {
    latitude: Option<f64>,
    longitude: Option<f64>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(flatten)]
    outcome: SearchOutcome,
    used_default_location: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    default_location: Location,
    provider: String,
    search_model: String,
    analysis_model: String,
    project_developer: Option<String>,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/search", post(search_handler))
        .route("/api/status", get(status_handler))
        .route("/api/settings", get(settings_handler))
        .route("/api/shutdown", post(shutdown_handler))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn search_handler(
    State(state): State<AppState>,
    Json(payload): Json<SearchPayload>,
) -> Result<Json<SearchResponse>, ApiError> {
    let (request, used_default_location) =
        build_request(&payload, state.config.default_location).map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
        })?;

    let llm = state.llm_manager.clone();
    let cfg = state.config.clone();
    let job_status = state.status.clone();
    let job = async move { search::search_projects(&llm, &cfg, &request, &job_status).await };

    match run_search_job(state.status.clone(), job).await? {
        Ok(outcome) => Ok(Json(SearchResponse {
            outcome,
            used_default_location,
        })),
        Err(err) => Err(search_error_response(&err)),
    }
}

#[axum::debug_handler]
async fn status_handler(State(state): State<AppState>) -> Json<Status> {
    Json(state.status.lock().unwrap_or_else(|p| p.into_inner()).clone())
}

#[axum::debug_handler]
async fn settings_handler(State(state): State<AppState>) -> Json<SettingsResponse> {
    let cfg = &state.config;
    Json(SettingsResponse {
        default_location: cfg.default_location,
        provider: format!("{:?}", cfg.llm_provider),
        search_model: cfg.llm_search_model.clone(),
        analysis_model: cfg.llm_analysis_model.clone(),
        project_developer: cfg.project_developer.clone(),
    })
}

#[axum::debug_handler]
async fn shutdown_handler(State(state): State<AppState>) -> impl IntoResponse {
    info!("Petición de apagado recibida.");
    if let Some(sender) = state
        .shutdown_sender
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .take()
    {
        let _ = sender.send(());
    }
    StatusCode::OK
}

// --- Utilidades ---

/// Ocupa el estado y lanza la búsqueda en su propia tarea. Es la tarea, y no
/// el handler, quien libera `is_busy`: si el cliente se desconecta y axum
/// descarta el handler, la búsqueda termina igualmente y el estado queda libre.
async fn run_search_job<F>(
    status: Arc<Mutex<Status>>,
    job: F,
) -> Result<Result<SearchOutcome, SearchError>, ApiError>
where
    F: Future<Output = Result<SearchOutcome, SearchError>> + Send + 'static,
{
    {
        let mut status = status.lock().unwrap_or_else(|p| p.into_inner());
        if status.is_busy {
            return Err((
                StatusCode::CONFLICT,
                Json(json!({"error": "Ya hay una búsqueda en curso."})),
            ));
        }
        status.is_busy = true;
        status.message = "Iniciando búsqueda...".to_string();
        status.progress = 0.0;
    }

    let task_status = status.clone();
    let handle = spawn(async move {
        let result = job.await;
        {
            let mut status = task_status.lock().unwrap_or_else(|p| p.into_inner());
            status.is_busy = false;
            status.progress = 0.0;
            status.message = match &result {
                Ok(outcome) => {
                    format!("Búsqueda completada: {} proyectos.", outcome.projects.len())
                }
                Err(err) => format!("Error en la búsqueda: {}", err),
            };
        }
        result
    });

    handle.await.map_err(|e| {
        error!("La tarea de búsqueda terminó de forma inesperada: {e}");
        let mut status = status.lock().unwrap_or_else(|p| p.into_inner());
        status.is_busy = false;
        status.progress = 0.0;
        status.message = "Error interno en la búsqueda.".to_string();
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "Error interno en la búsqueda.", "retryable": true })),
        )
    })
}

fn build_request(
    payload: &SearchPayload,
    default_location: Location,
) -> anyhow::Result<(SearchRequest, bool)> {
    let (location, used_default) = match (payload.latitude, payload.longitude) {
        (Some(lat), Some(lon)) => (Location::new(lat, lon)?, false),
        (None, None) => (default_location, true),
        _ => anyhow::bail!("Hay que indicar latitud y longitud a la vez."),
    };

    let date_range = match (payload.from, payload.to) {
        (Some(from), Some(to)) => Some(DateRange::new(from, to)?),
        (None, None) => None,
        _ => anyhow::bail!("Hay que indicar ambas fechas del rango."),
    };

    Ok((SearchRequest { location, date_range }, used_default))
}

fn search_error_response(err: &SearchError) -> ApiError {
    match err {
        SearchError::Extraction(e) => {
            warn!("Búsqueda fallida por la respuesta del modelo: {e}");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": e.user_message(), "retryable": true })),
            )
        }
        SearchError::Upstream(e) => {
            error!("Búsqueda fallida por el servicio de IA: {e:#}");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "No se pudo contactar con el servicio de IA. Vuelve a intentarlo más tarde.",
                    "retryable": true,
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, error::ExtractionError};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tower::ServiceExt;

    fn test_state() -> (AppState, oneshot::Receiver<()>) {
        let cfg = AppConfig::from_vars(|key| match key {
            "GEMINI_API_KEY" => Some("clave-de-prueba".to_string()),
            "PROJECT_DEVELOPER" => Some("Godrej Properties".to_string()),
            _ => None,
        })
        .unwrap();
        let (tx, rx) = oneshot::channel();
        (AppState::new(cfg, tx), rx)
    }

    async fn send(router: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = router.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn post_search(body: serde_json::Value) -> Request<Body> {
        Request::post("/api/search")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn status_starts_idle() {
        let (state, _rx) = test_state();
        let (code, body) = send(
            create_router(state),
            Request::get("/api/status").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["isBusy"], false);
        assert_eq!(body["message"], "Servidor listo.");
    }

    #[tokio::test]
    async fn settings_expose_default_location() {
        let (state, _rx) = test_state();
        let (code, body) = send(
            create_router(state),
            Request::get("/api/settings").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert_eq!(body["defaultLocation"]["latitude"], 19.076);
        assert_eq!(body["provider"], "Gemini");
        assert_eq!(body["projectDeveloper"], "Godrej Properties");
    }

    #[tokio::test]
    async fn invalid_coordinates_are_rejected_before_calling_the_model() {
        let (state, _rx) = test_state();
        let (code, body) = send(
            create_router(state.clone()),
            post_search(json!({"latitude": 123.0, "longitude": 10.0})),
        )
        .await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("Latitud"));
        assert!(!state.status.lock().unwrap().is_busy);
    }

    #[tokio::test]
    async fn inverted_date_range_is_rejected() {
        let (state, _rx) = test_state();
        let (code, _) = send(
            create_router(state),
            post_search(json!({"from": "2024-05-01", "to": "2024-01-01"})),
        )
        .await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn concurrent_search_is_refused() {
        let (state, _rx) = test_state();
        state.status.lock().unwrap().is_busy = true;
        let (code, body) = send(create_router(state), post_search(json!({}))).await;
        assert_eq!(code, StatusCode::CONFLICT);
        assert_eq!(body["error"], "Ya hay una búsqueda en curso.");
    }

    #[tokio::test]
    async fn abandoned_search_still_releases_the_busy_flag() {
        let (state, _rx) = test_state();
        let (release, gate) = oneshot::channel::<()>();
        let job = async move {
            let _ = gate.await;
            Err::<SearchOutcome, _>(SearchError::Extraction(ExtractionError::NoArrayFound))
        };

        // El cliente se va antes de que el modelo conteste.
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            run_search_job(state.status.clone(), job),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(state.status.lock().unwrap().is_busy);

        release.send(()).unwrap();
        for _ in 0..200 {
            if !state.status.lock().unwrap().is_busy {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let status = state.status.lock().unwrap().clone();
        assert!(!status.is_busy);
        assert!(status.message.starts_with("Error en la búsqueda"));

        let next = run_search_job(state.status.clone(), async {
            Err::<SearchOutcome, _>(SearchError::Extraction(ExtractionError::NoArrayFound))
        })
        .await;
        assert!(matches!(next, Ok(Err(SearchError::Extraction(_)))));
        assert!(!state.status.lock().unwrap().is_busy);
    }

    #[tokio::test]
    async fn shutdown_signals_the_server() {
        let (state, rx) = test_state();
        let (code, _) = send(
            create_router(state),
            Request::post("/api/shutdown").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
        assert!(rx.await.is_ok());
    }

    #[test]
    fn missing_coordinates_fall_back_to_default_location() {
        let default = Location::new(19.076, 72.8777).unwrap();
        let (request, used_default) = build_request(&SearchPayload::default(), default).unwrap();
        assert!(used_default);
        assert_eq!(request.location, default);
        assert!(request.date_range.is_none());

        let half = SearchPayload {
            latitude: Some(1.0),
            ..Default::default()
        };
        assert!(build_request(&half, default).is_err());

        let open_range = SearchPayload {
            from: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Default::default()
        };
        assert!(build_request(&open_range, default).is_err());
    }

    #[test]
    fn extraction_errors_map_to_retryable_bad_gateway() {
        let (code, Json(body)) =
            search_error_response(&SearchError::Extraction(ExtractionError::NoArrayFound));
        assert_eq!(code, StatusCode::BAD_GATEWAY);
        assert_eq!(body["retryable"], true);
        assert_eq!(body["error"], ExtractionError::NoArrayFound.user_message());

        let (code, Json(body)) =
            search_error_response(&SearchError::Upstream(anyhow::anyhow!("cuota agotada")));
        assert_eq!(code, StatusCode::BAD_GATEWAY);
        assert!(!body["error"].as_str().unwrap().contains("cuota"));
    }
}
