use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use crate::{config::AppConfig, llm::LlmManager};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub llm_manager: LlmManager,
    pub status: Arc<Mutex<Status>>,
    pub shutdown_sender: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl AppState {
    pub fn new(config: AppConfig, shutdown_sender: oneshot::Sender<()>) -> Self {
        let llm_manager = LlmManager::from_config(&config);
        Self {
            config,
            llm_manager,
            status: Arc::new(Mutex::new(Status {
                is_busy: false,
                message: "Servidor listo.".to_string(),
                progress: 0.0,
            })),
            shutdown_sender: Arc::new(Mutex::new(Some(shutdown_sender))),
        }
    }
}

// Estado de la búsqueda en curso; sólo una a la vez.
#[derive(Debug, Clone, Default, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    pub is_busy: bool,
    pub message: String,
    pub progress: f32, // Valor entre 0.0 y 1.0
}
