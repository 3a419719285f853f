// Módulos de la aplicación
mod api;
mod app_state;
mod config;
mod error;
mod extract;
mod llm;
mod markup;
mod models;
mod normalize;
mod search;

use crate::app_state::AppState;
use anyhow::{Context, Result};
use axum::Router;
use tokio::sync::oneshot;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // 2. Cargar configuración
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;
    info!(
        "Proveedor LLM: {:?} (búsqueda: {}, análisis: {})",
        cfg.llm_provider, cfg.llm_search_model, cfg.llm_analysis_model
    );

    // Crear canal para la señal de apagado.
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    // 3. Crear estado compartido (incluye el cliente LLM)
    let app_state = AppState::new(cfg, shutdown_tx);

    // 4. Configurar el router de la API y el servicio de ficheros estáticos
    let app = Router::new()
        .merge(api::create_router(app_state.clone()))
        .fallback_service(ServeDir::new("frontend"))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // 5. Iniciar el servidor
    let server_addr = &app_state.config.server_addr;
    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    let server_url = format!("http://{}", server_addr);
    info!("🚀 Servidor escuchando en {}", &server_url);

    // Abrir el panel en el navegador por defecto
    if app_state.config.open_browser && webbrowser::open(&server_url).is_err() {
        info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", server_url);
    }

    // Configurar el apagado ordenado.
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            shutdown_rx.await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await
        .context("Error en el servidor HTTP")?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
