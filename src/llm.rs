//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//! Gemini y OpenAI están implementados; Ollama queda preparado para el futuro.
//!
//! El `LlmManager` se construye una sola vez en `main` y se pasa por el
//! estado de la aplicación; el núcleo de extracción nunca lo ve.

use anyhow::{anyhow, Result};
use rig::client::{CompletionClient as _, ProviderClient as _};
use rig::completion::Prompt;
use tracing::debug;

use crate::config::{AppConfig, LlmProvider};
use crate::models::{payload_schema_json, DateRange, Location};

const SEARCH_PREAMBLE: &str = r#"
Eres un asistente que localiza proyectos inmobiliarios reales a partir de unas coordenadas.
Respondes SIEMPRE con un único array JSON, sin texto adicional, que cumpla el esquema indicado.
Si no conoces la información de un campo opcional, omítelo. No inventes proyectos.
"#;

const ANALYSIS_PREAMBLE: &str = r#"
Eres un analista del mercado inmobiliario. Escribes resúmenes breves en markdown,
usando negrita para los nombres de los proyectos y las conclusiones clave.
"#;

/// Gestor de LLMs: un modelo para la búsqueda y otro para el análisis.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub search_model: String,
    pub analysis_model: String,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            provider: cfg.llm_provider.clone(),
            search_model: cfg.llm_search_model.clone(),
            analysis_model: cfg.llm_analysis_model.clone(),
        }
    }

    /// Pide al modelo de búsqueda la lista de proyectos. Devuelve el texto
    /// en bruto; extraerlo y validarlo es cosa del llamador.
    pub async fn find_projects(&self, prompt: &str) -> Result<String> {
        self.complete(&self.search_model, SEARCH_PREAMBLE, prompt).await
    }

    /// Pide al modelo de análisis un resumen en markdown.
    pub async fn analyze_projects(&self, prompt: &str) -> Result<String> {
        self.complete(&self.analysis_model, ANALYSIS_PREAMBLE, prompt).await
    }

    async fn complete(&self, model: &str, preamble: &str, prompt: &str) -> Result<String> {
        debug!("Llamando a {:?} con el modelo {}", self.provider, model);
        match self.provider {
            LlmProvider::Gemini => {
                use rig::providers::gemini;

                let client = gemini::Client::from_env();
                let agent = client
                    .agent(model)
                    .preamble(preamble)
                    .additional_params(gemini_params()?)
                    .build();
                Ok(agent.prompt(prompt).await?)
            }
            LlmProvider::OpenAI => {
                use rig::providers::openai;

                let client = openai::Client::from_env();
                let agent = client.agent(model).preamble(preamble).build();
                Ok(agent.prompt(prompt).await?)
            }
            ref other => Err(anyhow!(
                "Proveedor LLM {:?} aún no implementado para chat",
                other
            )),
        }
    }
}

/// Gemini rechaza cualquier petición que no lleve `generationConfig`.
fn gemini_params() -> Result<serde_json::Value> {
    use rig::providers::gemini::completion::gemini_api_types::{
        AdditionalParameters, GenerationConfig,
    };

    let params = AdditionalParameters::default().with_config(GenerationConfig::default());
    Ok(serde_json::to_value(params)?)
}

/// Prompt de búsqueda: ubicación, promotora opcional, rango de fechas
/// opcional y el esquema JSON que debe respetar la respuesta.
pub fn build_search_prompt(
    location: &Location,
    date_range: Option<&DateRange>,
    developer: Option<&str>,
) -> String {
    let subject = match developer {
        Some(dev) => format!("proyectos inmobiliarios de {dev}"),
        None => "proyectos inmobiliarios".to_string(),
    };

    let mut prompt = format!(
        "Encuentra {subject} cerca de la latitud {:.4}, longitud {:.4}.\n\
         Para cada proyecto indica: projectName, address, rating (sobre 5), reviewCount, \
         entre 3 y 5 comentarios recientes con 'text' y 'sentiment' ('Positive', 'Negative' o 'Neutral') \
         y ratingBreakdown con las claves \"5-star\", \"4-star\", \"3-star\", \"2-star\" y \"1-star\". \
         Si el desglose no está disponible, devuelve 0 en cada nivel.\n",
        location.latitude, location.longitude
    );

    if let Some(range) = date_range {
        prompt.push_str(&format!(
            "Considera sólo comentarios y reseñas publicados entre el {} y el {} (ambos incluidos).\n",
            range.from.format("%Y-%m-%d"),
            range.to.format("%Y-%m-%d")
        ));
    }

    prompt.push_str("\nEsquema JSON de la respuesta:\n");
    prompt.push_str(&payload_schema_json());
    prompt
}

/// Prompt de análisis a partir de los proyectos ya serializados.
pub fn build_analysis_prompt(projects_json: &str) -> String {
    format!(
        "Analiza los siguientes datos de proyectos inmobiliarios. Resume el sentimiento general, \
         destaca los proyectos con valoraciones excepcionalmente bajas o comentarios preocupantes \
         e identifica temas o tendencias comunes.\n\nDatos:\n{projects_json}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn search_prompt_includes_location_and_schema() {
        let location = Location::new(19.076, 72.8777).unwrap();
        let prompt = build_search_prompt(&location, None, None);
        assert!(prompt.contains("latitud 19.0760, longitud 72.8777"));
        assert!(prompt.contains("Encuentra proyectos inmobiliarios cerca"));
        assert!(prompt.contains("projectName"));
        assert!(prompt.contains("\"5-star\""));
        assert!(!prompt.contains("publicados entre"));
    }

    #[test]
    fn search_prompt_narrows_by_developer_and_dates() {
        let location = Location::new(40.4168, -3.7038).unwrap();
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
        )
        .unwrap();
        let prompt = build_search_prompt(&location, Some(&range), Some("Godrej Properties"));
        assert!(prompt.contains("proyectos inmobiliarios de Godrej Properties"));
        assert!(prompt.contains("entre el 2024-01-01 y el 2024-06-30"));
    }

    #[test]
    fn gemini_requests_carry_generation_config() {
        use rig::providers::gemini::completion::gemini_api_types::AdditionalParameters;

        let params = gemini_params().unwrap();
        assert!(params.get("generationConfig").is_some());
        // Es lo que hace el cliente de Rig al construir el cuerpo de la petición.
        assert!(serde_json::from_value::<AdditionalParameters>(params).is_ok());
    }

    #[test]
    fn analysis_prompt_embeds_data() {
        let prompt = build_analysis_prompt(r#"[{"projectName":"A"}]"#);
        assert!(prompt.ends_with(r#"Datos:
[{"projectName":"A"}]"#));
    }
}
