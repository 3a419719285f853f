//! Carga y gestión de configuración de la aplicación (servidor + LLM).

use std::env;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

use crate::{extract::ArraySlicing, models::Location};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Gemini,
    Ollama,
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "gemini" => Ok(Self::Gemini),
            "ollama" => Ok(Self::Ollama),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }
}

impl LlmProvider {
    /// Variable de entorno con la credencial que lee el cliente de Rig.
    pub fn api_key_var(&self) -> Option<&'static str> {
        match self {
            Self::OpenAI => Some("OPENAI_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::Ollama => None,
        }
    }

    fn default_search_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o-mini",
            Self::Gemini => "gemini-2.5-flash",
            Self::Ollama => "llama3.1",
        }
    }

    fn default_analysis_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-4o",
            Self::Gemini => "gemini-2.5-pro",
            Self::Ollama => "llama3.1",
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub open_browser: bool,

    pub llm_provider: LlmProvider,
    pub llm_search_model: String,
    pub llm_analysis_model: String,

    /// Promotora a la que se restringe la búsqueda, si se indica.
    pub project_developer: Option<String>,
    /// Ubicación usada cuando el navegador no concede la geolocalización (Bombay).
    pub default_location: Location,
    pub extraction_mode: ArraySlicing,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Igual que `from_env`, pero leyendo de una función arbitraria.
    pub fn from_vars<F>(var: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_addr = var("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:3322".to_string());
        let open_browser = match var("OPEN_BROWSER") {
            Some(v) => parse_bool(&v).with_context(|| format!("OPEN_BROWSER inválido: {v}"))?,
            None => true,
        };

        let llm_provider: LlmProvider = var("LLM_PROVIDER")
            .unwrap_or_else(|| "gemini".to_string())
            .parse()?;
        if let Some(key_var) = llm_provider.api_key_var() {
            if var(key_var).map_or(true, |k| k.trim().is_empty()) {
                return Err(anyhow!("Falta {key_var} en el entorno"));
            }
        }

        let llm_search_model = var("LLM_SEARCH_MODEL")
            .unwrap_or_else(|| llm_provider.default_search_model().to_string());
        let llm_analysis_model = var("LLM_ANALYSIS_MODEL")
            .unwrap_or_else(|| llm_provider.default_analysis_model().to_string());

        let project_developer = var("PROJECT_DEVELOPER")
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());

        let latitude = parse_coordinate(var("DEFAULT_LATITUDE"), 19.0760, "DEFAULT_LATITUDE")?;
        let longitude = parse_coordinate(var("DEFAULT_LONGITUDE"), 72.8777, "DEFAULT_LONGITUDE")?;
        let default_location = Location::new(latitude, longitude)?;

        let extraction_mode = match var("EXTRACTION_MODE") {
            Some(mode) => mode.parse()?,
            None => ArraySlicing::default(),
        };

        Ok(Self {
            server_addr,
            open_browser,
            llm_provider,
            llm_search_model,
            llm_analysis_model,
            project_developer,
            default_location,
            extraction_mode,
        })
    }
}

fn parse_coordinate(raw: Option<String>, default: f64, name: &str) -> Result<f64> {
    match raw {
        Some(v) => v
            .trim()
            .parse::<f64>()
            .with_context(|| format!("{name} no es un número: {v}")),
        None => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "si" | "sí" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        other => Err(anyhow!("valor booleano no reconocido: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_use_gemini_and_mumbai() {
        let cfg = load(&[("GEMINI_API_KEY", "k")]).unwrap();
        assert_eq!(cfg.server_addr, "127.0.0.1:3322");
        assert_eq!(cfg.llm_provider, LlmProvider::Gemini);
        assert_eq!(cfg.llm_search_model, "gemini-2.5-flash");
        assert_eq!(cfg.llm_analysis_model, "gemini-2.5-pro");
        assert_eq!(cfg.default_location, Location::new(19.0760, 72.8777).unwrap());
        assert_eq!(cfg.extraction_mode, ArraySlicing::FirstLast);
        assert!(cfg.project_developer.is_none());
        assert!(cfg.open_browser);
    }

    #[test]
    fn missing_credential_is_an_error() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        let err = load(&[("LLM_PROVIDER", "openai"), ("GEMINI_API_KEY", "k")]).unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = load(&[
            ("LLM_PROVIDER", "OpenAI"),
            ("OPENAI_API_KEY", "k"),
            ("LLM_SEARCH_MODEL", "gpt-4.1-mini"),
            ("PROJECT_DEVELOPER", " Godrej Properties "),
            ("DEFAULT_LATITUDE", "40.4168"),
            ("DEFAULT_LONGITUDE", "-3.7038"),
            ("EXTRACTION_MODE", "balanced"),
            ("OPEN_BROWSER", "no"),
        ])
        .unwrap();
        assert_eq!(cfg.llm_provider, LlmProvider::OpenAI);
        assert_eq!(cfg.llm_search_model, "gpt-4.1-mini");
        assert_eq!(cfg.llm_analysis_model, "gpt-4o");
        assert_eq!(cfg.project_developer.as_deref(), Some("Godrej Properties"));
        assert_eq!(cfg.default_location.longitude, -3.7038);
        assert_eq!(cfg.extraction_mode, ArraySlicing::Balanced);
        assert!(!cfg.open_browser);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(load(&[("GEMINI_API_KEY", "k"), ("LLM_PROVIDER", "claude")]).is_err());
        assert!(load(&[("GEMINI_API_KEY", "k"), ("DEFAULT_LATITUDE", "norte")]).is_err());
        assert!(load(&[("GEMINI_API_KEY", "k"), ("DEFAULT_LATITUDE", "95")]).is_err());
        assert!(load(&[("GEMINI_API_KEY", "k"), ("EXTRACTION_MODE", "greedy")]).is_err());
        assert!(load(&[("GEMINI_API_KEY", "k"), ("OPEN_BROWSER", "quizás")]).is_err());
    }
}
