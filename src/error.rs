use thiserror::Error;

/// Fallos al convertir la respuesta del modelo en una lista de proyectos.
///
/// Los problemas de elementos individuales no aparecen aquí: se descartan y
/// se cuentan durante la normalización.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractionError {
    #[error("no se encontró ningún array JSON en la respuesta del modelo")]
    NoArrayFound,

    #[error("JSON mal formado en la respuesta del modelo: {reason} | Fragmento: {snippet}")]
    MalformedJson { snippet: String, reason: String },

    #[error("se esperaba un array JSON en la raíz pero se recibió {found}")]
    NotAnArray { found: &'static str },
}

impl ExtractionError {
    /// Mensaje para el usuario. El modelo no es determinista, así que
    /// siempre se sugiere reintentar.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NoArrayFound => {
                "El modelo no devolvió ninguna lista de proyectos. Vuelve a intentarlo."
            }
            Self::MalformedJson { .. } => {
                "El modelo devolvió datos que no son JSON válido. Vuelve a intentarlo."
            }
            Self::NotAnArray { .. } => {
                "El modelo devolvió datos con un formato inesperado. Vuelve a intentarlo."
            }
        }
    }
}
