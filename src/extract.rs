//! Localiza y parsea el array JSON embebido en la respuesta libre del modelo.
//!
//! El texto puede ser el array tal cual, un bloque de código (con o sin la
//! etiqueta `json`) o un array rodeado de explicaciones. Aquí sólo se parsea;
//! la validación contra el esquema vive en `normalize`.

use std::str::FromStr;

use anyhow::anyhow;
use serde_json::Value;

use crate::error::ExtractionError;

const SNIPPET_MAX_CHARS: usize = 200;

const FENCE: &str = "```";

/// Cómo recortar el array cuando no viene en un bloque de código.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArraySlicing {
    /// Desde el primer `[` hasta el último `]` del texto.
    #[default]
    FirstLast,
    /// Desde el primer `[` hasta su `]` de cierre, ignorando corchetes
    /// dentro de cadenas.
    Balanced,
}

impl FromStr for ArraySlicing {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "first-last" | "firstlast" | "heuristic" => Ok(Self::FirstLast),
            "balanced" => Ok(Self::Balanced),
            other => Err(anyhow!("Modo de extracción no soportado: {other}")),
        }
    }
}

pub fn extract(raw: &str) -> Result<Value, ExtractionError> {
    extract_with(raw, ArraySlicing::FirstLast)
}

pub fn extract_with(raw: &str, slicing: ArraySlicing) -> Result<Value, ExtractionError> {
    let candidate = locate_candidate(raw, slicing).ok_or(ExtractionError::NoArrayFound)?;

    serde_json::from_str(candidate).map_err(|e| ExtractionError::MalformedJson {
        snippet: truncate_snippet(candidate),
        reason: e.to_string(),
    })
}

fn locate_candidate(raw: &str, slicing: ArraySlicing) -> Option<&str> {
    if let Some(inner) = fenced_candidate(raw) {
        return Some(inner);
    }

    let start = raw.find('[')?;
    let candidate = match slicing {
        ArraySlicing::FirstLast => match raw.rfind(']') {
            Some(end) if end > start => &raw[start..=end],
            // Array truncado: se deja que el parser lo rechace.
            _ => &raw[start..],
        },
        ArraySlicing::Balanced => balanced_array(&raw[start..]),
    };
    Some(candidate.trim())
}

/// Un bloque de código ya emparejado: etiqueta de la primera línea y cuerpo.
struct FencedBlock<'a> {
    tag: &'a str,
    body: &'a str,
}

/// Empareja los delimitadores en orden de aparición, de modo que el cierre
/// de un bloque nunca se confunde con la apertura del siguiente. Un
/// delimitador final sin pareja se ignora.
fn fenced_blocks(raw: &str) -> Vec<FencedBlock<'_>> {
    let marks: Vec<usize> = raw.match_indices(FENCE).map(|(i, _)| i).collect();
    marks
        .chunks_exact(2)
        .filter_map(|pair| {
            let inner = &raw[pair[0] + FENCE.len()..pair[1]];
            let (tag, body) = inner.split_once('\n')?;
            Some(FencedBlock {
                tag: tag.trim(),
                body,
            })
        })
        .collect()
}

/// Primero un bloque etiquetado `json`; si no hay, uno sin etiqueta cuyo
/// contenido empiece por `[`. Los bloques de otros lenguajes no cuentan.
fn fenced_candidate(raw: &str) -> Option<&str> {
    let blocks = fenced_blocks(raw);
    blocks
        .iter()
        .find(|block| block.tag.eq_ignore_ascii_case("json"))
        .or_else(|| {
            blocks
                .iter()
                .find(|block| block.tag.is_empty() && block.body.trim_start().starts_with('['))
        })
        .map(|block| block.body.trim())
}

/// `text` empieza por `[`. Devuelve hasta el corchete que lo cierra, o todo
/// el texto si nunca se cierra.
fn balanced_array(text: &str) -> &str {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return &text[..=i];
                }
            }
            _ => {}
        }
    }
    text
}

fn truncate_snippet(candidate: &str) -> String {
    if candidate.chars().count() > SNIPPET_MAX_CHARS {
        let head: String = candidate.chars().take(SNIPPET_MAX_CHARS).collect();
        format!("{head}...")
    } else {
        candidate.to_string()
    }
}
