//! Conversión mínima del análisis en markdown a HTML: negritas y saltos de
//! línea. Nada más se interpreta.
//!
//! El resultado se inserta tal cual en la página y los `<` / `>` del texto
//! original no se escapan. Se asume que el texto del modelo no es hostil.

use once_cell::sync::Lazy;
use regex::Regex;

static BOLD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n").unwrap());

pub fn to_display_markup(text: &str) -> String {
    let bolded = BOLD.replace_all(text, "<strong>$1</strong>");
    LINE_BREAK.replace_all(&bolded, "<br />").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_and_line_breaks() {
        assert_eq!(
            to_display_markup("**Bold** text\nline2"),
            "<strong>Bold</strong> text<br />line2"
        );
    }

    #[test]
    fn plain_text_is_unchanged() {
        let text = "Resumen sin formato, con comas: y puntos.";
        assert_eq!(to_display_markup(text), text);
        assert_eq!(to_display_markup(""), "");
    }

    #[test]
    fn bold_spans_are_non_greedy_and_unmatched_markers_stay() {
        assert_eq!(
            to_display_markup("**A** y **B** y **C"),
            "<strong>A</strong> y <strong>B</strong> y **C"
        );
    }

    #[test]
    fn bold_does_not_cross_lines() {
        assert_eq!(
            to_display_markup("**inicio\nfin**"),
            "**inicio<br />fin**"
        );
    }

    #[test]
    fn crlf_counts_as_a_single_break() {
        assert_eq!(to_display_markup("a\r\nb\n\nc"), "a<br />b<br /><br />c");
    }

    #[test]
    fn other_markdown_and_html_pass_through() {
        assert_eq!(
            to_display_markup("# Título\n- punto <em>x</em>"),
            "# Título<br />- punto <em>x</em>"
        );
    }
}
