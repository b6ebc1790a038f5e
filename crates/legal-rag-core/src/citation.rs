//! Citation extraction from model output.
//!
//! Scans an answer for `[Doc: <filename>, pag: <n>]` markers (the page part
//! is optional) and resolves each one against the contexts of the same
//! query. Markers that name no known file are reported as
//! [`CitationWarning`]s and otherwise ignored.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{Citation, RetrievalResult};
use crate::prompt::resolve_page;

/// Characters of chunk content kept as a citation excerpt.
pub const EXCERPT_CHARS: usize = 150;

// Accepts "pag: 3", "pag. 3", "pagina 3", any case. The filename is
// captured lazily up to the page suffix, so it may contain commas.
static MARKER_RE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(?i)\[\s*doc\s*:\s*([^\]]+?)\s*(?:,\s*pag(?:ina|\.)?\s*:?\s*(\d+)\s*)?\]").ok()
});

/// A marker in the answer that could not be matched to any context.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CitationWarning {
    /// The marker exactly as it appears in the answer.
    pub marker: String,
    pub filename: String,
}

/// Result of scanning one answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CitationExtraction {
    pub citations: Vec<Citation>,
    pub warnings: Vec<CitationWarning>,
}

fn filenames_match(marker: &str, filename: &str) -> bool {
    let filename = filename.to_lowercase();
    !filename.is_empty() && (filename.contains(marker) || marker.contains(&filename))
}

fn excerpt(content: &str) -> String {
    content.chars().take(EXCERPT_CHARS).collect()
}

/// Resolve every citation marker in `answer` against `contexts`.
///
/// Contexts are assumed ranked best-first; among several chunks of the
/// matched file, one whose page equals the marker's page is preferred,
/// otherwise the best-ranked one is used. The marker's page takes
/// precedence over the chunk's own page. Citations are deduplicated by
/// (document id, page, chunk id) and keep first-appearance order.
pub fn extract_citations(answer: &str, contexts: &[RetrievalResult]) -> CitationExtraction {
    let mut out = CitationExtraction::default();
    let Some(re) = MARKER_RE.as_ref() else {
        return out;
    };

    let mut seen: HashSet<(String, Option<u32>, String)> = HashSet::new();

    for caps in re.captures_iter(answer) {
        let marker = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
        let name = caps
            .get(1)
            .map(|m| m.as_str().trim().to_lowercase())
            .unwrap_or_default();
        let marker_page: Option<u32> = caps.get(2).and_then(|m| m.as_str().parse().ok());

        let candidates: Vec<&RetrievalResult> = if name.is_empty() {
            Vec::new()
        } else {
            contexts
                .iter()
                .filter(|c| filenames_match(&name, &c.filename))
                .collect()
        };

        let chosen = marker_page
            .and_then(|page| candidates.iter().find(|c| resolve_page(c) == page))
            .or_else(|| candidates.first())
            .copied();

        let Some(ctx) = chosen else {
            tracing::warn!(marker, "citation marker matches no retrieved source");
            out.warnings.push(CitationWarning {
                marker: marker.to_string(),
                filename: name,
            });
            continue;
        };

        let page = marker_page.or_else(|| Some(resolve_page(ctx)));
        let key = (ctx.document_id.clone(), page, ctx.chunk_id.clone());
        if !seen.insert(key) {
            continue;
        }

        out.citations.push(Citation {
            document_id: ctx.document_id.clone(),
            filename: ctx.filename.clone(),
            page,
            chunk_id: ctx.chunk_id.clone(),
            excerpt: excerpt(&ctx.content),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context(chunk_id: &str, doc_id: &str, filename: &str, start_offset: usize) -> RetrievalResult {
        RetrievalResult {
            chunk_id: chunk_id.to_string(),
            document_id: doc_id.to_string(),
            filename: filename.to_string(),
            content: format!("contenuto di {}", chunk_id),
            score: 0.5,
            lexical_score: 0.5,
            vector_score: 0.5,
            start_offset,
            metadata: None,
        }
    }

    #[test]
    fn test_marker_with_page() {
        let contexts = vec![context("c1", "d1", "foo.pdf", 0)];
        let out = extract_citations("La durata e' di sei anni [Doc: foo.pdf, pag: 3].", &contexts);
        assert_eq!(out.citations.len(), 1);
        assert_eq!(out.citations[0].page, Some(3));
        assert_eq!(out.citations[0].document_id, "d1");
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_unknown_filename_yields_warning_only() {
        let contexts = vec![context("c1", "d1", "foo.pdf", 0)];
        let out = extract_citations("Vedi [Doc: bar.pdf, pag: 2].", &contexts);
        assert!(out.citations.is_empty());
        assert_eq!(out.warnings.len(), 1);
        assert_eq!(out.warnings[0].marker, "[Doc: bar.pdf, pag: 2]");
        assert_eq!(out.warnings[0].filename, "bar.pdf");
    }

    #[test]
    fn test_page_estimated_when_marker_has_none() {
        let contexts = vec![context("c1", "d1", "locazioni.txt", 6500)];
        let out = extract_citations("Sei anni [Doc: locazioni.txt].", &contexts);
        assert_eq!(out.citations.len(), 1);
        assert_eq!(out.citations[0].page, Some(3));
    }

    #[test]
    fn test_marker_page_beats_chunk_metadata() {
        let mut ctx = context("c1", "d1", "foo.pdf", 0);
        ctx.metadata = Some(json!({"page": 9}));
        let out = extract_citations("[Doc: foo.pdf, pag: 4]", &[ctx]);
        assert_eq!(out.citations[0].page, Some(4));
    }

    #[test]
    fn test_prefers_context_on_marker_page() {
        let contexts = vec![
            context("c1", "d1", "codice.pdf", 0),
            context("c2", "d1", "codice.pdf", 6000),
        ];
        let out = extract_citations("[Doc: codice.pdf, pag: 3]", &contexts);
        assert_eq!(out.citations[0].chunk_id, "c2");
    }

    #[test]
    fn test_fuzzy_filename_match() {
        let contexts = vec![context("c1", "d1", "Contratto_Locazione_2024.pdf", 0)];
        // Truncated by the model.
        let out = extract_citations("[doc: contratto_locazione, PAG. 1]", &contexts);
        assert_eq!(out.citations.len(), 1);
        assert_eq!(out.citations[0].page, Some(1));
        // Model added a path prefix.
        let out = extract_citations("[Doc: docs/Contratto_Locazione_2024.pdf, pagina 2]", &contexts);
        assert_eq!(out.citations.len(), 1);
        assert_eq!(out.citations[0].page, Some(2));
    }

    #[test]
    fn test_filename_with_comma() {
        let contexts = vec![context("c1", "d1", "Contratto, rev2.pdf", 0)];
        let out = extract_citations("Canone mensile [Doc: Contratto, rev2.pdf, pag: 2].", &contexts);
        assert_eq!(out.citations.len(), 1);
        assert_eq!(out.citations[0].filename, "Contratto, rev2.pdf");
        assert_eq!(out.citations[0].page, Some(2));

        let out = extract_citations("[Doc: Contratto, rev2.pdf]", &contexts);
        assert_eq!(out.citations.len(), 1);

        let out = extract_citations("[Doc: Allegato, rev9.pdf, pag: 1]", &contexts);
        assert!(out.citations.is_empty());
        assert_eq!(out.warnings[0].filename, "allegato, rev9.pdf");
    }

    #[test]
    fn test_duplicates_collapse() {
        let contexts = vec![context("c1", "d1", "foo.pdf", 0)];
        let answer = "A [Doc: foo.pdf, pag: 1]. B [Doc: foo.pdf, pag: 1]. C [Doc: foo.pdf, pag: 2].";
        let out = extract_citations(answer, &contexts);
        let pages: Vec<_> = out.citations.iter().map(|c| c.page).collect();
        assert_eq!(pages, vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_excerpt_is_truncated() {
        let mut ctx = context("c1", "d1", "foo.pdf", 0);
        ctx.content = "à".repeat(400);
        let out = extract_citations("[Doc: foo.pdf]", &[ctx]);
        assert_eq!(out.citations[0].excerpt.chars().count(), EXCERPT_CHARS);
    }

    #[test]
    fn test_no_markers() {
        let contexts = vec![context("c1", "d1", "foo.pdf", 0)];
        let out = extract_citations("Nessuna citazione qui.", &contexts);
        assert_eq!(out, CitationExtraction::default());
    }
}
