//! Normalization of raw matches into display records
//!
//! Pure functions, no I/O.

use super::{RetrievalMatch, SourceRecord};

/// Separator placed between snippets in the assembled context
const CONTEXT_SEPARATOR: &str = "\n\n";

/// Turn raw matches into a context string and source records.
///
/// Matches without text are dropped. Positions used for placeholders are
/// 1-based and count only the kept matches.
pub fn normalize_matches(matches: Vec<RetrievalMatch>) -> (String, Vec<SourceRecord>) {
    let sources: Vec<SourceRecord> = matches
        .into_iter()
        .filter_map(|m| {
            let text = m.text.filter(|t| !t.is_empty())?;
            Some((text, m.score, m.locator, m.chunk_id))
        })
        .enumerate()
        .map(|(idx, (snippet, score, locator, chunk_id))| {
            let position = idx + 1;
            SourceRecord {
                id: chunk_id.unwrap_or_else(|| format!("chunk-{}", position)),
                name: display_name(locator.as_deref(), position),
                locator,
                score,
                snippet,
            }
        })
        .collect();

    let context = sources
        .iter()
        .map(|s| s.snippet.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    (context, sources)
}

/// Display name for a source locator.
///
/// Takes the last `/`-separated segment, drops a trailing extension and
/// turns underscores into spaces. Falls back to `Source-<position>`.
pub fn display_name(locator: Option<&str>, position: usize) -> String {
    let fallback = || format!("Source-{}", position);

    let segment = match locator.and_then(|l| l.rsplit('/').next()) {
        Some(segment) if !segment.is_empty() => segment,
        _ => return fallback(),
    };

    // "notes.v2.txt" -> "notes.v2", ".env" stays as is
    let stem = match segment.rfind('.') {
        Some(dot) if dot > 0 => &segment[..dot],
        _ => segment,
    };

    let name = stem.replace('_', " ");
    let name = name.trim();
    if name.is_empty() {
        fallback()
    } else {
        name.to_string()
    }
}
