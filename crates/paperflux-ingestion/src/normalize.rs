//! Raw listing entry → canonical paper record.
//!
//! Pure and synchronous: no I/O, no clock reads. The caller supplies
//! "now" so two calls over the same entry produce identical records.

use chrono::{DateTime, Utc};

use paperflux_common::{PaperfluxError, Result};
use paperflux_db::{Author, PaperRecord};

use crate::models::{document_url, RawEntry};

/// Extract the required fields from the nested `paper` object.
/// Any missing or mis-shaped field is a `MalformedEntry`; the orchestrator
/// skips and counts those without failing the run.
pub fn normalize(entry: &RawEntry, url_template: &str, now: DateTime<Utc>) -> Result<PaperRecord> {
    let paper = entry
        .paper
        .as_object()
        .ok_or_else(|| malformed("missing `paper` object"))?;

    let paper_id = paper
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed("missing `id`"))?
        .to_string();

    let title = paper
        .get("title")
        .and_then(|v| v.as_str())
        .ok_or_else(|| malformed(&format!("missing `title` for {paper_id}")))?
        .to_string();

    let authors = paper
        .get("authors")
        .and_then(|v| v.as_array())
        .ok_or_else(|| malformed(&format!("missing `authors` for {paper_id}")))?
        .iter()
        .map(|a| {
            a.get("name")
                .and_then(|n| n.as_str())
                .map(Author::new)
                .ok_or_else(|| malformed(&format!("author without `name` for {paper_id}")))
        })
        .collect::<Result<Vec<Author>>>()?;

    let summary = paper
        .get("summary")
        .and_then(|v| v.as_str())
        .ok_or_else(|| malformed(&format!("missing `summary` for {paper_id}")))?
        .to_string();

    let published_at = paper
        .get("publishedAt")
        .and_then(|v| v.as_str())
        .ok_or_else(|| malformed(&format!("missing `publishedAt` for {paper_id}")))
        .and_then(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| malformed(&format!("bad `publishedAt` for {paper_id}: {e}")))
        })?;

    Ok(PaperRecord {
        document_url: document_url(url_template, &paper_id),
        paper_id,
        title,
        authors,
        summary,
        published_at,
        explanation: None,
        ingested_at: now,
    })
}

fn malformed(reason: &str) -> PaperfluxError {
    PaperfluxError::MalformedEntry(reason.to_string())
}
