//! Paper browsing — HTML page and JSON API over the store.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::Json;

use paperflux_db::{Author, PaperRecord};
use paperflux_ingestion::pipeline::IngestPolicy;

use super::process::status_of;
use crate::state::SharedState;

pub async fn api_papers(State(state): State<SharedState>) -> Json<Vec<PaperRecord>> {
    Json(state.store.list_papers().await.unwrap_or_default())
}

pub async fn api_paper(
    State(state): State<SharedState>,
    Path(paper_id): Path<String>,
) -> Result<Json<PaperRecord>, StatusCode> {
    match state.store.get_paper(&paper_id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

pub async fn index(State(state): State<SharedState>) -> Html<String> {
    let papers = state.store.list_papers().await.unwrap_or_default();
    let meta = state.store.metadata().await.unwrap_or_default();
    let status = status_of(&meta, &IngestPolicy::from_config(&state.config.ingest));

    let last = status
        .last_processed_date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "never".to_string());
    let status_line = if status.eligible {
        // Eligible even with a stale is_processing flag: the expired
        // lease means the previous run is abandoned, so offer the button.
        format!(
            r#"<p class="status">Last updated: {last}</p>
<form method="POST" action="/process"><button type="submit">Process today's papers</button></form>"#
        )
    } else if status.is_processing {
        "<p class=\"status processing\">Processing today's papers… this may take several minutes.</p>".to_string()
    } else {
        format!("<p class=\"status\">Last updated: {last} — today's papers are in.</p>")
    };

    let body = if papers.is_empty() {
        "<p>No papers yet. Trigger a run to fetch today's research.</p>".to_string()
    } else {
        papers.iter().map(render_paper).collect::<String>()
    };

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>PaperFlux — Daily AI Paper Insights</title>
</head>
<body>
<header>
    <h1>PaperFlux</h1>
    <p>Daily AI research papers, downloaded, summarized and explained.</p>
    {status_line}
</header>
<main>
{body}
</main>
</body>
</html>"#
    ))
}

fn render_paper(paper: &PaperRecord) -> String {
    let explanation = match &paper.explanation {
        Some(text) => format!("<details><summary>Detailed analysis</summary><div>{}</div></details>", escape(text)),
        None => "<p><em>Detailed analysis not available for this paper.</em></p>".to_string(),
    };
    format!(
        r#"<article>
    <h2>{title}</h2>
    <p><strong>Authors:</strong> {authors} |
       <strong>Published:</strong> {published} |
       <a href="{url}" target="_blank">Download PDF</a></p>
    <p>{summary}</p>
    {explanation}
</article>"#,
        title = escape(&paper.title),
        authors = format_authors(&paper.authors),
        published = paper.published_at.format("%b %d, %Y"),
        url = escape(&paper.document_url),
        summary = escape(&paper.summary),
    )
}

/// Three names, then "et al." — matches how the listing UI has always
/// shown author lines.
fn format_authors(authors: &[Author]) -> String {
    let mut names: Vec<&str> = authors.iter().take(3).map(|a| a.name.as_str()).collect();
    if authors.len() > 3 {
        names.push("et al.");
    }
    escape(&names.join(", "))
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
