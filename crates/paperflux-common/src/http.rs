use reqwest::{Client, ClientBuilder};
use std::collections::HashSet;
use std::time::Duration;
use url::Url;

use crate::error::PaperfluxError;

/// An allowlist-capped HTTP client: requests are only permitted against
/// approved hosts. Every outbound call in the pipeline goes through this,
/// so a misconfigured URL template fails loudly instead of leaking traffic
/// to an arbitrary host.
#[derive(Debug, Clone)]
pub struct ScopedClient {
    client: Client,
    allowlist: HashSet<String>,
}

impl ScopedClient {
    /// Creates a client with the default allowlist: the daily-papers
    /// listing API, the arXiv document host, the Gemini enrichment API,
    /// and localhost for tests.
    pub fn new(timeout: Duration) -> Result<Self, PaperfluxError> {
        let mut allowlist = HashSet::new();
        let domains = vec![
            "huggingface.co",                    // daily papers listing
            "arxiv.org",                         // paper PDFs
            "generativelanguage.googleapis.com", // Gemini enrichment
            "localhost",
            "127.0.0.1",
        ];
        for d in domains {
            allowlist.insert(d.to_string());
        }

        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| PaperfluxError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client, allowlist })
    }

    /// Appends an exact hostname to the allowlist.
    pub fn allow_domain(&mut self, domain: &str) {
        self.allowlist.insert(domain.to_string());
    }

    /// Validates if a URL is permitted under the current allowlist.
    /// Subdomains of an allowed host are allowed too.
    pub fn is_allowed(&self, url: &str) -> bool {
        if let Ok(parsed) = Url::parse(url) {
            if let Some(host) = parsed.host_str() {
                for allowed in &self.allowlist {
                    if host == allowed || host.ends_with(&format!(".{allowed}")) {
                        return true;
                    }
                }
            }
        }
        false
    }

    pub fn get(&self, url: &str) -> Result<reqwest::RequestBuilder, PaperfluxError> {
        if !self.is_allowed(url) {
            return Err(PaperfluxError::DomainBlocked(url.to_string()));
        }
        Ok(self.client.get(url))
    }

    pub fn post(&self, url: &str) -> Result<reqwest::RequestBuilder, PaperfluxError> {
        if !self.is_allowed(url) {
            return Err(PaperfluxError::DomainBlocked(url.to_string()));
        }
        Ok(self.client.post(url))
    }
}
