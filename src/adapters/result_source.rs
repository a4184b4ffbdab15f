use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::Client;
use std::sync::Mutex;
use std::time::Duration;
use tracing::debug;

use super::ResultExtractor;
use crate::domain::ExtractedResults;
use crate::error::{Result, TwodError};

/// Where candidates come from on each poll
#[async_trait]
pub trait ResultSource: Send + Sync {
    async fn fetch_results(&self) -> Result<ExtractedResults>;
}

/// Fetches the result page over HTTP and runs it through an extractor
pub struct HttpResultSource {
    client: Client,
    url: String,
    user_agent: String,
    extractor: Box<dyn ResultExtractor>,
}

impl HttpResultSource {
    pub fn new(
        url: &str,
        user_agent: &str,
        timeout: Duration,
        extractor: Box<dyn ResultExtractor>,
    ) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            user_agent: user_agent.to_string(),
            extractor,
        })
    }

    /// Raw page body
    pub async fn fetch_page(&self) -> Result<String> {
        let resp = self
            .client
            .get(&self.url)
            .header(USER_AGENT, &self.user_agent)
            .send()
            .await
            .map_err(|e| TwodError::Fetch(describe(&e)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TwodError::Fetch(format!("HTTP {} from {}", status, self.url)));
        }

        resp.text()
            .await
            .map_err(|e| TwodError::Fetch(describe(&e)))
    }
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timed out: {}", e)
    } else {
        e.to_string()
    }
}

#[async_trait]
impl ResultSource for HttpResultSource {
    async fn fetch_results(&self) -> Result<ExtractedResults> {
        let page = self.fetch_page().await?;
        let results = self.extractor.extract(&page);
        debug!(
            layout = self.extractor.layout(),
            bytes = page.len(),
            morning = ?results.morning.number,
            evening = ?results.evening.number,
            "Extracted result page"
        );
        Ok(results)
    }
}

/// Source that replays whatever it was last given; for `check` replays and tests
#[derive(Debug, Default)]
pub struct ScriptedSource {
    next: Mutex<Option<std::result::Result<ExtractedResults, String>>>,
}

impl ScriptedSource {
    pub fn new(results: ExtractedResults) -> Self {
        Self {
            next: Mutex::new(Some(Ok(results))),
        }
    }

    pub fn set(&self, results: ExtractedResults) {
        self.replace(Ok(results));
    }

    /// Make every following fetch fail until `set` is called again
    pub fn fail(&self, reason: &str) {
        self.replace(Err(reason.to_string()));
    }

    fn replace(&self, next: std::result::Result<ExtractedResults, String>) {
        let mut guard = match self.next.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(next);
    }
}

#[async_trait]
impl ResultSource for ScriptedSource {
    async fn fetch_results(&self) -> Result<ExtractedResults> {
        let guard = match self.next.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match guard.as_ref() {
            Some(Ok(results)) => Ok(results.clone()),
            Some(Err(reason)) => Err(TwodError::Fetch(reason.clone())),
            None => Ok(ExtractedResults::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Candidate;

    #[tokio::test]
    async fn test_scripted_source_replays_and_fails() {
        let source = ScriptedSource::new(ExtractedResults::both(Candidate::live("82")));
        let first = source.fetch_results().await.unwrap();
        assert_eq!(first.morning.number.as_deref(), Some("82"));

        source.fail("HTTP 503");
        assert!(matches!(source.fetch_results().await, Err(TwodError::Fetch(_))));

        source.set(ExtractedResults::default());
        assert!(source.fetch_results().await.unwrap().morning.number.is_none());
    }
}
