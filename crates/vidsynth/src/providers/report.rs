use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use super::error::{ProviderError, Result};
use super::llm::http_client;
use super::{Provider, ReportSummary, ReportWriter};
use crate::config::GoogleDocsConfig;

/// Publishes reports as Google Docs.
pub struct GoogleDocsReportWriter {
    client: Client,
    api_base: String,
    access_token: SecretString,
}

#[derive(Debug, Deserialize)]
struct CreatedDocument {
    #[serde(rename = "documentId")]
    document_id: String,
}

impl GoogleDocsReportWriter {
    pub fn new(
        config: &GoogleDocsConfig,
        access_token: SecretString,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    pub fn document_url(document_id: &str) -> String {
        format!("https://docs.google.com/document/d/{}", document_id)
    }

    async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ProviderError::ReportFailed(format!(
            "Google Docs {} failed ({}): {}",
            action, status, body
        )))
    }
}

impl Provider for GoogleDocsReportWriter {
    fn name(&self) -> &str {
        "google_docs"
    }
}

#[async_trait]
impl ReportWriter for GoogleDocsReportWriter {
    async fn write_report(&self, summary: &ReportSummary) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/documents", self.api_base))
            .bearer_auth(self.access_token.expose_secret())
            .json(&json!({ "title": summary.title() }))
            .send()
            .await?;
        let created: CreatedDocument = Self::check(response, "create").await?.json().await?;

        let update = json!({
            "requests": [{
                "insertText": {
                    "location": { "index": 1 },
                    "text": summary.render_text(),
                }
            }]
        });
        let response = self
            .client
            .post(format!(
                "{}/documents/{}:batchUpdate",
                self.api_base, created.document_id
            ))
            .bearer_auth(self.access_token.expose_secret())
            .json(&update)
            .send()
            .await?;
        Self::check(response, "batchUpdate").await?;

        let url = Self::document_url(&created.document_id);
        log::info!("Report for job {} written to {}", summary.job_id, url);
        Ok(url)
    }
}

/// Writes reports as text files in a local directory.
pub struct LocalReportWriter {
    directory: PathBuf,
}

impl LocalReportWriter {
    pub fn new(directory: PathBuf) -> Self {
        Self { directory }
    }

    pub fn report_path(&self, job_id: &str) -> PathBuf {
        self.directory.join(format!("report_{}.txt", job_id))
    }
}

impl Provider for LocalReportWriter {
    fn name(&self) -> &str {
        "local_file"
    }
}

#[async_trait]
impl ReportWriter for LocalReportWriter {
    async fn write_report(&self, summary: &ReportSummary) -> Result<String> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| ProviderError::io(&self.directory, e))?;

        let path = self.report_path(&summary.job_id);
        tokio::fs::write(&path, summary.render_text())
            .await
            .map_err(|e| ProviderError::io(&path, e))?;

        log::info!("Report for job {} written to {:?}", summary.job_id, path);
        Ok(path.display().to_string())
    }
}
