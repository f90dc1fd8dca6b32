use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{info, warn};
use url::Url;

use exam_core::model::SubmissionSnapshot;
use storage::repository::{Storage, SubmissionRepository};

use crate::error::SubmissionError;

/// Acknowledgement from an endpoint that accepted a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionReceipt {
    Remote { status: u16 },
    Stored { id: i64 },
}

/// Receives the final snapshot of an attempt in a single call.
///
/// Implementations do not retry; that is left to the caller.
#[async_trait]
pub trait SubmissionEndpoint: Send + Sync {
    /// # Errors
    ///
    /// Returns `SubmissionError` when the snapshot could not be delivered.
    async fn submit(
        &self,
        snapshot: &SubmissionSnapshot,
    ) -> Result<SubmissionReceipt, SubmissionError>;
}

//
// ─── HTTP ──────────────────────────────────────────────────────────────────────
//

/// `PUT {base}/api/exam-users/submit/{candidate}` with the snapshot as JSON.
#[derive(Clone)]
pub struct HttpSubmissionEndpoint {
    client: Client,
    base: Url,
}

impl HttpSubmissionEndpoint {
    /// # Errors
    ///
    /// Returns `SubmissionError::InvalidUrl` if `base_url` does not parse and
    /// `SubmissionError::UnsupportedUrl` for schemes other than http(s).
    pub fn new(base_url: &str) -> Result<Self, SubmissionError> {
        let base = Url::parse(base_url)?;
        if !matches!(base.scheme(), "http" | "https") || base.cannot_be_a_base() {
            return Err(SubmissionError::UnsupportedUrl(base_url.to_string()));
        }
        Ok(Self {
            client: Client::new(),
            base,
        })
    }

    /// Target URL for a candidate. The id is percent-encoded as one segment.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::UnsupportedUrl` if the base cannot carry a path.
    pub fn submit_url(&self, candidate_id: &str) -> Result<Url, SubmissionError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| SubmissionError::UnsupportedUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(["api", "exam-users", "submit", candidate_id]);
        Ok(url)
    }
}

#[async_trait]
impl SubmissionEndpoint for HttpSubmissionEndpoint {
    async fn submit(
        &self,
        snapshot: &SubmissionSnapshot,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let url = self.submit_url(&snapshot.candidate_id)?;
        let response = self.client.put(url).json(snapshot).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, attempt_id = %snapshot.attempt_id, "submission rejected");
            return Err(SubmissionError::HttpStatus(status));
        }
        info!(%status, attempt_id = %snapshot.attempt_id, "submission delivered");
        Ok(SubmissionReceipt::Remote {
            status: status.as_u16(),
        })
    }
}

//
// ─── STORAGE ───────────────────────────────────────────────────────────────────
//

/// Persists submissions through a `SubmissionRepository`.
#[derive(Clone)]
pub struct StoredSubmissionEndpoint {
    submissions: Arc<dyn SubmissionRepository>,
}

impl StoredSubmissionEndpoint {
    #[must_use]
    pub fn new(submissions: Arc<dyn SubmissionRepository>) -> Self {
        Self { submissions }
    }

    /// Build an endpoint backed by `SQLite`.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::Sqlite` if the database cannot be opened or
    /// migrated.
    pub async fn sqlite(database_url: &str) -> Result<Self, SubmissionError> {
        let storage = Storage::sqlite(database_url).await?;
        Ok(Self::new(storage.submissions))
    }
}

#[async_trait]
impl SubmissionEndpoint for StoredSubmissionEndpoint {
    async fn submit(
        &self,
        snapshot: &SubmissionSnapshot,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let id = self.submissions.append_submission(snapshot).await?;
        info!(id, attempt_id = %snapshot.attempt_id, "submission stored");
        Ok(SubmissionReceipt::Stored { id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_url_appends_encoded_candidate() {
        let endpoint = HttpSubmissionEndpoint::new("https://exam.example.org/").unwrap();
        let url = endpoint.submit_url("APP 7/x").unwrap();
        assert_eq!(
            url.as_str(),
            "https://exam.example.org/api/exam-users/submit/APP%207%2Fx"
        );

        let nested = HttpSubmissionEndpoint::new("http://localhost:8080/v2").unwrap();
        assert_eq!(
            nested.submit_url("APP-1").unwrap().as_str(),
            "http://localhost:8080/v2/api/exam-users/submit/APP-1"
        );
    }

    #[test]
    fn rejects_non_http_base() {
        assert!(matches!(
            HttpSubmissionEndpoint::new("not a url"),
            Err(SubmissionError::InvalidUrl(_))
        ));
        assert!(matches!(
            HttpSubmissionEndpoint::new("mailto:proctor@example.org"),
            Err(SubmissionError::UnsupportedUrl(_))
        ));
        assert!(matches!(
            HttpSubmissionEndpoint::new("ftp://example.org/"),
            Err(SubmissionError::UnsupportedUrl(_))
        ));
    }
}
