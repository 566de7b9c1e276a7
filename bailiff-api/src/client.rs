//! Sender-side HTTP client for a bailiff receiver.
//!
//! `send` asks the receiver's directory who to seal for, falls back to the
//! receiver's single public key when the directory is empty or unreachable,
//! and submits the envelope.

use std::time::Duration;

use bailiff_envelope::{
    Bailiff, CaseSubmission, DirectoryLookup, EnvelopeError, FallbackReason, KeyId,
    PublicKey, Recipient, SealPlan,
};
use bailiff_registry::ActiveKey;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cases::CaseId;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("receiver answered {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubmitReceipt {
    pub id: CaseId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendMode {
    MultiRecipient { recipients: Vec<KeyId> },
    Legacy { reason: FallbackReason },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    pub case_id: CaseId,
    pub content_digest: String,
    pub mode: SendMode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyBody {
    public_key: String,
}

pub struct ReceiverClient {
    client: Client,
    base_url: String,
}

impl ReceiverClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Active recipients from the receiver's registry. Never fails: any
    /// problem is reported as `Unavailable`.
    pub async fn active_recipients(&self) -> DirectoryLookup {
        let keys: Vec<ActiveKey> = match self.fetch_active().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "key directory lookup failed");
                return DirectoryLookup::Unavailable(e.to_string());
            }
        };

        let recipients = keys
            .into_iter()
            .filter_map(|k| match Recipient::with_key_id(k.key_id.clone(), &k.public_key) {
                Ok(r) => Some(r),
                Err(e) => {
                    warn!(key_id = %k.key_id, error = %e, "skipping directory entry with unusable PEM");
                    None
                }
            })
            .collect();
        DirectoryLookup::from_recipients(recipients)
    }

    async fn fetch_active(&self) -> Result<Vec<ActiveKey>, ClientError> {
        let resp = self.client.get(self.url("/keys/active")).send().await?;
        Ok(checked(resp).await?.json().await?)
    }

    /// The receiver's own public key, used for the legacy shape.
    pub async fn legacy_public_key(&self) -> Result<PublicKey, ClientError> {
        let resp = self.client.get(self.url("/crypto/public-key")).send().await?;
        let body: PublicKeyBody = checked(resp).await?.json().await?;
        Ok(PublicKey::from_pem(&body.public_key)?)
    }

    pub async fn submit(&self, submission: &CaseSubmission) -> Result<SubmitReceipt, ClientError> {
        let resp = self
            .client
            .post(self.url("/cases/receive"))
            .json(submission)
            .send()
            .await?;
        Ok(checked(resp).await?.json().await?)
    }

    /// Seal `document` for whoever the receiver says is active and submit it.
    pub async fn send(
        &self,
        case_name: &str,
        file_name: &str,
        document: &[u8],
    ) -> Result<SendReport, ClientError> {
        let bailiff = Bailiff::new();
        let (envelope, mode) = match self.active_recipients().await.into_plan() {
            SealPlan::Recipients(recipients) => {
                let ids = recipients.iter().map(|r| r.key_id.clone()).collect();
                (bailiff.seal(document, &recipients)?, SendMode::MultiRecipient { recipients: ids })
            }
            SealPlan::LegacyFallback(reason) => {
                warn!(reason = %reason, "sealing with the legacy single-key shape");
                let key = self.legacy_public_key().await?;
                (bailiff.seal_legacy(document, &key)?, SendMode::Legacy { reason })
            }
        };
        let content_digest = envelope.content_digest.clone();
        let receipt = self
            .submit(&CaseSubmission {
                case_name: case_name.to_string(),
                file_name: file_name.to_string(),
                envelope,
            })
            .await?;

        info!(case_id = receipt.id, digest = %content_digest, "case submitted");
        Ok(SendReport {
            case_id: receipt.id,
            content_digest,
            mode,
        })
    }
}

/// Turn a non-2xx answer into `ClientError::Status` with the body text.
async fn checked(resp: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    debug!(%status, body = %body, "receiver returned error status");
    Err(ClientError::Status { status, body })
}
