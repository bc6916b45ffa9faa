use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

use crate::errors::ServiceError;
use crate::models::LeadSubmission;

/// Resend send endpoint
pub const RESEND_API_URL: &str = "https://api.resend.com/emails";

/// Sender identity used when no override is configured
pub const DEFAULT_FROM: &str = "PrinTera <onboarding@resend.dev>";

/// Subject line for lead notifications
pub const LEAD_SUBJECT: &str = "Nuevo lead - PrinTera";

/// Outbound notification channel for accepted leads
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, lead: &LeadSubmission) -> Result<(), ServiceError>;
}

/// Plain-text body: one labeled line per field, absent optionals shown as "-"
pub fn compose_lead_email(lead: &LeadSubmission) -> String {
    [
        "Nuevo lead de la landing".to_string(),
        format!("Nombre: {}", lead.nombre),
        format!("Empresa: {}", lead.empresa.as_deref().unwrap_or("-")),
        format!("Email: {}", lead.email),
        format!("Teléfono: {}", lead.telefono.as_deref().unwrap_or("-")),
        format!("Detalle: {}", lead.detalle),
    ]
    .join("\n")
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: Vec<&'a str>,
    reply_to: &'a str,
    subject: &'a str,
    text: String,
}

#[derive(Debug, Default, Deserialize)]
struct ResendErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Resend-backed implementation of [`Notifier`]
#[derive(Clone)]
pub struct ResendNotifier {
    client: reqwest::Client,
    api_key: Option<String>,
    from: Option<String>,
    to: Option<String>,
    api_url: String,
}

impl ResendNotifier {
    pub fn new(api_key: Option<String>, from: Option<String>, to: Option<String>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap(),
            api_key,
            from,
            to,
            api_url: RESEND_API_URL.to_string(),
        }
    }

    /// Points the notifier at a different send endpoint (tests)
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    #[instrument(skip_all, fields(reply_to = %lead.email))]
    async fn notify(&self, lead: &LeadSubmission) -> Result<(), ServiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ServiceError::ConfigMissing("APP__RESEND_API_KEY no configurada"))?;
        let from = self
            .from
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FROM);
        let to = self
            .to
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ServiceError::ConfigMissing("APP__CONTACT_TO no configurado"))?;

        let payload = SendEmailRequest {
            from,
            to: vec![to],
            reply_to: &lead.email,
            subject: LEAD_SUBJECT,
            text: compose_lead_email(lead),
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ServiceError::EmailProvider(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<ResendErrorBody>()
                .await
                .ok()
                .and_then(|body| body.message)
                .unwrap_or_else(|| "Resend error".to_string());
            return Err(ServiceError::EmailProvider(detail));
        }

        info!("lead notification delivered");
        Ok(())
    }
}
