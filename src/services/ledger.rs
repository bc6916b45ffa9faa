use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{info, instrument};

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::models::LeadSubmission;

/// OAuth scope granting spreadsheet read/write access
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Google OAuth token endpoint
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Sheets values API base
pub const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Canonical header row, column order fixed
const HEADER_ROW: [&str; 8] = [
    "timestamp",
    "nombre",
    "empresa",
    "email",
    "telefono",
    "detalle",
    "fuente",
    "userAgent",
];

/// Durable append-only log of accepted leads
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn append(&self, lead: &LeadSubmission, user_agent: &str) -> Result<(), ServiceError>;
}

#[derive(Debug, Clone)]
struct ServiceAccount {
    client_email: String,
    private_key: String,
}

#[derive(Serialize)]
struct GoogleClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Default, Deserialize)]
struct ReadValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

/// Google Sheets-backed implementation of [`Ledger`]
#[derive(Clone)]
pub struct SheetsLedger {
    client: reqwest::Client,
    account: Option<ServiceAccount>,
    sheets_id: Option<String>,
    tab: String,
    source: String,
    token_url: String,
    api_base: String,
}

impl SheetsLedger {
    pub fn from_config(cfg: &AppConfig) -> Self {
        let account = match (
            cfg.google_service_account_email.clone(),
            cfg.google_private_key.clone(),
        ) {
            (Some(client_email), Some(private_key)) => Some(ServiceAccount {
                client_email,
                private_key,
            }),
            _ => None,
        };

        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap(),
            account,
            sheets_id: cfg.google_sheets_id.clone(),
            tab: cfg.sheet_tab.clone(),
            source: cfg.lead_source.clone(),
            token_url: GOOGLE_TOKEN_URL.to_string(),
            api_base: SHEETS_API_BASE.to_string(),
        }
    }

    /// Points the ledger at different Google endpoints (tests)
    pub fn with_endpoints(mut self, token_url: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.api_base = api_base.into();
        self
    }

    /// Signs a service-account assertion and exchanges it for a bearer token.
    async fn access_token(&self) -> Result<String, ServiceError> {
        let account = self.account.as_ref().ok_or(ServiceError::ConfigMissing(
            "Credenciales de Google no configuradas (APP__GOOGLE_SERVICE_ACCOUNT_EMAIL / APP__GOOGLE_PRIVATE_KEY)",
        ))?;

        // Keys pasted into env vars usually carry literal \n sequences.
        let pem = account.private_key.replace("\\n", "\n");
        let key = EncodingKey::from_rsa_pem(pem.as_bytes())
            .map_err(|err| ServiceError::Ledger(format!("invalid Google private key: {}", err)))?;

        let now = Utc::now().timestamp();
        let claims = GoogleClaims {
            iss: &account.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.token_url,
            iat: now,
            exp: now + 3600,
        };
        let assertion = encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|err| ServiceError::Ledger(format!("failed to sign assertion: {}", err)))?;

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", JWT_BEARER_GRANT),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(|err| ServiceError::Ledger(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ServiceError::Ledger(format!(
                "token exchange failed with status {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|err| ServiceError::Ledger(err.to_string()))?;
        Ok(token.access_token)
    }

    /// Reads the first row; writes the canonical headers only when every cell
    /// is empty or whitespace. The write is idempotent, so the read-then-write
    /// race on concurrent first submissions is harmless.
    async fn ensure_headers(&self, token: &str, sheets_id: &str) -> Result<(), ServiceError> {
        let range = format!("{}!A1:H1", self.tab);
        let read_url = format!("{}/{}/values/{}", self.api_base, sheets_id, range);

        let response = self
            .client
            .get(&read_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| ServiceError::Ledger(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ServiceError::Ledger(format!(
                "header read failed with status {}",
                response.status()
            )));
        }
        let first_row: ReadValueRange = response
            .json()
            .await
            .map_err(|err| ServiceError::Ledger(err.to_string()))?;

        if headers_present(&first_row.values) {
            return Ok(());
        }

        let update_url = format!(
            "{}/{}/values/{}?valueInputOption=RAW",
            self.api_base, sheets_id, range
        );
        let response = self
            .client
            .put(&update_url)
            .bearer_auth(token)
            .json(&json!({ "values": [HEADER_ROW] }))
            .send()
            .await
            .map_err(|err| ServiceError::Ledger(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ServiceError::Ledger(format!(
                "header write failed with status {}",
                response.status()
            )));
        }

        info!("lead sheet headers created");
        Ok(())
    }

    async fn append_row(
        &self,
        token: &str,
        sheets_id: &str,
        row: Vec<String>,
    ) -> Result<(), ServiceError> {
        let append_url = format!(
            "{}/{}/values/{}!A1:append?valueInputOption=USER_ENTERED",
            self.api_base, sheets_id, self.tab
        );
        let response = self
            .client
            .post(&append_url)
            .bearer_auth(token)
            .json(&json!({ "values": [row] }))
            .send()
            .await
            .map_err(|err| ServiceError::Ledger(err.to_string()))?;
        if !response.status().is_success() {
            return Err(ServiceError::Ledger(format!(
                "append failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }

    fn lead_row(&self, lead: &LeadSubmission, user_agent: &str, timestamp: String) -> Vec<String> {
        vec![
            timestamp,
            lead.nombre.clone(),
            lead.empresa.clone().unwrap_or_default(),
            lead.email.clone(),
            lead.telefono.clone().unwrap_or_default(),
            lead.detalle.clone(),
            self.source.clone(),
            user_agent.to_string(),
        ]
    }
}

/// True when the first row holds at least one non-whitespace cell
fn headers_present(rows: &[Vec<serde_json::Value>]) -> bool {
    rows.first().is_some_and(|row| {
        row.iter().any(|cell| {
            let text = match cell {
                serde_json::Value::Null => String::new(),
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            !text.trim().is_empty()
        })
    })
}

#[async_trait]
impl Ledger for SheetsLedger {
    #[instrument(skip_all, fields(email = %lead.email))]
    async fn append(&self, lead: &LeadSubmission, user_agent: &str) -> Result<(), ServiceError> {
        let sheets_id = self
            .sheets_id
            .clone()
            .ok_or(ServiceError::ConfigMissing("APP__GOOGLE_SHEETS_ID no configurado"))?;

        let token = self.access_token().await?;
        self.ensure_headers(&token, &sheets_id).await?;

        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let row = self.lead_row(lead, user_agent, timestamp);
        self.append_row(&token, &sheets_id, row).await?;

        info!("lead appended to sheet");
        Ok(())
    }
}
