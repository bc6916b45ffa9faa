use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{instrument, warn};

/// Google siteverify endpoint for reCAPTCHA v3 tokens
pub const SITEVERIFY_URL: &str = "https://www.google.com/recaptcha/api/siteverify";

/// Outcome of a bot-likelihood check
#[derive(Debug, Clone, Serialize)]
pub struct BotVerdict {
    pub accepted: bool,
    pub score: Option<f64>,
    pub reason: VerdictReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictReason {
    /// No secret configured; the check is disabled and everything passes
    NoSecret,
    /// A secret is configured but the client sent no token
    NoToken,
    /// Provider confirmed the token with an acceptable score
    Ok,
    /// Provider confirmed the token but the score is below the minimum
    LowScore,
    /// Provider rejected the token outright
    Failed,
    /// Transport or parse failure while talking to the provider
    Error,
}

impl VerdictReason {
    /// User-facing rejection message; only the low-score case is called out
    /// so automated probing learns nothing about the other failure modes.
    pub fn rejection_message(&self) -> &'static str {
        match self {
            VerdictReason::LowScore => "Verificación reCAPTCHA falló (score bajo).",
            _ => "Verificación reCAPTCHA falló.",
        }
    }
}

/// Bot-likelihood gate for inbound submissions
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BotVerifier: Send + Sync {
    async fn verify<'a>(&self, token: Option<&'a str>) -> BotVerdict;
}

#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    score: Option<f64>,
}

/// reCAPTCHA-backed implementation of [`BotVerifier`]
#[derive(Clone)]
pub struct RecaptchaVerifier {
    client: reqwest::Client,
    secret: Option<String>,
    min_score: f64,
    verify_url: String,
}

impl RecaptchaVerifier {
    pub fn new(secret: Option<String>, min_score: f64) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap(),
            secret,
            min_score,
            verify_url: SITEVERIFY_URL.to_string(),
        }
    }

    /// Points the verifier at a different siteverify endpoint (tests)
    pub fn with_verify_url(mut self, url: impl Into<String>) -> Self {
        self.verify_url = url.into();
        self
    }

    async fn call_siteverify(
        &self,
        secret: &str,
        token: &str,
    ) -> Result<SiteverifyResponse, reqwest::Error> {
        self.client
            .post(&self.verify_url)
            .form(&[("secret", secret), ("response", token)])
            .send()
            .await?
            .json::<SiteverifyResponse>()
            .await
    }
}

#[async_trait]
impl BotVerifier for RecaptchaVerifier {
    #[instrument(skip_all)]
    async fn verify<'a>(&self, token: Option<&'a str>) -> BotVerdict {
        let Some(secret) = self.secret.as_deref() else {
            return BotVerdict {
                accepted: true,
                score: None,
                reason: VerdictReason::NoSecret,
            };
        };
        let Some(token) = token else {
            return BotVerdict {
                accepted: false,
                score: None,
                reason: VerdictReason::NoToken,
            };
        };

        match self.call_siteverify(secret, token).await {
            Ok(response) => {
                let score = response.score;
                if !response.success {
                    return BotVerdict {
                        accepted: false,
                        score,
                        reason: VerdictReason::Failed,
                    };
                }
                // An absent score counts as acceptable; only a reported score
                // below the minimum rejects the token.
                let accepted = score.map_or(true, |s| s >= self.min_score);
                BotVerdict {
                    accepted,
                    score,
                    reason: if accepted {
                        VerdictReason::Ok
                    } else {
                        VerdictReason::LowScore
                    },
                }
            }
            Err(err) => {
                warn!("reCAPTCHA verification error: {}", err);
                BotVerdict {
                    accepted: false,
                    score: None,
                    reason: VerdictReason::Error,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn no_secret_accepts_without_calling_provider() {
        let verifier = RecaptchaVerifier::new(None, 0.5);
        let verdict = verifier.verify(Some("anything")).await;
        assert!(verdict.accepted);
        assert_eq!(verdict.reason, VerdictReason::NoSecret);
        assert!(verdict.score.is_none());
    }

    #[tokio::test]
    async fn missing_token_is_rejected() {
        let verifier = RecaptchaVerifier::new(Some("secret".into()), 0.5);
        let verdict = verifier.verify(None).await;
        assert!(!verdict.accepted);
        assert_eq!(verdict.reason, VerdictReason::NoToken);
    }

    #[tokio::test]
    async fn good_score_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/siteverify"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": true, "score": 0.9})),
            )
            .mount(&server)
            .await;

        let verifier = RecaptchaVerifier::new(Some("secret".into()), 0.5)
            .with_verify_url(format!("{}/siteverify", server.uri()));
        let verdict = verifier.verify(Some("token")).await;
        assert!(verdict.accepted);
        assert_eq!(verdict.reason, VerdictReason::Ok);
        assert_eq!(verdict.score, Some(0.9));
    }

    #[tokio::test]
    async fn low_score_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"success": true, "score": 0.2})),
            )
            .mount(&server)
            .await;

        let verifier = RecaptchaVerifier::new(Some("secret".into()), 0.5)
            .with_verify_url(server.uri());
        let verdict = verifier.verify(Some("token")).await;
        assert!(!verdict.accepted);
        assert_eq!(verdict.reason, VerdictReason::LowScore);
    }

    #[tokio::test]
    async fn absent_score_is_accepted_on_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
            .mount(&server)
            .await;

        let verifier = RecaptchaVerifier::new(Some("secret".into()), 0.5)
            .with_verify_url(server.uri());
        let verdict = verifier.verify(Some("token")).await;
        assert!(verdict.accepted);
        assert!(verdict.score.is_none());
    }

    #[tokio::test]
    async fn provider_rejection_is_not_reported_as_low_score() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": false})))
            .mount(&server)
            .await;

        let verifier = RecaptchaVerifier::new(Some("secret".into()), 0.5)
            .with_verify_url(server.uri());
        let verdict = verifier.verify(Some("token")).await;
        assert!(!verdict.accepted);
        assert_eq!(verdict.reason, VerdictReason::Failed);
    }

    #[tokio::test]
    async fn transport_failure_folds_into_rejection() {
        let verifier = RecaptchaVerifier::new(Some("secret".into()), 0.5)
            .with_verify_url("http://127.0.0.1:1/siteverify");
        let verdict = verifier.verify(Some("token")).await;
        assert!(!verdict.accepted);
        assert_eq!(verdict.reason, VerdictReason::Error);
    }

    #[tokio::test]
    async fn garbage_body_folds_into_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let verifier = RecaptchaVerifier::new(Some("secret".into()), 0.5)
            .with_verify_url(server.uri());
        let verdict = verifier.verify(Some("token")).await;
        assert!(!verdict.accepted);
        assert_eq!(verdict.reason, VerdictReason::Error);
    }
}
