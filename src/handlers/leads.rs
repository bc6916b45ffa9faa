use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header::USER_AGENT, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::{errors::ServiceError, models::ContactRequest, AppState};

/// Confirmation shown to the submitter
pub const THANKS_MESSAGE: &str = "¡Gracias! Hemos recibido tu solicitud.";

/// Wire shape for accepted submissions
#[derive(Debug, Serialize, Deserialize)]
pub struct ContactResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Contact-form intake: validate, screen bots, notify sales, log the lead.
///
/// The pipeline is strictly sequential with early return on failure. The one
/// deliberate exception is the ledger append: by that point the notification
/// email has already gone out, so a ledger failure downgrades to
/// `saved: false` instead of failing the request.
#[instrument(skip_all)]
pub async fn submit_contact(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ContactRequest>, JsonRejection>,
) -> Result<Response, ServiceError> {
    let Json(request) = payload.map_err(|rejection| {
        warn!("rejected malformed contact payload: {}", rejection);
        ServiceError::MalformedRequest
    })?;

    let lead = request.into_lead()?;

    // Honeypot: automated submitters get a silent accept and no side effects,
    // so they cannot tell they were filtered.
    if lead.is_honeypot() {
        info!("honeypot field filled; dropping submission silently");
        return Ok(Json(ContactResponse {
            ok: true,
            saved: None,
            message: None,
        })
        .into_response());
    }

    let verdict = state
        .bot_verifier
        .verify(lead.recaptcha_token.as_deref())
        .await;
    if !verdict.accepted {
        warn!(
            reason = ?verdict.reason,
            score = ?verdict.score,
            "reCAPTCHA check rejected submission"
        );
        return Err(ServiceError::BotCheckRejected(verdict.reason));
    }

    state.notifier.notify(&lead).await?;

    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    let saved = match state.ledger.append(&lead, user_agent).await {
        Ok(()) => true,
        Err(err) => {
            error!("SHEETS_ERROR {}", err);
            false
        }
    };

    Ok(Json(ContactResponse {
        ok: true,
        saved: Some(saved),
        message: Some(THANKS_MESSAGE.to_string()),
    })
    .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::StatusCode;

    use crate::config::AppConfig;
    use crate::services::bot_check::{BotVerdict, MockBotVerifier, VerdictReason};
    use crate::services::ledger::MockLedger;
    use crate::services::notifier::MockNotifier;

    fn valid_payload() -> ContactRequest {
        ContactRequest {
            nombre: Some("Ana Ruiz".into()),
            email: Some("ana@x.com".into()),
            detalle: Some("Necesito 3 equipos".into()),
            ..Default::default()
        }
    }

    fn disabled_bot_check() -> MockBotVerifier {
        let mut bot = MockBotVerifier::new();
        bot.expect_verify().returning(|_| BotVerdict {
            accepted: true,
            score: None,
            reason: VerdictReason::NoSecret,
        });
        bot
    }

    fn state(bot: MockBotVerifier, notifier: MockNotifier, ledger: MockLedger) -> AppState {
        AppState {
            config: AppConfig::default(),
            bot_verifier: Arc::new(bot),
            notifier: Arc::new(notifier),
            ledger: Arc::new(ledger),
        }
    }

    async fn call(state: AppState, payload: ContactRequest) -> Response {
        match submit_contact(State(state), HeaderMap::new(), Ok(Json(payload))).await {
            Ok(response) => response,
            Err(err) => err.into_response(),
        }
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn honeypot_accepts_silently_without_side_effects() {
        let mut bot = MockBotVerifier::new();
        bot.expect_verify().times(0);
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(0);
        let mut ledger = MockLedger::new();
        ledger.expect_append().times(0);

        let mut payload = valid_payload();
        payload.website = Some("http://spam.example".into());

        let response = call(state(bot, notifier, ledger), payload).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["ok"], true);
        assert!(json.get("saved").is_none());
    }

    #[tokio::test]
    async fn bot_rejection_stops_before_notification() {
        let mut bot = MockBotVerifier::new();
        bot.expect_verify().returning(|_| BotVerdict {
            accepted: false,
            score: Some(0.1),
            reason: VerdictReason::LowScore,
        });
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(0);
        let mut ledger = MockLedger::new();
        ledger.expect_append().times(0);

        let response = call(state(bot, notifier, ledger), valid_payload()).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["ok"], false);
        assert_eq!(json["message"], "Verificación reCAPTCHA falló (score bajo).");
    }

    #[tokio::test]
    async fn notifier_failure_stops_before_ledger() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_notify()
            .returning(|_| Err(ServiceError::ConfigMissing("APP__CONTACT_TO no configurado")));
        let mut ledger = MockLedger::new();
        ledger.expect_append().times(0);

        let response = call(
            state(disabled_bot_check(), notifier, ledger),
            valid_payload(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["message"], "APP__CONTACT_TO no configurado");
    }

    #[tokio::test]
    async fn ledger_failure_downgrades_to_saved_false() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).returning(|_| Ok(()));
        let mut ledger = MockLedger::new();
        ledger
            .expect_append()
            .times(1)
            .returning(|_, _| Err(ServiceError::Ledger("quota exhausted".into())));

        let response = call(
            state(disabled_bot_check(), notifier, ledger),
            valid_payload(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["saved"], false);
        assert_eq!(json["message"], THANKS_MESSAGE);
    }

    #[tokio::test]
    async fn accepted_lead_reports_saved_true() {
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(1).returning(|_| Ok(()));
        let mut ledger = MockLedger::new();
        ledger.expect_append().times(1).returning(|_, _| Ok(()));

        let response = call(
            state(disabled_bot_check(), notifier, ledger),
            valid_payload(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["ok"], true);
        assert_eq!(json["saved"], true);
        assert_eq!(json["message"], THANKS_MESSAGE);
    }

    #[tokio::test]
    async fn validation_failure_lists_offending_fields() {
        let mut bot = MockBotVerifier::new();
        bot.expect_verify().times(0);
        let mut notifier = MockNotifier::new();
        notifier.expect_notify().times(0);
        let mut ledger = MockLedger::new();
        ledger.expect_append().times(0);

        let payload = ContactRequest {
            nombre: Some("A".into()),
            email: Some("nope".into()),
            detalle: Some("hey".into()),
            ..Default::default()
        };

        let response = call(state(bot, notifier, ledger), payload).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["ok"], false);
        let issues = json["issues"].as_array().unwrap();
        let fields: Vec<&str> = issues
            .iter()
            .map(|issue| issue["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, vec!["nombre", "email", "detalle"]);
    }
}
