use serde::Deserialize;
use validator::Validate;

use crate::errors::{FieldIssue, ServiceError};

/// Fields carrying validation rules, in the order issues are reported.
const VALIDATED_FIELDS: [&str; 3] = ["nombre", "email", "detalle"];

/// Raw contact-form payload as posted by the landing page.
///
/// Every field is optional at the wire level so a missing required field
/// surfaces as a per-field issue instead of a deserialization error.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct ContactRequest {
    pub nombre: Option<String>,
    pub empresa: Option<String>,
    pub email: Option<String>,
    pub telefono: Option<String>,
    pub detalle: Option<String>,
    /// Honeypot field, invisible on the real form
    pub website: Option<String>,
    #[serde(rename = "recaptchaToken")]
    pub recaptcha_token: Option<String>,
}

/// A validated lead submission, consumed by the notification and ledger
/// services and discarded afterwards.
#[derive(Debug, Clone, Validate)]
pub struct LeadSubmission {
    #[validate(length(min = 2, message = "Ingresa tu nombre (mín. 2 caracteres)"))]
    pub nombre: String,
    pub empresa: Option<String>,
    #[validate(email(message = "Correo inválido"))]
    pub email: String,
    pub telefono: Option<String>,
    #[validate(length(
        min = 5,
        message = "Cuéntanos un poco más sobre tu necesidad (mín. 5 caracteres)"
    ))]
    pub detalle: String,
    pub website: Option<String>,
    pub recaptcha_token: Option<String>,
}

impl LeadSubmission {
    /// True when the invisible honeypot field was filled in, marking the
    /// submission as automated.
    pub fn is_honeypot(&self) -> bool {
        self.website.is_some()
    }
}

impl ContactRequest {
    /// Trims every field and validates the required ones, returning either a
    /// usable submission or the full list of per-field issues.
    pub fn into_lead(self) -> Result<LeadSubmission, ServiceError> {
        let lead = LeadSubmission {
            nombre: trim_required(self.nombre),
            empresa: trim_optional(self.empresa),
            email: trim_required(self.email),
            telefono: trim_optional(self.telefono),
            detalle: trim_required(self.detalle),
            website: trim_optional(self.website),
            recaptcha_token: trim_optional(self.recaptcha_token),
        };

        match lead.validate() {
            Ok(()) => Ok(lead),
            Err(errors) => Err(ServiceError::Validation(field_issues(&errors))),
        }
    }
}

fn trim_required(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

fn trim_optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Flattens validator output into (field, message) pairs with a stable field
/// order, so the UI can attach each message to its input.
fn field_issues(errors: &validator::ValidationErrors) -> Vec<FieldIssue> {
    let by_field = errors.field_errors();
    let mut issues = Vec::new();
    for field in VALIDATED_FIELDS {
        if let Some(field_errors) = by_field.get(field) {
            for err in field_errors.iter() {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string());
                issues.push(FieldIssue::new(field, message));
            }
        }
    }
    issues
}
