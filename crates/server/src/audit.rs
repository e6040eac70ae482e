//! Audit trail for grants, token issuance and credential failures.
//!
//! Every event is persisted through the [`Store`] and mirrored to the
//! `audit` tracing target.

use std::sync::Arc;

use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::entity::audit_event;
use crate::error::StoreError;
use crate::store::Store;

pub const UNKNOWN_SUBJECT: &str = "Unknown";

/// Audited actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditAction {
    AuthorizationGranted,
    AuthorizationFailed,
    TokenIssued,
    TokenExchangeFailed,
    LoginFailed,
    UserRegistered,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::AuthorizationGranted => "Authorization Granted",
            AuditAction::AuthorizationFailed => "Authorization Failed",
            AuditAction::TokenIssued => "Token Issued",
            AuditAction::TokenExchangeFailed => "Token Exchange Failed",
            AuditAction::LoginFailed => "Login Failed",
            AuditAction::UserRegistered => "User Registered",
        }
    }
}

#[derive(Clone)]
pub struct AuditLog {
    store: Arc<dyn Store>,
}

impl AuditLog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Build an event without persisting it, for callers that write it as
    /// part of a larger transaction.
    pub fn event(action: AuditAction, subject: Option<&str>, details: Value) -> audit_event::Model {
        audit_event::Model {
            id: uuid::Uuid::new_v4().to_string(),
            occurred_at: OffsetDateTime::now_utc(),
            action: action.as_str().to_string(),
            subject: subject.unwrap_or(UNKNOWN_SUBJECT).to_string(),
            details: details.to_string(),
        }
    }

    /// Emit an already-persisted event to the tracing target.
    pub fn trace(event: &audit_event::Model) {
        tracing::info!(
            target: "audit",
            action = %event.action,
            subject = %event.subject,
            details = %event.details,
            "audit event"
        );
    }

    /// Persist and trace an event.
    pub async fn record(
        &self,
        action: AuditAction,
        subject: Option<&str>,
        details: Value,
    ) -> Result<(), StoreError> {
        let event = Self::event(action, subject, details);
        Self::trace(&event);
        self.store.append_audit_event(event).await
    }

    /// Like [`AuditLog::record`], but only logs a storage failure. Used on
    /// paths that are already failing.
    pub async fn record_best_effort(&self, action: AuditAction, subject: Option<&str>, details: Value) {
        if let Err(e) = self.record(action, subject, details).await {
            tracing::error!(error = %e, action = action.as_str(), "failed to persist audit event");
        }
    }
}

/// Details payload for client-scoped events.
pub fn client_details(client_id: &str, scope: Option<&str>, reason: Option<&str>) -> Value {
    let mut details = json!({ "client_id": client_id });
    if let Some(scope) = scope {
        details["scope"] = json!(scope);
    }
    if let Some(reason) = reason {
        details["reason"] = json!(reason);
    }
    details
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_defaults_subject_to_unknown() {
        let event = AuditLog::event(AuditAction::TokenExchangeFailed, None, json!({}));
        assert_eq!(event.subject, UNKNOWN_SUBJECT);
        assert_eq!(event.action, "Token Exchange Failed");
    }

    #[test]
    fn client_details_include_optional_fields() {
        let v = client_details("c1", Some("openid email"), None);
        assert_eq!(v["client_id"], "c1");
        assert_eq!(v["scope"], "openid email");
        assert!(v.get("reason").is_none());
    }
}
