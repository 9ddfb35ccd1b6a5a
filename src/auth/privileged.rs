//! Privileged-action pipeline
//!
//! Auth gate, role check, the handler's mutation and exactly one audit
//! record per attempt, whatever the outcome.

use crate::{
    auth::middleware::AuthContext,
    error::{AppError, Result},
    middleware::{AppState, RequestMeta},
    models::{
        audit::{AuditAction, AuditEvent, Changes},
        principal::Role,
    },
    services::permission_service::PermissionService,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::{future::Future, time::Instant};
use uuid::Uuid;

const REDACTED: &str = "[REDACTED]";

/// What is being attempted and who may attempt it
#[derive(Debug, Clone)]
pub struct ActionPolicy {
    pub action: AuditAction,
    pub resource: String,
    pub roles: &'static [Role],
}

impl ActionPolicy {
    pub fn new(action: AuditAction, resource: impl Into<String>, roles: &'static [Role]) -> Self {
        Self {
            action,
            resource: resource.into(),
            roles,
        }
    }
}

/// Handler result plus the audit material it produced
#[derive(Debug)]
pub struct Outcome<T> {
    pub value: T,
    pub changes: Option<Changes>,
    pub resource_id: Option<String>,
    pub details: Map<String, Value>,
}

impl<T> Outcome<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            changes: None,
            resource_id: None,
            details: Map::new(),
        }
    }

    pub fn with_changes(mut self, before: Value, after: Value) -> Self {
        self.changes = Some(Changes { before, after });
        self
    }

    pub fn with_resource_id(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        self.details.insert(key.to_string(), value);
        self
    }
}

/// One privileged action bound to a request
pub struct Privileged<'a> {
    state: &'a AppState,
    meta: &'a RequestMeta,
    policy: ActionPolicy,
    resource_id: Option<String>,
    body: Option<Value>,
}

impl<'a> Privileged<'a> {
    pub fn new(state: &'a AppState, meta: &'a RequestMeta, policy: ActionPolicy) -> Self {
        Self {
            state,
            meta,
            policy,
            resource_id: None,
            body: None,
        }
    }

    /// Route parameter identifying the target
    pub fn resource_id(mut self, id: impl ToString) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }

    /// Request payload; stored in the record with secrets redacted
    pub fn body<B: Serialize>(mut self, body: &B) -> Self {
        self.body = serde_json::to_value(body).ok().map(redact);
        self
    }

    /// Raw JSON payload, for bodies that are not deserialized into a type
    pub fn json_body(mut self, body: Value) -> Self {
        self.body = (!body.is_null()).then(|| redact(body));
        self
    }

    pub async fn run<T, F, Fut>(self, handler: F) -> Result<T>
    where
        F: FnOnce(AuthContext) -> Fut,
        Fut: Future<Output = Result<Outcome<T>>>,
    {
        let start = Instant::now();

        let ctx = match self
            .state
            .auth_gate
            .authenticate(self.meta.authorization.as_deref())
            .await
        {
            Ok(ctx) => ctx,
            Err(err) => {
                self.record::<()>(None, self.policy.action, false, Some(&err), None, start)
                    .await;
                return Err(err);
            }
        };

        if let Err(err) = PermissionService::require_role(&ctx, self.policy.roles) {
            let mut details = Map::new();
            details.insert("attemptedAction".into(), json!(self.policy.action));
            details.insert("requiredRoles".into(), json!(self.policy.roles));
            details.insert("userRole".into(), json!(ctx.role()));
            let denied = Outcome::<()> {
                value: (),
                changes: None,
                resource_id: None,
                details,
            };
            self.record(
                Some(ctx.id()),
                AuditAction::UnauthorizedAccess,
                false,
                Some(&err),
                Some(&denied),
                start,
            )
            .await;
            return Err(err);
        }

        let actor = ctx.id();
        match handler(ctx).await {
            Ok(outcome) => {
                self.record(Some(actor), self.policy.action, true, None, Some(&outcome), start)
                    .await;
                Ok(outcome.value)
            }
            // Rejected input never reached the mutation
            Err(err @ AppError::Validation(_)) => Err(err),
            Err(err) => {
                self.record::<()>(Some(actor), self.policy.action, false, Some(&err), None, start)
                    .await;
                Err(err)
            }
        }
    }

    fn body_id(&self) -> Option<String> {
        match self.body.as_ref()?.get("id")? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    async fn record<T>(
        &self,
        actor: Option<Uuid>,
        action: AuditAction,
        success: bool,
        error: Option<&AppError>,
        outcome: Option<&Outcome<T>>,
        start: Instant,
    ) {
        let mut details = Map::new();
        details.insert("method".into(), json!(self.meta.method));
        details.insert("url".into(), json!(self.meta.url));
        if !self.meta.query.is_empty() {
            details.insert("query".into(), redact(json!(self.meta.query)));
        }
        if let Some(body) = &self.body {
            details.insert("body".into(), body.clone());
        }
        if let Some(outcome) = outcome {
            details.extend(outcome.details.clone());
        }

        let mut event: AuditEvent = self.meta.event(action, &self.policy.resource);
        event.actor_id = actor;
        event.resource_id = self
            .resource_id
            .clone()
            .or_else(|| self.body_id())
            .or_else(|| outcome.and_then(|o| o.resource_id.clone()));
        event.details = Value::Object(details);
        event.changes = outcome.and_then(|o| o.changes.clone());
        event.success = success;
        event.error_message = error.map(|e| e.to_string());
        event.duration_ms = start.elapsed().as_millis() as i64;

        self.state.audit_service.record(event).await;
    }
}

/// Replace values of password- or token-like keys, recursively
pub fn redact(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, v)| {
                    let lower = key.to_lowercase();
                    if lower.contains("password") || lower.contains("token") {
                        (key, Value::String(REDACTED.to_string()))
                    } else {
                        (key, redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(redact).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_nested_secrets() {
        let body = json!({
            "email": "a@union.org",
            "password": "Secret123",
            "profile": { "currentPassword": "x", "name": "A" },
            "items": [{ "refreshToken": "t" }]
        });

        let redacted = redact(body);
        assert_eq!(redacted["email"], "a@union.org");
        assert_eq!(redacted["password"], REDACTED);
        assert_eq!(redacted["profile"]["currentPassword"], REDACTED);
        assert_eq!(redacted["profile"]["name"], "A");
        assert_eq!(redacted["items"][0]["refreshToken"], REDACTED);
    }

    #[test]
    fn test_outcome_builders() {
        let outcome = Outcome::new(5)
            .with_resource_id(42)
            .with_detail("count", json!(3))
            .with_changes(json!({"a": 1}), json!({"a": 2}));

        assert_eq!(outcome.resource_id.as_deref(), Some("42"));
        assert_eq!(outcome.details["count"], 3);
        assert_eq!(outcome.changes.unwrap().after["a"], 2);
    }
}
