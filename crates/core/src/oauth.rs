//! OAuth token access for tools.
//!
//! The engine never runs authorization flows itself. It hands tools a
//! [`ScopedTokens`] value bound to the current actor, subject, swarm,
//! instance and agent, backed by an injected [`TokenAccessor`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::resource::ObjectRef;
use crate::turn::TurnAuth;

/// What a tool asks for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub oauth_app: ObjectRef,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_ttl_seconds: Option<u64>,
}

/// Who the token is for.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenScope {
    pub actor_id: Option<String>,
    pub subject: Option<String>,
    pub swarm: String,
    pub instance_id: String,
    pub agent: String,
}

impl TokenScope {
    /// Derive the scope from a turn's auth; the user subject wins over global.
    pub fn from_auth(auth: &TurnAuth, swarm: &str, instance_id: &str, agent: &str) -> Self {
        Self {
            actor_id: auth.actor.as_ref().map(|a| a.id.clone()),
            subject: auth
                .subjects
                .user
                .clone()
                .or_else(|| auth.subjects.global.clone()),
            swarm: swarm.to_string(),
            instance_id: instance_id.to_string(),
            agent: agent.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenErrorInfo {
    pub code: String,
    pub message: String,
}

/// Outcome of a token request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TokenResult {
    #[serde(rename_all = "camelCase")]
    Ready {
        access_token: String,
        token_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
        #[serde(default)]
        scopes: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    AuthorizationRequired {
        auth_session_id: String,
        authorization_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_at: Option<DateTime<Utc>>,
        message: String,
    },
    Error { error: TokenErrorInfo },
}

/// The OAuth collaborator.
#[async_trait]
pub trait TokenAccessor: Send + Sync {
    async fn get_access_token(&self, scope: &TokenScope, request: TokenRequest) -> TokenResult;
}

/// Accessor used when no OAuth collaborator is configured.
#[derive(Debug, Default)]
pub struct UnconfiguredOAuth;

#[async_trait]
impl TokenAccessor for UnconfiguredOAuth {
    async fn get_access_token(&self, _scope: &TokenScope, request: TokenRequest) -> TokenResult {
        TokenResult::Error {
            error: TokenErrorInfo {
                code: "E_OAUTH_NOT_CONFIGURED".into(),
                message: format!("no OAuth accessor configured for {}", request.oauth_app),
            },
        }
    }
}

/// A token accessor bound to one scope.
#[derive(Clone)]
pub struct ScopedTokens {
    accessor: Arc<dyn TokenAccessor>,
    scope: TokenScope,
}

impl ScopedTokens {
    pub fn new(accessor: Arc<dyn TokenAccessor>, scope: TokenScope) -> Self {
        Self { accessor, scope }
    }

    pub fn scope(&self) -> &TokenScope {
        &self.scope
    }

    pub async fn get_access_token(&self, request: TokenRequest) -> TokenResult {
        self.accessor.get_access_token(&self.scope, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::turn::{Actor, Subjects};

    #[test]
    fn scope_prefers_user_subject() {
        let auth = TurnAuth {
            actor: Some(Actor {
                kind: "user".into(),
                id: "u-1".into(),
                display: None,
            }),
            subjects: Subjects {
                global: Some("g".into()),
                user: Some("u".into()),
            },
            claims: Default::default(),
        };
        let scope = TokenScope::from_auth(&auth, "swarm", "inst", "agent");
        assert_eq!(scope.actor_id.as_deref(), Some("u-1"));
        assert_eq!(scope.subject.as_deref(), Some("u"));
    }

    #[test]
    fn token_result_tags_status() {
        let value = serde_json::to_value(TokenResult::AuthorizationRequired {
            auth_session_id: "s".into(),
            authorization_url: "https://auth.example/s".into(),
            expires_at: None,
            message: "approve access".into(),
        })
        .unwrap();
        assert_eq!(value["status"], "authorization_required");
        assert_eq!(value["authSessionId"], "s");
    }

    #[tokio::test]
    async fn unconfigured_accessor_reports_error() {
        let tokens = ScopedTokens::new(Arc::new(UnconfiguredOAuth), TokenScope::default());
        let result = tokens
            .get_access_token(TokenRequest {
                oauth_app: ObjectRef::new("OAuthApp", "github"),
                scopes: vec!["repo".into()],
                min_ttl_seconds: None,
            })
            .await;
        match result {
            TokenResult::Error { error } => assert_eq!(error.code, "E_OAUTH_NOT_CONFIGURED"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
