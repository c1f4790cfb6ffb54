//! Request context for stack operations.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::store::UserCreds;

/// Identity of the caller an operation runs on behalf of.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Acting user.
    pub user_id: Option<String>,
    /// Acting user name.
    pub username: Option<String>,
    /// Password, present only for password style deferred auth.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    /// Project the caller is scoped to.
    pub project_id: Option<String>,
    /// Trust the caller is acting under, if any.
    pub trust_id: Option<String>,
    /// Bearer token, if the caller authenticated with one.
    #[serde(default, skip_serializing)]
    pub auth_token: Option<String>,
}

impl RequestContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the user ID.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Sets the user name.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the project ID.
    #[must_use]
    pub fn with_project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    /// Sets the trust ID.
    #[must_use]
    pub fn with_trust_id(mut self, trust_id: impl Into<String>) -> Self {
        self.trust_id = Some(trust_id.into());
        self
    }

    /// Sets the auth token.
    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Rebuilds the context captured when the credentials were stored.
    ///
    /// For trust based credentials the acting user is the trustor, not
    /// whoever happens to be operating on the stack now.
    #[must_use]
    pub fn from_user_creds(creds: &UserCreds) -> Self {
        Self {
            user_id: creds.trustor_user_id.clone().or_else(|| creds.user_id.clone()),
            username: creds.username.clone(),
            password: creds.password.clone(),
            project_id: creds.project_id.clone(),
            trust_id: creds.trust_id.clone(),
            auth_token: None,
        }
    }

    /// Converts to a dictionary for log fields, without secrets.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let field = |value: &Option<String>| {
            value
                .as_ref()
                .map_or(serde_json::Value::Null, |v| serde_json::json!(v))
        };

        let mut map = HashMap::new();
        map.insert("user_id".to_string(), field(&self.user_id));
        map.insert("username".to_string(), field(&self.username));
        map.insert("project_id".to_string(), field(&self.project_id));
        map.insert("trust_id".to_string(), field(&self.trust_id));
        map
    }
}
