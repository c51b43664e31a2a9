use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// End-user identity attached to spans as `user.*` attributes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonoscopeUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<String>,
    /// Anything else the host wants on spans, rendered as `user.<key>`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl MonoscopeUser {
    /// Merge `other` into `self`. Fields set on `other` win; extras merge per key.
    pub fn merge(&mut self, other: MonoscopeUser) {
        if other.id.is_some() {
            self.id = other.id;
        }
        if other.email.is_some() {
            self.email = other.email;
        }
        if other.name.is_some() {
            self.name = other.name;
        }
        if other.full_name.is_some() {
            self.full_name = other.full_name;
        }
        if !other.roles.is_empty() {
            self.roles = other.roles;
        }
        self.extra.extend(other.extra);
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none()
            && self.email.is_none()
            && self.name.is_none()
            && self.full_name.is_none()
            && self.roles.is_empty()
            && self.extra.is_empty()
    }

    /// Flatten into `user.*` attribute pairs, in a stable order.
    pub fn attributes(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let named = [
            ("user.id", &self.id),
            ("user.email", &self.email),
            ("user.name", &self.name),
            ("user.full_name", &self.full_name),
        ];
        for (key, value) in named {
            if let Some(v) = value {
                out.push((key.to_string(), v.clone()));
            }
        }
        if !self.roles.is_empty() {
            out.push(("user.roles".to_string(), self.roles.join(",")));
        }
        for (k, v) in &self.extra {
            out.push((format!("user.{k}"), v.clone()));
        }
        out
    }
}
