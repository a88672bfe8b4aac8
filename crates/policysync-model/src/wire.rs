//! JSON wire shapes of the AWS policy language subset.
//!
//! These mirror what clients send (single values or arrays, `"*"` or
//! `{"AWS": ...}` principals) and are converted to and from the domain types
//! in [`crate::policy`].

use serde::{Deserialize, Serialize};

use crate::policy::{PolicyDocument, Statement};

/// A single value or an array of values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> Default for OneOrMany<T> {
    fn default() -> Self {
        Self::Many(Vec::new())
    }
}

impl<T> OneOrMany<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(v) => vec![v],
            Self::Many(v) => v,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub(crate) enum WirePrincipal {
    Any(String),
    Aws {
        #[serde(rename = "AWS")]
        aws: OneOrMany<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub(crate) struct WireStatement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) sid: Option<String>,
    pub(crate) effect: String,
    #[serde(default)]
    pub(crate) principal: Option<WirePrincipal>,
    #[serde(default)]
    pub(crate) action: Option<OneOrMany<String>>,
    #[serde(default)]
    pub(crate) resource: Option<OneOrMany<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) condition: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub(crate) struct WirePolicy {
    #[serde(default)]
    pub(crate) version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) statement: OneOrMany<WireStatement>,
}

impl From<&Statement> for WireStatement {
    fn from(stmt: &Statement) -> Self {
        Self {
            sid: stmt.sid.clone(),
            effect: stmt.effect.as_str().to_owned(),
            principal: Some(WirePrincipal::Aws {
                aws: OneOrMany::Many(stmt.principals.iter().cloned().collect()),
            }),
            action: Some(OneOrMany::Many(stmt.actions.iter().cloned().collect())),
            resource: Some(OneOrMany::Many(
                stmt.resources.iter().map(|r| r.to_arn()).collect(),
            )),
            condition: stmt.condition.clone(),
        }
    }
}

impl From<&PolicyDocument> for WirePolicy {
    fn from(doc: &PolicyDocument) -> Self {
        Self {
            version: doc.version.clone(),
            id: doc.id.clone(),
            statement: OneOrMany::Many(doc.statements.iter().map(WireStatement::from).collect()),
        }
    }
}
