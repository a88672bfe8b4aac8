//! Policy document types.
//!
//! Statement elements are held in ordered sets, so two documents that list
//! the same principals, actions, or resources in a different order compare
//! equal and serialize to the same canonical bytes.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::MalformedPolicy;
use crate::wire::WirePolicy;

/// The principal that matches every caller, including anonymous ones.
pub const WILDCARD_PRINCIPAL: &str = "*";

/// The action that makes an object publicly readable when granted to
/// [`WILDCARD_PRINCIPAL`].
pub const GET_OBJECT_ACTION: &str = "s3:GetObject";

/// Prefix every S3 resource ARN carries on the wire.
pub const RESOURCE_ARN_PREFIX: &str = "arn:aws:s3:::";

/// The effect of a policy statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effect {
    /// Allow the listed actions.
    Allow,
    /// Deny the listed actions.
    Deny,
}

impl Effect {
    /// Wire spelling of the effect.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "Allow",
            Self::Deny => "Deny",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Effect {
    type Err = MalformedPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Allow" => Ok(Self::Allow),
            "Deny" => Ok(Self::Deny),
            other => Err(MalformedPolicy::InvalidEffect(other.to_owned())),
        }
    }
}

/// A bucket-scoped resource pattern with the ARN prefix removed.
///
/// Either the bucket root (`photos`) or `photos/<object-name>`, where the
/// object part may contain `*` and `?` wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourcePattern(String);

impl ResourcePattern {
    /// Wrap a pattern that has already been stripped of its ARN prefix.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self(pattern.into())
    }

    /// The pattern without its ARN prefix.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The wire form (`arn:aws:s3:::<pattern>`).
    #[must_use]
    pub fn to_arn(&self) -> String {
        format!("{RESOURCE_ARN_PREFIX}{}", self.0)
    }
}

impl fmt::Display for ResourcePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One allow/deny rule binding principals, actions, and resource patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Optional statement identifier.
    pub sid: Option<String>,
    /// Whether the statement allows or denies.
    pub effect: Effect,
    /// Principals the statement applies to (`*` for everyone).
    pub principals: BTreeSet<String>,
    /// Actions the statement covers.
    pub actions: BTreeSet<String>,
    /// Resource patterns the statement covers.
    pub resources: BTreeSet<ResourcePattern>,
    /// Condition block, carried through verbatim and never interpreted.
    pub condition: Option<serde_json::Value>,
}

impl Statement {
    /// An empty statement with the given effect.
    #[must_use]
    pub fn new(effect: Effect) -> Self {
        Self {
            sid: None,
            effect,
            principals: BTreeSet::new(),
            actions: BTreeSet::new(),
            resources: BTreeSet::new(),
            condition: None,
        }
    }

    /// Set the statement id.
    #[must_use]
    pub fn sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    /// Add a principal.
    #[must_use]
    pub fn principal(mut self, principal: impl Into<String>) -> Self {
        self.principals.insert(principal.into());
        self
    }

    /// Add an action.
    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.actions.insert(action.into());
        self
    }

    /// Add a resource pattern (without the ARN prefix).
    #[must_use]
    pub fn resource(mut self, pattern: impl Into<String>) -> Self {
        self.resources.insert(ResourcePattern::new(pattern));
        self
    }

    /// Whether this statement grants anonymous read access to objects:
    /// `Allow`, wildcard principal, and the object read action.
    #[must_use]
    pub fn grants_public_read(&self) -> bool {
        self.effect == Effect::Allow
            && self.principals.contains(WILDCARD_PRINCIPAL)
            && self.actions.contains(GET_OBJECT_ACTION)
    }
}

/// A parsed bucket policy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PolicyDocument {
    /// Policy language version (e.g. `2012-10-17`).
    pub version: String,
    /// Optional policy identifier.
    pub id: Option<String>,
    /// Statements in submission order.
    pub statements: Vec<Statement>,
}

impl PolicyDocument {
    /// A document with the given version and no statements.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            id: None,
            statements: Vec::new(),
        }
    }

    /// Append a statement.
    #[must_use]
    pub fn with_statement(mut self, statement: Statement) -> Self {
        self.statements.push(statement);
        self
    }

    /// Check the invariant required before the document may be persisted.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPolicy::EmptyVersion`] if `version` is empty.
    pub fn validate_version(&self) -> Result<(), MalformedPolicy> {
        if self.version.is_empty() {
            return Err(MalformedPolicy::EmptyVersion);
        }
        Ok(())
    }

    /// Serialize to the canonical JSON form that is persisted and served.
    ///
    /// Principals are always written as `{"AWS": [...]}`, and actions and
    /// resources as sorted arrays, so equal documents produce equal bytes.
    ///
    /// # Errors
    ///
    /// Returns the underlying serializer error (not expected for documents
    /// built through the parser).
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&WirePolicy::from(self))
    }
}
