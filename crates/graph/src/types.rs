use serde::{Deserialize, Serialize};
use solmap_protocol::{EntityKind, Metadata};
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;

/// Normalized node identifier, unique within one snapshot
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Well-known relationship tags. The taxonomy is open: any other tag the
/// platform emits is carried through untouched.
pub mod kinds {
    /// Field referencing another form's entries
    pub const REFERENCE: &str = "REFERENCE";
    /// Field creating entries in another form
    pub const FORM_ENTRY: &str = "FORM_ENTRY";
    /// Field looking up values from another form
    pub const LOOKUP: &str = "LOOKUP";
    pub const FIELD_LOOKUP: &str = "FIELD_LOOKUP";
    /// Field launching a workflow
    pub const WORKFLOW: &str = "WORKFLOW";
    pub const WORKFLOW_INVOKE: &str = "WORKFLOW_INVOKE";
    /// Automatic action fired when a child entry is created
    pub const CHILD_OBJECT_CREATED: &str = "CHILD_OBJECT_CREATED";
    /// Action fired by a user
    pub const MANUAL_ACTION: &str = "MANUAL_ACTION";
    /// Action writing into its target form
    pub const ACTION_TARGET: &str = "ACTION_TARGET";

    pub const KNOWN: [&str; 9] = [
        REFERENCE,
        FORM_ENTRY,
        LOOKUP,
        FIELD_LOOKUP,
        WORKFLOW,
        WORKFLOW_INVOKE,
        CHILD_OBJECT_CREATED,
        MANUAL_ACTION,
        ACTION_TARGET,
    ];
}

/// Relationship category tag attached to every reference
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationshipKind(String);

impl RelationshipKind {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_known(&self) -> bool {
        kinds::KNOWN.contains(&self.0.as_str())
    }

    /// Triggers and manual actions, as opposed to field-level links
    pub fn is_action(&self) -> bool {
        matches!(
            self.0.as_str(),
            kinds::CHILD_OBJECT_CREATED | kinds::MANUAL_ACTION | kinds::ACTION_TARGET
        )
    }
}

impl Borrow<str> for RelationshipKind {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RelationshipKind {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// Form, workflow, or custom action after alias resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,

    pub kind: EntityKind,

    /// Name of the first record that contributed to this entity
    pub display_name: String,

    /// Every raw identifier that resolves to this entity
    pub raw_ids: BTreeSet<String>,

    /// Every non-blank display name seen across merged records
    pub aliases: BTreeSet<String>,

    #[serde(default)]
    pub metadata: Metadata,
}

/// Directed edge, unique per `(source, target, kind)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub source: EntityId,
    pub target: EntityId,
    pub kind: RelationshipKind,

    /// Raw occurrences collapsed into this edge
    pub multiplicity: u32,

    #[serde(default)]
    pub metadata: Metadata,
}

pub type ReferenceKey = (EntityId, EntityId, RelationshipKind);

impl Reference {
    pub fn key(&self) -> ReferenceKey {
        (self.source.clone(), self.target.clone(), self.kind.clone())
    }

    pub fn is_self_reference(&self) -> bool {
        self.source == self.target
    }

    /// An explicit `edge_category` tag wins over the kind's default
    pub fn is_action(&self) -> bool {
        match self.metadata.get("edge_category").and_then(|v| v.as_str()) {
            Some(category) => category == "action",
            None => self.kind.is_action(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingEndpoint {
    Source,
    Target,
    Both,
}

/// Non-fatal condition recorded during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisWarning {
    DanglingReference {
        source_raw_id: String,
        target_raw_id: String,
        kind: String,
        missing: MissingEndpoint,
    },
    EmptyInput,
}

impl AnalysisWarning {
    pub fn is_dangling(&self) -> bool {
        matches!(self, AnalysisWarning::DanglingReference { .. })
    }
}
