//! Wire types exchanged between the fetch layer and the analysis core.
//!
//! A [`SolutionSnapshot`] is the flat, unnormalized view of one container:
//! entity records that may repeat or alias each other, and reference records
//! that name their endpoints by raw platform identifiers.

use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// Opaque key/value bag carried alongside records. Sorted so serialized
/// output is stable across runs.
pub type Metadata = BTreeMap<String, serde_json::Value>;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Form,
    Workflow,
    CustomAction,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Form,
        EntityKind::Workflow,
        EntityKind::CustomAction,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Form => "form",
            EntityKind::Workflow => "workflow",
            EntityKind::CustomAction => "custom_action",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One fetched entity as the platform reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawEntityRecord {
    /// Every identifier the platform used for this entity (e.g. `id` and `formId`)
    pub raw_ids: Vec<String>,

    pub kind: EntityKind,

    #[serde(default)]
    pub display_name: String,

    #[serde(default)]
    pub metadata: Metadata,
}

impl RawEntityRecord {
    pub fn new(kind: EntityKind, display_name: impl Into<String>) -> Self {
        Self {
            raw_ids: Vec::new(),
            kind,
            display_name: display_name.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn raw_id(mut self, id: impl Into<String>) -> Self {
        self.raw_ids.push(id.into());
        self
    }

    pub fn meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

/// One declared relationship or trigger, endpoints named by raw id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawReferenceRecord {
    pub source_raw_id: String,
    pub target_raw_id: String,

    /// Platform relationship tag, kept verbatim (e.g. `LOOKUP`, `CHILD_OBJECT_CREATED`)
    pub kind: String,

    #[serde(default)]
    pub metadata: Metadata,
}

impl RawReferenceRecord {
    pub fn new(
        source_raw_id: impl Into<String>,
        target_raw_id: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        Self {
            source_raw_id: source_raw_id.into(),
            target_raw_id: target_raw_id.into(),
            kind: kind.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn meta(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SolutionSnapshot {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    #[serde(default)]
    pub container_id: Option<String>,

    #[serde(default)]
    pub entities: Vec<RawEntityRecord>,

    #[serde(default)]
    pub references: Vec<RawReferenceRecord>,
}

fn default_schema_version() -> u32 {
    SNAPSHOT_SCHEMA_VERSION
}

impl SolutionSnapshot {
    pub fn new(container_id: Option<String>) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            container_id,
            entities: Vec::new(),
            references: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.references.is_empty()
    }
}

pub fn snapshot_schema() -> Result<String> {
    let schema = schemars::schema_for!(SolutionSnapshot);
    serde_json::to_string_pretty(&schema).map_err(Into::into)
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

pub fn serialize_json_pretty<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).map_err(Into::into)
}
