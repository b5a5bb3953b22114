// src/substrate/identity.rs

use std::fmt;

/// Identity shared by every lifetime of one lineage.
///
/// Child identities are `BatchChildWorkflow-<n>-<offset>`, where `<n>` is the
/// last `-`-separated segment of the lineage id. Offsets never repeat within a
/// lineage, so neither do child identities.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LineageId {
    id: String,
    suffix: String,
}

impl LineageId {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let suffix = id.rsplit('-').next().unwrap_or(&id).to_string();
        Self { id, suffix }
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn child_id(&self, offset: u64) -> String {
        format!("BatchChildWorkflow-{}-{}", self.suffix, offset)
    }
}

impl fmt::Display for LineageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}
