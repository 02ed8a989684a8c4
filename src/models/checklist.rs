use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::enums::{CriterionId, CriterionStatus, FactField};

/// One evaluated eligibility criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: CriterionId,
    pub description: String,
    pub status: CriterionStatus,
    pub evidence_keys: Vec<FactField>,
}

/// Eligibility checklist derived from a `FactRecord`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checklist {
    pub overall_status: CriterionStatus,
    pub criteria: Vec<Criterion>,
    pub missing_evidence: BTreeSet<FactField>,
    pub notes: String,
}

impl Checklist {
    pub fn criterion(&self, id: CriterionId) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.id == id)
    }
}
