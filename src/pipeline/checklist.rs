//! Eligibility checklist for lumbar spine MRI prior authorization.
//!
//! Deterministic and independent of the extractor that produced the facts.
//! Red flags are an absolute exception to the conservative-care requirement;
//! a missing conservative-care duration abstains (`UNKNOWN`) instead of
//! defaulting to denial.

use std::collections::BTreeSet;

use crate::config::CONSERVATIVE_CARE_THRESHOLD_WEEKS;
use crate::models::{Checklist, Criterion, CriterionId, CriterionStatus, FactField, FactRecord};

pub const CHECKLIST_NOTES: &str =
    "Draft checklist only; grounded in typical utilization management patterns. Not a clinical decision.";

pub fn build_checklist(facts: &FactRecord) -> Checklist {
    let red_flags = red_flag_criterion(facts);
    let conservative_care = conservative_care_criterion(facts);

    let overall_status = if facts.red_flags_present {
        CriterionStatus::Met
    } else {
        conservative_care.status
    };

    let mut missing_evidence: BTreeSet<FactField> = facts.missing_evidence.clone();
    if facts.conservative_care_weeks.is_none() {
        missing_evidence.insert(FactField::ConservativeCareWeeks);
    }
    if facts.symptoms_duration_weeks.is_none() {
        missing_evidence.insert(FactField::SymptomsDurationWeeks);
    }

    Checklist {
        overall_status,
        criteria: vec![red_flags, conservative_care],
        missing_evidence,
        notes: CHECKLIST_NOTES.to_string(),
    }
}

fn red_flag_criterion(facts: &FactRecord) -> Criterion {
    let present = facts.red_flags_present;
    Criterion {
        id: CriterionId::RedFlags,
        description: "Red-flag indication present (exception to conservative care requirement)."
            .to_string(),
        status: if present {
            CriterionStatus::Met
        } else {
            CriterionStatus::NotMet
        },
        evidence_keys: if present { vec![FactField::RedFlags] } else { vec![] },
    }
}

fn conservative_care_criterion(facts: &FactRecord) -> Criterion {
    let status = match facts.conservative_care_weeks {
        None => CriterionStatus::Unknown,
        Some(weeks) if weeks >= CONSERVATIVE_CARE_THRESHOLD_WEEKS => CriterionStatus::Met,
        Some(_) => CriterionStatus::NotMet,
    };
    Criterion {
        id: CriterionId::ConservativeCare,
        description: format!(
            "Conservative care duration meets typical threshold (>={CONSERVATIVE_CARE_THRESHOLD_WEEKS} weeks) when no red flags."
        ),
        status,
        evidence_keys: match facts.conservative_care_weeks {
            Some(_) => vec![FactField::ConservativeCareWeeks],
            None => vec![],
        },
    }
}
