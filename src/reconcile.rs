// src/reconcile.rs

use crate::classify::{DocumentRole, RoleSet};
use crate::fields::{DocumentDetails, Field, FieldValue};
use crate::normalize::normalize;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-field verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// All three documents carry the same value.
    Success,
    /// The documents that carry a value agree, at least one has none.
    Partial,
    /// No document carries a value.
    Warning,
    /// Documents disagree.
    Error,
}

impl Status {
    /// Whether this verdict still allows the shipment to count as matched.
    pub fn is_full_match(self) -> bool {
        matches!(self, Status::Success | Status::Warning)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Success => "success",
            Status::Partial => "partial",
            Status::Warning => "warning",
            Status::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonRecord {
    pub field: String,
    pub field_key: Field,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_value: Option<FieldValue>,
    pub values: RoleSet<Option<FieldValue>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reconciliation {
    pub all_match: bool,
    pub comparisons: Vec<ComparisonRecord>,
}

impl Reconciliation {
    /// One "<label> <status>" note per field that is not a clean match.
    pub fn issues(&self) -> Vec<String> {
        self.comparisons
            .iter()
            .filter(|c| c.status != Status::Success)
            .map(|c| format!("{} {}", c.field, c.status))
            .collect()
    }
}

/// Compare the three documents field by field. A missing document counts as
/// a document with every value null.
pub fn compare(
    details_a: Option<&DocumentDetails>,
    details_b: Option<&DocumentDetails>,
    details_c: Option<&DocumentDetails>,
) -> Reconciliation {
    let docs = RoleSet::new(details_a, details_b, details_c);
    let comparisons: Vec<ComparisonRecord> = Field::ALL
        .iter()
        .map(|&field| compare_field(field, &docs))
        .collect();
    let all_match = comparisons.iter().all(|c| c.status.is_full_match());

    Reconciliation {
        all_match,
        comparisons,
    }
}

pub fn compare_roles(docs: &RoleSet<Option<DocumentDetails>>) -> Reconciliation {
    compare(docs.doc_a.as_ref(), docs.doc_b.as_ref(), docs.doc_c.as_ref())
}

fn compare_field(field: Field, docs: &RoleSet<Option<&DocumentDetails>>) -> ComparisonRecord {
    // blank text counts as null, in the echoed values too
    let values: RoleSet<Option<FieldValue>> = docs.clone().map(|_, d| {
        d.and_then(|d| d.value(field))
            .filter(|v| normalize(Some(*v)).is_some())
            .cloned()
    });

    let present: Vec<(&FieldValue, String)> = values
        .iter()
        .filter_map(|(_, v)| {
            let v = v.as_ref()?;
            Some((v, normalize(Some(v))?))
        })
        .collect();

    let mut record = ComparisonRecord {
        field: field.label().to_string(),
        field_key: field,
        status: Status::Warning,
        message: None,
        matched_value: None,
        values: RoleSet::default(),
    };

    let Some((first, first_key)) = present.first() else {
        record.message = Some("No values found in any document".to_string());
        return record;
    };

    if present.iter().all(|(_, key)| key == first_key) {
        let missing: Vec<String> = DocumentRole::ALL
            .iter()
            .filter(|&&r| !present_in(&values, r))
            .map(|r| r.letter().to_string())
            .collect();

        record.matched_value = Some((*first).clone());
        if missing.is_empty() {
            record.status = Status::Success;
        } else {
            record.status = Status::Partial;
            record.message = Some(format!("Match (Doc {} missing)", missing.join(", ")));
        }
    } else {
        record.status = Status::Error;
    }

    record.values = values;
    record
}

fn present_in(values: &RoleSet<Option<FieldValue>>, role: DocumentRole) -> bool {
    normalize(values.get(role).as_ref()).is_some()
}
