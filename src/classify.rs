// src/classify.rs

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::debug;

/// The three document slots of a shipment check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentRole {
    /// Bill of Lading
    DocA,
    /// Invoice
    DocB,
    /// Packing List
    DocC,
}

impl DocumentRole {
    pub const ALL: [DocumentRole; 3] = [DocumentRole::DocA, DocumentRole::DocB, DocumentRole::DocC];

    pub fn key(self) -> &'static str {
        match self {
            DocumentRole::DocA => "doc_a",
            DocumentRole::DocB => "doc_b",
            DocumentRole::DocC => "doc_c",
        }
    }

    /// Short letter used in comparison messages.
    pub fn letter(self) -> char {
        match self {
            DocumentRole::DocA => 'A',
            DocumentRole::DocB => 'B',
            DocumentRole::DocC => 'C',
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            DocumentRole::DocA => "Bill of Lading",
            DocumentRole::DocB => "Invoice",
            DocumentRole::DocC => "Packing List",
        }
    }
}

impl fmt::Display for DocumentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One value per document slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoleSet<T> {
    #[serde(default)]
    pub doc_a: T,
    #[serde(default)]
    pub doc_b: T,
    #[serde(default)]
    pub doc_c: T,
}

impl<T> RoleSet<T> {
    pub fn new(doc_a: T, doc_b: T, doc_c: T) -> Self {
        Self { doc_a, doc_b, doc_c }
    }

    pub fn get(&self, role: DocumentRole) -> &T {
        match role {
            DocumentRole::DocA => &self.doc_a,
            DocumentRole::DocB => &self.doc_b,
            DocumentRole::DocC => &self.doc_c,
        }
    }

    pub fn get_mut(&mut self, role: DocumentRole) -> &mut T {
        match role {
            DocumentRole::DocA => &mut self.doc_a,
            DocumentRole::DocB => &mut self.doc_b,
            DocumentRole::DocC => &mut self.doc_c,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (DocumentRole, &T)> {
        DocumentRole::ALL.into_iter().map(move |r| (r, self.get(r)))
    }

    pub fn map<U>(self, mut f: impl FnMut(DocumentRole, T) -> U) -> RoleSet<U> {
        RoleSet {
            doc_a: f(DocumentRole::DocA, self.doc_a),
            doc_b: f(DocumentRole::DocB, self.doc_b),
            doc_c: f(DocumentRole::DocC, self.doc_c),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Pattern {
    Suffix(&'static str),
    Prefix(&'static [&'static str]),
    Contains(&'static [&'static str]),
}

impl Pattern {
    fn matches(self, name: &str) -> bool {
        match self {
            Pattern::Suffix(s) => name.ends_with(s),
            Pattern::Prefix(ps) => ps.iter().any(|p| name.starts_with(p)),
            Pattern::Contains(ps) => ps.iter().any(|p| name.contains(p)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Rule {
    pattern: Pattern,
    role: DocumentRole,
}

/// Evaluated top to bottom, first match wins.
const RULES: &[Rule] = &[
    Rule {
        pattern: Pattern::Suffix("inv.pdf"),
        role: DocumentRole::DocB,
    },
    Rule {
        pattern: Pattern::Prefix(&["invoice", "inv", "in ", "td inv"]),
        role: DocumentRole::DocB,
    },
    Rule {
        pattern: Pattern::Prefix(&["obl", "bl"]),
        role: DocumentRole::DocA,
    },
    Rule {
        pattern: Pattern::Prefix(&["pl", "plist", "packing", "pack"]),
        role: DocumentRole::DocC,
    },
    Rule {
        pattern: Pattern::Contains(&["inv", "invoice"]),
        role: DocumentRole::DocB,
    },
    Rule {
        pattern: Pattern::Contains(&["bl", "obl"]),
        role: DocumentRole::DocA,
    },
    Rule {
        pattern: Pattern::Contains(&["pl", "plist", "packing"]),
        role: DocumentRole::DocC,
    },
];

/// Final path component; archive entries may carry folders.
fn base_name(name: &str) -> &str {
    name.rsplit(['/', '\\']).next().unwrap_or(name)
}

/// Role suggested by the filename alone.
pub fn detect_role(filename: &str) -> Option<DocumentRole> {
    let name = base_name(filename).to_lowercase();
    RULES
        .iter()
        .find(|rule| rule.pattern.matches(&name))
        .map(|rule| rule.role)
}

/// Filenames assigned to document slots. `unused` keeps the files that did
/// not get a slot, in input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Classification {
    #[serde(flatten)]
    pub roles: RoleSet<Option<String>>,
    pub unused: Vec<String>,
}

impl Classification {
    pub fn assigned(&self) -> usize {
        self.roles.iter().filter(|(_, n)| n.is_some()).count()
    }
}

/// Assign input positions to the three document slots.
///
/// Each file goes to the slot its name points at unless that slot is taken.
/// Taken-slot and unrecognised files queue up in input order and fill the
/// remaining empty slots from the front. Returns the slots and the positions
/// left over, so callers holding duplicate names still get the right file.
pub fn assign_slots<S: AsRef<str>>(filenames: &[S]) -> (RoleSet<Option<usize>>, Vec<usize>) {
    let mut slots: RoleSet<Option<usize>> = RoleSet::default();
    let mut overflow: VecDeque<usize> = VecDeque::new();

    for (i, name) in filenames.iter().map(AsRef::as_ref).enumerate() {
        match detect_role(name) {
            Some(role) if slots.get(role).is_none() => {
                debug!(filename = %name, role = %role, "Detected");
                *slots.get_mut(role) = Some(i);
            }
            detected => {
                debug!(filename = %name, detected = ?detected, "Queued for overflow");
                overflow.push_back(i);
            }
        }
    }

    for role in DocumentRole::ALL {
        if slots.get(role).is_some() {
            continue;
        }
        if let Some(i) = overflow.pop_front() {
            debug!(filename = %filenames[i].as_ref(), role = %role, "Filled from overflow");
            *slots.get_mut(role) = Some(i);
        }
    }

    (slots, overflow.into())
}

/// Assign filenames to the three document slots.
pub fn classify<S: AsRef<str>>(filenames: &[S]) -> Classification {
    let (slots, unused) = assign_slots(filenames);
    let name = |i: usize| filenames[i].as_ref().to_string();
    Classification {
        roles: slots.map(|_, i| i.map(name)),
        unused: unused.into_iter().map(name).collect(),
    }
}
