//! The internal `cn=changelog` subtree (§4.10.2): a monotonically numbered record of
//! every write operation, capped at a configured size with oldest-first eviction.

use std::collections::VecDeque;

use crate::dn::Dn;
use crate::entry::{Entry, Modification};
use crate::search::SearchEntry;

/// The DN suffix every change-log entry lives under.
pub fn changelog_dn() -> Dn {
    Dn::parse("cn=changelog").expect("static DN")
}

/// One kind of recorded write, carrying enough detail to reconstruct the operation
/// (and, for deletes, the attributes of the entry that no longer exists).
#[derive(Clone, Debug)]
pub enum ChangeType {
    Add { attrs: Vec<(String, Vec<Vec<u8>>)> },
    Delete { deleted_entry_attrs: Vec<(String, Vec<Vec<u8>>)> },
    Modify { mods: Vec<Modification> },
    ModDn { new_rdn: String, delete_old_rdn: bool, new_superior: Option<String> },
}

/// One numbered change-log record.
#[derive(Clone, Debug)]
pub struct ChangeLogEntry {
    pub change_number: i64,
    pub target_dn: Dn,
    pub change_type: ChangeType,
}

impl ChangeLogEntry {
    /// Render this record as the synthetic entry it would appear as under
    /// `changeNumber=N,cn=changelog` in a Search.
    pub fn to_search_entry(&self) -> SearchEntry {
        let dn = Dn(std::iter::once(
            crate::dn::Rdn(vec![crate::dn::Ava { attr: "changeNumber".to_owned(), value: self.change_number.to_string() }]),
        )
        .chain(changelog_dn().0)
        .collect());
        let (change_type_str, mut attrs): (&str, Vec<(String, Vec<Vec<u8>>)>) = match &self.change_type {
            ChangeType::Add { attrs } => ("add", attrs.clone()),
            ChangeType::Delete { deleted_entry_attrs } => ("delete", deleted_entry_attrs.clone()),
            ChangeType::Modify { mods } => {
                ("modify", vec![("changes".to_owned(), vec![crate::ldif::write_change_record(&crate::ldif::ChangeRecord::Modify {
                    dn: self.target_dn.clone(),
                    mods: mods.clone(),
                })
                .into_bytes()])])
            }
            ChangeType::ModDn { new_rdn, delete_old_rdn, new_superior } => (
                "moddn",
                vec![
                    ("newRDN".to_owned(), vec![new_rdn.clone().into_bytes()]),
                    ("deleteOldRDN".to_owned(), vec![if *delete_old_rdn { b"TRUE".to_vec() } else { b"FALSE".to_vec() }]),
                ]
                .into_iter()
                .chain(new_superior.clone().map(|s| ("newSuperior".to_owned(), vec![s.into_bytes()])))
                .collect(),
            ),
        };
        let mut out = vec![
            ("objectClass".to_owned(), vec![b"top".to_vec(), b"changeLogEntry".to_vec()]),
            ("changeNumber".to_owned(), vec![self.change_number.to_string().into_bytes()]),
            ("targetDN".to_owned(), vec![self.target_dn.to_string().into_bytes()]),
            ("changeType".to_owned(), vec![change_type_str.as_bytes().to_vec()]),
        ];
        out.append(&mut attrs);
        SearchEntry { dn: dn.to_string(), attrs: out }
    }
}

/// A bounded, monotonically-numbered log of write operations. `first`/`last` satisfy
/// `first <= last` once any entry has been recorded, and the stored count never
/// exceeds `max_entries`; exceeding it evicts the oldest entry and advances `first`.
pub struct ChangeLog {
    entries: VecDeque<ChangeLogEntry>,
    next_number: i64,
    max_entries: usize,
}

impl ChangeLog {
    pub fn new(max_entries: usize) -> ChangeLog {
        ChangeLog { entries: VecDeque::new(), next_number: 1, max_entries }
    }

    pub fn enabled(&self) -> bool {
        self.max_entries > 0
    }

    /// Record one write, allocating the next change number and evicting the oldest
    /// record if the log is now over capacity.
    pub fn record(&mut self, target_dn: Dn, change_type: ChangeType) {
        if !self.enabled() {
            return;
        }
        let change_number = self.next_number;
        self.next_number += 1;
        self.entries.push_back(ChangeLogEntry { change_number, target_dn, change_type });
        while self.entries.len() > self.max_entries {
            self.entries.pop_front();
        }
    }

    pub fn first_change_number(&self) -> i64 {
        self.entries.front().map(|e| e.change_number).unwrap_or(0)
    }

    pub fn last_change_number(&self) -> i64 {
        self.entries.back().map(|e| e.change_number).unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChangeLogEntry> {
        self.entries.iter()
    }
}

/// Build the recorded change-log attribute snapshot for an Add (every user attribute
/// the new entry was created with).
pub fn add_attrs(entry: &Entry) -> Vec<(String, Vec<Vec<u8>>)> {
    entry.attributes().map(|(n, v)| (n.to_owned(), v.0.clone())).collect()
}
