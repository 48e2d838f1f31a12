use std::collections::HashSet;

use super::types::ContentRecord;

/// Collapses records that repeat an earlier record's link or title.
///
/// Single left-to-right pass. A record is dropped when its trimmed link or
/// its trimmed title was already seen on a kept record; otherwise it is kept
/// and its non-empty trimmed link and title are remembered. Empty values never
/// cause a drop. Survivors keep their original relative order.
pub fn deduplicate(records: Vec<ContentRecord>) -> Vec<ContentRecord> {
    partition_duplicates(records).0
}

/// Same pass as [`deduplicate`], also returning the dropped records in the
/// order they were encountered.
pub fn partition_duplicates(
    records: Vec<ContentRecord>,
) -> (Vec<ContentRecord>, Vec<ContentRecord>) {
    let mut seen_links: HashSet<String> = HashSet::new();
    let mut seen_titles: HashSet<String> = HashSet::new();
    let mut kept = Vec::with_capacity(records.len());
    let mut dropped = Vec::new();

    for record in records {
        let link = record.link.trim();
        let title = record.title.trim();

        let is_duplicate = (!link.is_empty() && seen_links.contains(link))
            || (!title.is_empty() && seen_titles.contains(title));

        if is_duplicate {
            dropped.push(record);
            continue;
        }

        if !link.is_empty() {
            seen_links.insert(link.to_owned());
        }
        if !title.is_empty() {
            seen_titles.insert(title.to_owned());
        }
        kept.push(record);
    }

    (kept, dropped)
}
