// src/ingest/dedup.rs
use std::collections::HashSet;

use crate::ingest::normalize::fallback_key;
use crate::ingest::types::Item;

/// Identity across providers: subject plus the normalized native id, or a
/// content hash (author, text, minute) when the provider has no id.
pub fn dedup_key(item: &Item) -> String {
    match &item.source_id {
        Some(sid) => format!("{}\u{1f}id:{sid}", item.subject),
        None => format!(
            "{}\u{1f}h:{}",
            item.subject,
            fallback_key(&item.author, &item.text, item.timestamp)
        ),
    }
}

/// First-seen-wins within one cycle. Input order is the caller's provider
/// order, so the result is stable for identical inputs.
pub fn dedup_first_seen(items: Vec<Item>) -> (Vec<Item>, usize) {
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    let mut keep = Vec::with_capacity(items.len());
    let mut dropped = 0usize;

    for it in items {
        if seen.insert(dedup_key(&it)) {
            keep.push(it);
        } else {
            dropped += 1;
        }
    }

    (keep, dropped)
}
