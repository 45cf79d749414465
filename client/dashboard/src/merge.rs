//! # Merge
//!
//! Folding single records into ordered collections.
//!
//! A collection holds at most one record per id, newest `createdAt` first,
//! ties broken by the larger id. Records without a timestamp sink to the end.
//!
//! Updating a record that is already present keeps its slot so a live view
//! does not jump around. Only inserts re-sort.
use std::cmp::Ordering;

use models::Entity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Merged {
    Inserted,
    Updated,
}

/// Newest first, then larger id first.
pub fn newest_first<T: Entity>(a: &T, b: &T) -> Ordering {
    b.created_at()
        .cmp(&a.created_at())
        .then_with(|| b.id().cmp(&a.id()))
}

pub fn sort_newest_first<T: Entity>(list: &mut [T]) {
    list.sort_by(newest_first);
}

pub fn upsert<T: Entity>(list: &mut Vec<T>, incoming: T) -> Merged {
    if let Some(slot) = list.iter_mut().find(|item| item.id() == incoming.id()) {
        *slot = incoming;
        return Merged::Updated;
    }

    list.insert(0, incoming);
    sort_newest_first(list);

    Merged::Inserted
}

/// Updates an existing record unconditionally, inserts only when `admits` holds.
pub fn upsert_if<T, F>(list: &mut Vec<T>, incoming: T, admits: F) -> Option<Merged>
where
    T: Entity,
    F: FnOnce(&T) -> bool,
{
    let present = list.iter().any(|item| item.id() == incoming.id());

    if present || admits(&incoming) {
        Some(upsert(list, incoming))
    } else {
        None
    }
}

/// Returns whether anything was removed.
pub fn evict<T: Entity>(list: &mut Vec<T>, id: i64) -> bool {
    let before = list.len();
    list.retain(|item| item.id() != id);

    list.len() != before
}

pub fn merge<T: Entity + Clone>(existing: &[T], incoming: T) -> Vec<T> {
    let mut list = existing.to_vec();
    upsert(&mut list, incoming);

    list
}

pub fn merge_filtered<T, F>(existing: &[T], incoming: T, admits: F) -> Vec<T>
where
    T: Entity + Clone,
    F: FnOnce(&T) -> bool,
{
    let mut list = existing.to_vec();
    upsert_if(&mut list, incoming, admits);

    list
}

pub fn remove<T: Entity + Clone>(existing: &[T], id: i64) -> Vec<T> {
    let mut list = existing.to_vec();
    evict(&mut list, id);

    list
}
