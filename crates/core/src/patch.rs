//! Non-destructive field merging.
//!
//! A field present in an update replaces the current value, an explicit empty
//! value clears it, and an absent field (`None`) leaves it untouched.

use std::collections::{BTreeMap, BTreeSet};

/// Values that have an explicit "empty" form meaning "clear this field".
pub trait Clearable {
    /// True when the value requests clearing.
    fn is_cleared(&self) -> bool;
}

impl Clearable for String {
    fn is_cleared(&self) -> bool {
        self.trim().is_empty()
    }
}

impl<T> Clearable for BTreeSet<T> {
    fn is_cleared(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> Clearable for BTreeMap<K, V> {
    fn is_cleared(&self) -> bool {
        self.is_empty()
    }
}

/// Merge a clearable optional field. Returns whether the field changed.
pub fn merge<T>(current: &mut Option<T>, update: Option<&T>) -> bool
where
    T: Clearable + PartialEq + Clone,
{
    let Some(update) = update else {
        return false;
    };
    let next = if update.is_cleared() {
        None
    } else {
        Some(update.clone())
    };
    assign(current, next)
}

/// Merge an optional field without clearing semantics.
pub fn replace<T>(current: &mut Option<T>, update: Option<&T>) -> bool
where
    T: PartialEq + Clone,
{
    match update {
        Some(update) => assign(current, Some(update.clone())),
        None => false,
    }
}

fn assign<T: PartialEq>(current: &mut Option<T>, next: Option<T>) -> bool {
    if *current == next {
        false
    } else {
        *current = next;
        true
    }
}
