//! Ready-made merge functions.
//!
//! All merges take the ancestor as a [`Promise`] and the two sides by
//! reference, and agree on the trivial cases: equal sides merge to
//! themselves without forcing the ancestor.

use std::fmt::Debug;

use crate::error::{Conflict, MergeResult};
use crate::promise::Promise;

/// Merge that only accepts equal values.
pub fn idempotent<T: Clone + PartialEq + Debug>(
    _old: &Promise<'_, T>,
    a: &T,
    b: &T,
) -> MergeResult<T> {
    if a == b {
        Ok(a.clone())
    } else {
        Err(Conflict::new(format!("{a:?} and {b:?} differ")))
    }
}

/// Classic three-way merge: a side that still equals the ancestor yields to
/// the side that changed. Conflicts when both sides changed differently or
/// there is no ancestor.
pub fn three_way<T: Clone + PartialEq + Debug>(
    old: &Promise<'_, T>,
    a: &T,
    b: &T,
) -> MergeResult<T> {
    if a == b {
        return Ok(a.clone());
    }
    match old.force()? {
        Some(o) if o == *a => Ok(b.clone()),
        Some(o) if o == *b => Ok(a.clone()),
        _ => Err(Conflict::new(format!("{a:?} and {b:?} both changed"))),
    }
}

/// Merge for integer counters: both sides' increments are kept.
///
/// Without an ancestor the counters are assumed to have started at zero.
pub fn counter(old: &Promise<'_, i64>, a: &i64, b: &i64) -> MergeResult<i64> {
    if a == b {
        return Ok(*a);
    }
    let base = old.force()?.unwrap_or(0);
    Ok(a.wrapping_add(*b).wrapping_sub(base))
}

/// Lift a merge on `T` to optional values, where `None` means absent.
///
/// When one side removed a value the other left untouched, the removal wins;
/// when one side added a value the ancestor lacked, the addition wins. A
/// removal racing a modification conflicts. Two present values are handed to
/// `merge` with the same ancestor promise.
pub fn merge_option<T, F>(
    old: &Promise<'_, T>,
    a: Option<&T>,
    b: Option<&T>,
    merge: F,
) -> MergeResult<Option<T>>
where
    T: Clone + PartialEq + Debug,
    F: FnOnce(&Promise<'_, T>, &T, &T) -> MergeResult<T>,
{
    match (a, b) {
        (None, None) => Ok(None),
        (Some(a), Some(b)) => merge(old, a, b).map(Some),
        (Some(x), None) | (None, Some(x)) => match old.force()? {
            None => Ok(Some(x.clone())),
            Some(o) if o == *x => Ok(None),
            Some(_) => Err(Conflict::new(format!(
                "{x:?} was changed on one side and removed on the other"
            ))),
        },
    }
}
