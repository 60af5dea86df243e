//! Memoized lazy values.

use std::cell::{Cell, OnceCell};
use std::fmt;

use crate::error::MergeResult;

type Thunk<'a, T> = Box<dyn FnOnce() -> MergeResult<Option<T>> + 'a>;

/// A value computed at most once, on first [`Promise::force`].
///
/// Resolves to `Ok(None)` when there is no value (for a merge ancestor: the
/// two sides share no history, or the ancestor lacks the entry). Computing
/// the value may itself fail with a conflict, which is memoized too.
///
/// Promises are single-threaded; the thunk may borrow from the enclosing
/// merge for the promise's lifetime `'a`.
pub struct Promise<'a, T> {
    value: OnceCell<MergeResult<Option<T>>>,
    thunk: Cell<Option<Thunk<'a, T>>>,
}

impl<'a, T: Clone> Promise<'a, T> {
    /// An already-resolved promise.
    pub fn ready(value: Option<T>) -> Self {
        Self {
            value: OnceCell::from(Ok(value)),
            thunk: Cell::new(None),
        }
    }

    /// A promise with no value.
    pub fn none() -> Self {
        Self::ready(None)
    }

    /// A promise computed by `f` when first forced.
    pub fn lazy(f: impl FnOnce() -> MergeResult<Option<T>> + 'a) -> Self {
        Self {
            value: OnceCell::new(),
            thunk: Cell::new(Some(Box::new(f))),
        }
    }

    /// Resolve the promise, running the thunk if this is the first call.
    pub fn force(&self) -> MergeResult<Option<T>> {
        self.value
            .get_or_init(|| match self.thunk.take() {
                Some(f) => f(),
                None => Ok(None),
            })
            .clone()
    }

    /// Whether the value has been computed.
    pub fn is_forced(&self) -> bool {
        self.value.get().is_some()
    }

    /// A promise of `f` applied to this promise's value. Forces `self` lazily.
    pub fn map<'b, U, F>(&'b self, f: F) -> Promise<'b, U>
    where
        U: Clone,
        F: FnOnce(T) -> MergeResult<Option<U>> + 'b,
        'a: 'b,
    {
        Promise::lazy(move || match self.force()? {
            Some(v) => f(v),
            None => Ok(None),
        })
    }
}

impl<T: fmt::Debug> fmt::Debug for Promise<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value.get() {
            Some(v) => f.debug_tuple("Promise").field(v).finish(),
            None => f.write_str("Promise(<lazy>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Conflict;

    #[test]
    fn lazy_runs_once() {
        let calls = Cell::new(0);
        let p = Promise::lazy(|| {
            calls.set(calls.get() + 1);
            Ok(Some(7))
        });
        assert!(!p.is_forced());
        assert_eq!(p.force(), Ok(Some(7)));
        assert_eq!(p.force(), Ok(Some(7)));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn unforced_thunk_never_runs() {
        let calls = Cell::new(0);
        {
            let _p: Promise<'_, u8> = Promise::lazy(|| {
                calls.set(1);
                Ok(None)
            });
        }
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn conflicts_are_memoized() {
        let p: Promise<'_, u8> = Promise::lazy(|| Err(Conflict::new("no ancestor")));
        assert_eq!(p.force(), Err(Conflict::new("no ancestor")));
        assert_eq!(p.force(), Err(Conflict::new("no ancestor")));
    }

    #[test]
    fn map_is_lazy() {
        let base = Promise::ready(Some(2));
        let doubled = base.map(|v| Ok(Some(v * 2)));
        assert!(!doubled.is_forced());
        assert_eq!(doubled.force(), Ok(Some(4)));
        let empty: Promise<'_, i32> = Promise::none();
        assert_eq!(empty.map(|v| Ok(Some(v + 1))).force(), Ok(None));
    }
}
