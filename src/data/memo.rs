//! Identity-keyed memoization for derived views.
//!
//! Fetched collections are immutable and shared as `Arc`s, so "did the source
//! change" is answered by pointer identity rather than by comparing contents.

use std::sync::Arc;

/// Caches one derived value for one source collection plus its parameters.
#[derive(Debug)]
pub struct Memo<S: ?Sized, P, T> {
    source: Option<Arc<S>>,
    params: Option<P>,
    value: Option<T>,
    recomputes: usize,
}

impl<S: ?Sized, P, T> Default for Memo<S, P, T> {
    fn default() -> Self {
        Self {
            source: None,
            params: None,
            value: None,
            recomputes: 0,
        }
    }
}

impl<S: ?Sized, P: PartialEq + Clone, T> Memo<S, P, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value, recomputing it with `compute` only when `source`
    /// is a different allocation or `params` differ from the last call.
    pub fn get_or_compute<F>(&mut self, source: &Arc<S>, params: &P, compute: F) -> &T
    where
        F: FnOnce(&S, &P) -> T,
    {
        let fresh = match (self.source.as_ref(), self.params.as_ref()) {
            (Some(prev), Some(prev_params)) => Arc::ptr_eq(prev, source) && prev_params == params,
            _ => false,
        };
        if !fresh {
            self.value = None;
        }
        if self.value.is_none() {
            self.source = Some(Arc::clone(source));
            self.params = Some(params.clone());
            self.recomputes += 1;
        }
        self.value
            .get_or_insert_with(|| compute(source.as_ref(), params))
    }

    /// How many times the value has been (re)computed.
    pub fn recomputes(&self) -> usize {
        self.recomputes
    }

    pub fn invalidate(&mut self) {
        self.source = None;
        self.params = None;
        self.value = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recomputes_only_on_identity_or_param_change() {
        let mut memo: Memo<Vec<i32>, u8, i32> = Memo::new();
        let a = Arc::new(vec![1, 2, 3]);
        let same_contents = Arc::new(vec![1, 2, 3]);

        assert_eq!(*memo.get_or_compute(&a, &0, |v, _| v.iter().sum()), 6);
        assert_eq!(*memo.get_or_compute(&a, &0, |_, _| panic!("should be cached")), 6);
        assert_eq!(memo.recomputes(), 1);

        memo.get_or_compute(&same_contents, &0, |v, _| v.iter().sum());
        assert_eq!(memo.recomputes(), 2);

        memo.get_or_compute(&same_contents, &1, |v, p| v.len() as i32 + *p as i32);
        assert_eq!(memo.recomputes(), 3);
    }
}
