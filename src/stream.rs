//! Lazy enumeration helpers for the solution search.
//!
//! The search never materializes a cross product: [`lazy_product`]
//! drives a set of restartable iterator factories odometer-style, and
//! [`with_fallback`] expresses the "always yield at least one
//! candidate" guarantee without first draining the stream to see if it
//! was empty.

/// A factory producing a fresh iterator each time it is called. The
/// product restarts every column but the last, so columns must be
/// regenerable rather than one-shot.
pub type StreamFactory<'a, T> = Box<dyn Fn() -> Box<dyn Iterator<Item = T> + 'a> + 'a>;

/// Lazily yields the cartesian product of the factories' streams, in
/// odometer order (last column varies fastest). An empty factory list
/// yields one empty row; any empty column makes the product empty.
pub fn lazy_product<'a, T: Clone + 'a>(
    factories: Vec<StreamFactory<'a, T>>,
) -> impl Iterator<Item = Vec<T>> + 'a {
    LazyProduct {
        factories,
        columns: None,
        current: Vec::new(),
        done: false,
    }
}

struct LazyProduct<'a, T: Clone> {
    factories: Vec<StreamFactory<'a, T>>,
    columns: Option<Vec<Box<dyn Iterator<Item = T> + 'a>>>,
    current: Vec<T>,
    done: bool,
}

impl<'a, T: Clone> LazyProduct<'a, T> {
    fn start(&mut self) -> Option<Vec<T>> {
        let mut columns = Vec::with_capacity(self.factories.len());
        let mut current = Vec::with_capacity(self.factories.len());

        for factory in &self.factories {
            let mut column = factory();
            match column.next() {
                Some(first) => current.push(first),
                None => return None,
            }
            columns.push(column);
        }

        self.columns = Some(columns);
        self.current = current;
        Some(self.current.clone())
    }

    fn advance(&mut self) -> Option<Vec<T>> {
        let columns = self.columns.as_mut()?;

        for idx in (0..columns.len()).rev() {
            if let Some(next) = columns[idx].next() {
                self.current[idx] = next;
                return Some(self.current.clone());
            }

            // this column is exhausted; restart it and carry left
            let mut fresh = self.factories[idx]();
            let first = fresh.next()?;
            columns[idx] = fresh;
            self.current[idx] = first;
        }

        None
    }
}

impl<'a, T: Clone> Iterator for LazyProduct<'a, T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let row = match self.columns {
            None => self.start(),
            Some(_) => self.advance(),
        };

        if row.is_none() {
            self.done = true;
        }

        row
    }
}

/// Yields every item of `inner`; if `inner` turns out to be empty,
/// switches to the stream built by `fallback` instead. The fallback is
/// never constructed when `inner` produces anything.
pub fn or_else<'a, T: 'a, J: Iterator<Item = T> + 'a>(
    inner: impl Iterator<Item = T> + 'a,
    fallback: impl FnOnce() -> J + 'a,
) -> impl Iterator<Item = T> + 'a {
    OrElse {
        inner,
        fallback: Some(fallback),
        active: None,
        yielded_any: false,
    }
}

/// Yields every item of `inner`; if `inner` turns out to be empty,
/// yields the single fallback item instead.
pub fn with_fallback<'a, T: 'a>(
    inner: impl Iterator<Item = T> + 'a,
    fallback: impl FnOnce() -> T + 'a,
) -> impl Iterator<Item = T> + 'a {
    or_else(inner, move || std::iter::once(fallback()))
}

struct OrElse<I, F, J> {
    inner: I,
    fallback: Option<F>,
    active: Option<J>,
    yielded_any: bool,
}

impl<T, I, F, J> Iterator for OrElse<I, F, J>
where
    I: Iterator<Item = T>,
    J: Iterator<Item = T>,
    F: FnOnce() -> J,
{
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if let Some(active) = self.active.as_mut() {
            return active.next();
        }

        match self.inner.next() {
            Some(item) => {
                self.yielded_any = true;
                self.fallback = None;
                Some(item)
            }
            None if !self.yielded_any => {
                let fallback = self.fallback.take()?;
                self.active = Some(fallback());
                self.active.as_mut().and_then(Iterator::next)
            }
            None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column<'a>(items: Vec<i32>) -> StreamFactory<'a, i32> {
        Box::new(move || Box::new(items.clone().into_iter()))
    }

    #[test]
    fn test_product_of_two_columns() {
        let rows: Vec<Vec<i32>> =
            lazy_product(vec![column(vec![1, 2]), column(vec![10, 20, 30])]).collect();
        assert_eq!(
            rows,
            vec![
                vec![1, 10],
                vec![1, 20],
                vec![1, 30],
                vec![2, 10],
                vec![2, 20],
                vec![2, 30],
            ]
        );
    }

    #[test]
    fn test_product_of_no_columns_yields_one_empty_row() {
        let rows: Vec<Vec<i32>> = lazy_product(vec![]).collect();
        assert_eq!(rows, vec![Vec::<i32>::new()]);
    }

    #[test]
    fn test_product_with_empty_column_is_empty() {
        let rows: Vec<Vec<i32>> = lazy_product(vec![column(vec![1]), column(vec![])]).collect();
        assert!(rows.is_empty());
    }

    #[test]
    fn test_product_is_lazy() {
        use std::cell::Cell;
        use std::rc::Rc;

        let pulls = Rc::new(Cell::new(0));
        let pulls_inner = Rc::clone(&pulls);

        let counting: StreamFactory<'_, i32> = Box::new(move || {
            let pulls = Rc::clone(&pulls_inner);
            Box::new((0..100).inspect(move |_| pulls.set(pulls.get() + 1)))
        });

        let mut product = lazy_product(vec![column(vec![1, 2]), counting]);
        product.next();
        product.next();
        assert_eq!(pulls.get(), 2, "only as many inner pulls as rows requested");
    }

    #[test]
    fn test_fallback_kicks_in_for_empty_stream() {
        let items: Vec<i32> = with_fallback(std::iter::empty(), || 42).collect();
        assert_eq!(items, vec![42]);
    }

    #[test]
    fn test_fallback_unused_for_nonempty_stream() {
        let items: Vec<i32> = with_fallback(vec![1, 2].into_iter(), || 42).collect();
        assert_eq!(items, vec![1, 2]);
    }

    #[test]
    fn test_or_else_chains_whole_streams() {
        let items: Vec<i32> = or_else(std::iter::empty(), || vec![7, 8].into_iter()).collect();
        assert_eq!(items, vec![7, 8]);
    }

    #[test]
    fn test_or_else_never_builds_unused_fallback() {
        use std::cell::Cell;

        let built = Cell::new(false);
        let items: Vec<i32> = or_else(vec![1].into_iter(), || {
            built.set(true);
            vec![7].into_iter()
        })
        .collect();
        assert_eq!(items, vec![1]);
        assert!(!built.get());
    }
}
