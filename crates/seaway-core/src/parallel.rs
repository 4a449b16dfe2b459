//! Rayon or sequential execution behind one API.
//!
//! With the `threading` feature this re-exports rayon's parallel iterators.
//! Without it, `into_par_iter()` falls back to `into_iter()`, so the rest of
//! the chain resolves to standard `Iterator` methods with the same ordering.

#[cfg(feature = "threading")]
pub use rayon::prelude::*;

#[cfg(not(feature = "threading"))]
mod sequential {
    pub trait IntoParallelIterator {
        type Iter;
        type Item;
        fn into_par_iter(self) -> Self::Iter;
    }

    impl<I: IntoIterator> IntoParallelIterator for I {
        type Iter = I::IntoIter;
        type Item = I::Item;
        fn into_par_iter(self) -> Self::Iter {
            self.into_iter()
        }
    }
}

#[cfg(not(feature = "threading"))]
pub use sequential::*;

/// Number of workers searches will be spread across.
pub fn worker_count() -> usize {
    #[cfg(feature = "threading")]
    {
        rayon::current_num_threads()
    }
    #[cfg(not(feature = "threading"))]
    {
        1
    }
}
