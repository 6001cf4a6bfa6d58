//! Query results tagged with the generation they were answered from.

use crate::snapshot::Generation;

/// How a query was answered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryStatus {
    /// The region has no published generation yet. Not the same as an
    /// empty answer.
    NoData,
    /// The query ran to completion.
    Complete,
    /// A caller predicate failed; the value holds what was gathered before.
    Aborted,
}

/// A query answer plus the generation it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct QueryResult<T> {
    value: T,
    generation: Generation,
    status: QueryStatus,
}

impl<T> QueryResult<T> {
    /// A completed answer from `generation`.
    #[must_use]
    pub const fn complete(value: T, generation: Generation) -> Self {
        Self {
            value,
            generation,
            status: QueryStatus::Complete,
        }
    }

    /// A partial answer from `generation`, cut short by a predicate failure.
    #[must_use]
    pub const fn aborted(value: T, generation: Generation) -> Self {
        Self {
            value,
            generation,
            status: QueryStatus::Aborted,
        }
    }

    /// The answered value.
    #[inline]
    #[must_use]
    pub const fn value(&self) -> &T {
        &self.value
    }

    /// Consumes the result, keeping only the value.
    #[inline]
    #[must_use]
    pub fn into_value(self) -> T {
        self.value
    }

    /// Generation the answer was computed against.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// How the query ended.
    #[inline]
    #[must_use]
    pub const fn status(&self) -> QueryStatus {
        self.status
    }

    /// Returns false if the region had nothing published.
    #[inline]
    #[must_use]
    pub fn has_data(&self) -> bool {
        self.status != QueryStatus::NoData
    }

    /// Returns true if the query ran to completion.
    #[inline]
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.status == QueryStatus::Complete
    }
}

impl<T: Default> QueryResult<T> {
    /// An empty answer for a region with nothing published.
    #[must_use]
    pub fn no_data() -> Self {
        Self {
            value: T::default(),
            generation: Generation::EMPTY,
            status: QueryStatus::NoData,
        }
    }
}
