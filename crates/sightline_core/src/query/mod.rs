//! # Query Surface
//!
//! Read-only queries. Each call runs against exactly one generation and
//! reports it. Queries never fail: an empty region answers
//! [`QueryStatus::NoData`], and a failing caller predicate ends the scan with
//! [`QueryStatus::Aborted`] plus whatever was gathered up to that point.
//!
//! Methods on [`SpatialGrid`] (and therefore on [`GridView`]) answer from
//! that grid. Methods on [`DoubleBufferedGrid`] answer from whatever
//! generation is published at the moment of the call.

mod filter;
mod result;

use std::fmt::Display;

pub use filter::{DispositionSet, EntityFilter, KindSet};
pub use result::{QueryResult, QueryStatus};

use crate::grid::SpatialGrid;
use crate::snapshot::{EntityId, EntitySnapshot, Position};
use crate::sync::{DoubleBufferedGrid, GridView};

impl SpatialGrid {
    /// Entities within `radius` of `origin` matching `filter`.
    ///
    /// A non-positive radius yields an empty, complete answer.
    #[must_use]
    pub fn find_in_radius(
        &self,
        origin: Position,
        radius: f32,
        filter: &EntityFilter,
    ) -> QueryResult<Vec<EntitySnapshot>> {
        self.find_in_radius_where(origin, radius, filter, |_| Ok::<bool, std::convert::Infallible>(true))
    }

    /// Like [`SpatialGrid::find_in_radius`], with an additional caller predicate.
    ///
    /// The predicate only sees entities that already passed the distance
    /// check and `filter`.
    pub fn find_in_radius_where<E, F>(
        &self,
        origin: Position,
        radius: f32,
        filter: &EntityFilter,
        mut predicate: F,
    ) -> QueryResult<Vec<EntitySnapshot>>
    where
        E: Display,
        F: FnMut(&EntitySnapshot) -> Result<bool, E>,
    {
        let mut found = Vec::new();
        let scan: Result<(), E> = self.visit_radius(origin, radius, |snapshot| {
            if filter.matches(snapshot) && predicate(snapshot)? {
                found.push(*snapshot);
            }
            Ok(())
        });

        match scan {
            Ok(()) => QueryResult::complete(found, self.generation()),
            Err(err) => {
                tracing::warn!(
                    region = self.region().raw(),
                    generation = self.generation().get(),
                    partial = found.len(),
                    error = %err,
                    "radius query predicate failed, returning partial results"
                );
                QueryResult::aborted(found, self.generation())
            }
        }
    }

    /// The closest entity within `max_radius` of `origin` matching `filter`.
    #[must_use]
    pub fn find_nearest(
        &self,
        origin: Position,
        filter: &EntityFilter,
        max_radius: f32,
    ) -> QueryResult<Option<EntitySnapshot>> {
        self.find_nearest_where(origin, filter, max_radius, |_| Ok::<bool, std::convert::Infallible>(true))
    }

    /// Like [`SpatialGrid::find_nearest`], with an additional caller predicate.
    pub fn find_nearest_where<E, F>(
        &self,
        origin: Position,
        filter: &EntityFilter,
        max_radius: f32,
        mut predicate: F,
    ) -> QueryResult<Option<EntitySnapshot>>
    where
        E: Display,
        F: FnMut(&EntitySnapshot) -> Result<bool, E>,
    {
        let outcome = self.nearest(origin, max_radius, |snapshot| {
            if filter.matches(snapshot) {
                predicate(snapshot)
            } else {
                Ok(false)
            }
        });
        let best = outcome.best.copied();

        match outcome.error {
            None => QueryResult::complete(best, self.generation()),
            Some(err) => {
                tracing::warn!(
                    region = self.region().raw(),
                    generation = self.generation().get(),
                    error = %err,
                    "nearest query predicate failed, returning best so far"
                );
                QueryResult::aborted(best, self.generation())
            }
        }
    }

    /// The snapshot of `id` in this generation.
    ///
    /// `None` means unknown, not dead: the entity may not have been captured
    /// yet, or may be gone.
    #[must_use]
    pub fn get_by_identity(&self, id: EntityId) -> QueryResult<Option<EntitySnapshot>> {
        QueryResult::complete(self.get(id).copied(), self.generation())
    }
}

impl DoubleBufferedGrid {
    /// [`SpatialGrid::find_in_radius`] against the published generation.
    #[must_use]
    pub fn find_in_radius(
        &self,
        origin: Position,
        radius: f32,
        filter: &EntityFilter,
    ) -> QueryResult<Vec<EntitySnapshot>> {
        self.active()
            .map_or_else(QueryResult::no_data, |view| view.find_in_radius(origin, radius, filter))
    }

    /// [`SpatialGrid::find_in_radius_where`] against the published generation.
    pub fn find_in_radius_where<E, F>(
        &self,
        origin: Position,
        radius: f32,
        filter: &EntityFilter,
        predicate: F,
    ) -> QueryResult<Vec<EntitySnapshot>>
    where
        E: Display,
        F: FnMut(&EntitySnapshot) -> Result<bool, E>,
    {
        match self.active() {
            Some(view) => view.find_in_radius_where(origin, radius, filter, predicate),
            None => QueryResult::no_data(),
        }
    }

    /// [`SpatialGrid::find_nearest`] against the published generation.
    #[must_use]
    pub fn find_nearest(
        &self,
        origin: Position,
        filter: &EntityFilter,
        max_radius: f32,
    ) -> QueryResult<Option<EntitySnapshot>> {
        self.active()
            .map_or_else(QueryResult::no_data, |view| view.find_nearest(origin, filter, max_radius))
    }

    /// [`SpatialGrid::find_nearest_where`] against the published generation.
    pub fn find_nearest_where<E, F>(
        &self,
        origin: Position,
        filter: &EntityFilter,
        max_radius: f32,
        predicate: F,
    ) -> QueryResult<Option<EntitySnapshot>>
    where
        E: Display,
        F: FnMut(&EntitySnapshot) -> Result<bool, E>,
    {
        match self.active() {
            Some(view) => view.find_nearest_where(origin, filter, max_radius, predicate),
            None => QueryResult::no_data(),
        }
    }

    /// [`SpatialGrid::get_by_identity`] against the published generation.
    #[must_use]
    pub fn get_by_identity(&self, id: EntityId) -> QueryResult<Option<EntitySnapshot>> {
        self.active()
            .map_or_else(QueryResult::no_data, |view| view.get_by_identity(id))
    }

    /// A handle for running several queries against one generation.
    #[must_use]
    pub fn snapshot(&self) -> Option<GridView> {
        self.active()
    }
}
