//! # Dependency groups and failure aggregation shared by both runtimes.
//!
//! A service's dependencies are an ordered list of [`DependencyGroup`]s:
//!
//! ```text
//! dependencies() = [ Single(db), Concurrent([cache, queue]), Single(api) ]
//!
//! start:  db ──► { cache ∥ queue } ──► api ──► self
//! stop:   self ──► api ──► { cache ∥ queue } ──► db
//! ```
//!
//! Group boundaries are full barriers: nothing in group `i + 1` begins before every
//! member of group `i` has settled.

/// One level of a dependency list: a single service or a set started/stopped together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyGroup<H> {
    /// One dependency.
    Single(H),
    /// Dependencies started and stopped concurrently with each other.
    Concurrent(Vec<H>),
}

impl<H> DependencyGroup<H> {
    /// Group with one member.
    pub fn single(handle: H) -> Self {
        DependencyGroup::Single(handle)
    }

    /// Group whose members run concurrently.
    pub fn concurrent(handles: impl IntoIterator<Item = H>) -> Self {
        DependencyGroup::Concurrent(handles.into_iter().collect())
    }

    /// Members in declaration order.
    pub fn members(&self) -> &[H] {
        match self {
            DependencyGroup::Single(h) => std::slice::from_ref(h),
            DependencyGroup::Concurrent(hs) => hs,
        }
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members().len()
    }

    /// True for an empty concurrent group.
    pub fn is_empty(&self) -> bool {
        self.members().is_empty()
    }
}

/// Collects errors of a traversal that must not short-circuit.
///
/// The first error pushed becomes the primary one; the rest are suppressed.
#[derive(Debug, Default)]
pub(crate) struct Failures {
    first: Option<crate::LifecycleError>,
    rest: Vec<crate::LifecycleError>,
}

impl Failures {
    pub(crate) fn push(&mut self, err: crate::LifecycleError) {
        if self.first.is_none() {
            self.first = Some(err);
        } else {
            self.rest.push(err);
        }
    }

    pub(crate) fn push_result(&mut self, res: Result<(), crate::LifecycleError>) {
        if let Err(err) = res {
            self.push(err);
        }
    }

    pub(crate) fn into_result(self) -> Result<(), crate::LifecycleError> {
        match self.first {
            None => Ok(()),
            Some(first) => Err(first.with_suppressed(self.rest)),
        }
    }
}
