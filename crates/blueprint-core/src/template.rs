//! Template: immutable Position -> Data mapping consumed and produced by transactions
use crate::error::SourceError;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::{self, Debug};
use std::hash::Hash;
use std::sync::Arc;

/// Opaque key into a template.
pub trait Position: Clone + Ord + Hash + Debug + Send + Sync + 'static {}

impl<T> Position for T where T: Clone + Ord + Hash + Debug + Send + Sync + 'static {}

/// Opaque value stored at one or more positions.
pub trait Data: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> Data for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// Immutable, cheaply clonable mapping from positions to data.
///
/// Iteration is in ascending position order. Cloning shares the underlying
/// storage; nothing in this crate mutates a template after construction.
pub struct Template<P, D> {
    entries: Arc<BTreeMap<P, D>>,
}

impl<P: Position, D: Data> Template<P, D> {
    /// Create an empty template
    pub fn new() -> Self {
        Self {
            entries: Arc::new(BTreeMap::new()),
        }
    }

    pub(crate) fn from_map(entries: BTreeMap<P, D>) -> Self {
        Self {
            entries: Arc::new(entries),
        }
    }

    pub fn get(&self, pos: &P) -> Option<&D> {
        self.entries.get(pos)
    }

    pub fn contains(&self, pos: &P) -> bool {
        self.entries.contains_key(pos)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&P, &D)> + '_ {
        self.entries.iter()
    }

    pub fn positions(&self) -> impl Iterator<Item = &P> + '_ {
        self.entries.keys()
    }

    /// Distinct data values, in order of first appearance.
    pub fn distinct_data(&self) -> Vec<&D> {
        let mut seen = HashSet::new();
        self.entries
            .values()
            .filter(|data| seen.insert(*data))
            .collect()
    }

    /// Positions grouped by the data they reference.
    pub fn group_by_data(&self) -> HashMap<&D, Vec<&P>> {
        let mut groups: HashMap<&D, Vec<&P>> = HashMap::new();
        for (pos, data) in self.entries.iter() {
            groups.entry(data).or_default().push(pos);
        }
        groups
    }

    /// True when both handles share the same storage.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }
}

impl<P, D> Clone for Template<P, D> {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

impl<P: Position, D: Data> Default for Template<P, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: Position, D: Data> FromIterator<(P, D)> for Template<P, D> {
    fn from_iter<I: IntoIterator<Item = (P, D)>>(iter: I) -> Self {
        Self::from_map(iter.into_iter().collect())
    }
}

impl<P: Position, D: Data> PartialEq for Template<P, D> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.entries == other.entries
    }
}

impl<P: Position, D: Data> Eq for Template<P, D> {}

impl<P: Debug, D: Debug> Debug for Template<P, D> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.entries.iter()).finish()
    }
}

/// Provider of the backing mapping a transaction reads from.
///
/// `entries` must iterate in a stable order; the engine relies on it for
/// deterministic collision handling. Implementations are read-only.
pub trait TemplateSource<P, D>: Send + Sync {
    fn entries(&self) -> Result<Box<dyn Iterator<Item = (&P, &D)> + '_>, SourceError>;

    fn lookup(&self, pos: &P) -> Result<Option<&D>, SourceError>;

    /// A template handle for this source, if one exists without copying.
    fn snapshot(&self) -> Option<Template<P, D>> {
        None
    }
}

impl<P: Position, D: Data> TemplateSource<P, D> for Template<P, D> {
    fn entries(&self) -> Result<Box<dyn Iterator<Item = (&P, &D)> + '_>, SourceError> {
        Ok(Box::new(self.entries.iter()))
    }

    fn lookup(&self, pos: &P) -> Result<Option<&D>, SourceError> {
        Ok(self.entries.get(pos))
    }

    fn snapshot(&self) -> Option<Template<P, D>> {
        Some(self.clone())
    }
}
