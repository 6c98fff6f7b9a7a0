//! Operator Trait: the unit of change a transaction runs
//!
//! An operator declares which capabilities it exercises through
//! [`Characteristics`] and implements the matching callbacks. Callbacks whose
//! characteristic is not declared are never invoked; the engine treats them as
//! the identity.
use crate::error::OperatorError;
use crate::template::{Data, Position};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type OperatorResult<T> = Result<T, OperatorError>;

/// Capability tags an operator may declare.
///
/// New tags may be added; match with a wildcard arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum Characteristic {
    /// `create_pos` and `create_data_for_pos` are invoked.
    CreateData,
    /// `transform_data` is invoked.
    TransformData,
    /// `transform_pos` is invoked.
    TransformPosition,
}

impl Characteristic {
    const ALL: [Characteristic; 3] = [
        Characteristic::CreateData,
        Characteristic::TransformData,
        Characteristic::TransformPosition,
    ];

    const fn bit(self) -> u8 {
        match self {
            Characteristic::CreateData => 1,
            Characteristic::TransformData => 1 << 1,
            Characteristic::TransformPosition => 1 << 2,
        }
    }
}

/// Set of declared [`Characteristic`]s.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "Vec<Characteristic>", from = "Vec<Characteristic>")]
pub struct Characteristics {
    bits: u8,
}

impl Characteristics {
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    pub fn all() -> Self {
        Characteristic::ALL.into_iter().collect()
    }

    pub const fn with(self, characteristic: Characteristic) -> Self {
        Self {
            bits: self.bits | characteristic.bit(),
        }
    }

    pub const fn contains(self, characteristic: Characteristic) -> bool {
        self.bits & characteristic.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Characteristic> {
        Characteristic::ALL
            .into_iter()
            .filter(move |c| self.contains(*c))
    }
}

impl From<Characteristic> for Characteristics {
    fn from(characteristic: Characteristic) -> Self {
        Self::empty().with(characteristic)
    }
}

impl FromIterator<Characteristic> for Characteristics {
    fn from_iter<I: IntoIterator<Item = Characteristic>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl From<Vec<Characteristic>> for Characteristics {
    fn from(list: Vec<Characteristic>) -> Self {
        list.into_iter().collect()
    }
}

impl From<Characteristics> for Vec<Characteristic> {
    fn from(set: Characteristics) -> Self {
        set.iter().collect()
    }
}

impl fmt::Debug for Characteristics {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Result of [`TransactionOperator::create_data_for_pos`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataCreation<D> {
    /// Store this data at the created position, replacing any existing data.
    Produce(D),
    /// Keep the data the position already carries. Only valid when the
    /// position has data; otherwise execution fails with a contract violation.
    KeepExisting,
}

/// Result of a transform callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transform<T> {
    Produce(T),
    Remove,
}

impl<T> Transform<T> {
    pub fn is_remove(&self) -> bool {
        matches!(self, Transform::Remove)
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Transform::Produce(value) => Some(value),
            Transform::Remove => None,
        }
    }
}

impl<T> From<Option<T>> for Transform<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Transform::Remove, Transform::Produce)
    }
}

/// Contract for every operator registered on a [`Transaction`](crate::Transaction).
///
/// Operators are shared (`Arc`) and invoked through `&self`; an operator that
/// keeps state across calls (a `create_pos` generator, for instance) owns its
/// own synchronization. Callbacks must not touch the transaction running them.
pub trait TransactionOperator<P: Position, D: Data>: Send + Sync {
    /// Label used in logs and errors.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Capabilities this operator exercises. Every declared capability is
    /// guaranteed to be invoked when there is input for it.
    fn characteristics(&self) -> Characteristics {
        Characteristics::empty()
    }

    /// Next position to create, or `None` once exhausted.
    ///
    /// Returning a position already in the template replaces its data with
    /// whatever [`create_data_for_pos`](Self::create_data_for_pos) produces.
    fn create_pos(&self) -> OperatorResult<Option<P>> {
        Ok(None)
    }

    /// Data for a position previously returned by `create_pos`.
    fn create_data_for_pos(&self, _pos: &P) -> OperatorResult<DataCreation<D>> {
        Err(OperatorError::Unsupported("create_data_for_pos"))
    }

    /// Transform one distinct data value. `Remove` drops the value and every
    /// position referencing it.
    fn transform_data(&self, data: &D) -> OperatorResult<Transform<D>> {
        Ok(Transform::Produce(data.clone()))
    }

    /// Transform one position; `data` is the already-transformed value stored
    /// there. `Remove` drops only this position.
    fn transform_pos(&self, pos: &P, _data: &D) -> OperatorResult<Transform<P>> {
        Ok(Transform::Produce(pos.clone()))
    }
}
