//! Entities and the caller-supplied slice that carries them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{EntityUid, Value};

/// An entity: its uid, its attributes and its direct parents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    uid: EntityUid,
    #[serde(default)]
    attrs: BTreeMap<String, Value>,
    #[serde(default)]
    parents: BTreeSet<EntityUid>,
}

impl Entity {
    pub fn new(
        uid: EntityUid,
        attrs: BTreeMap<String, Value>,
        parents: BTreeSet<EntityUid>,
    ) -> Self {
        Self {
            uid,
            attrs,
            parents,
        }
    }

    /// An entity with no attributes and no parents.
    pub fn with_uid(uid: EntityUid) -> Self {
        Self::new(uid, BTreeMap::new(), BTreeSet::new())
    }

    /// Add one attribute and return the updated entity.
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    /// Add one parent and return the updated entity.
    pub fn with_parent(mut self, parent: EntityUid) -> Self {
        self.parents.insert(parent);
        self
    }

    pub fn uid(&self) -> &EntityUid {
        &self.uid
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    pub fn attrs(&self) -> &BTreeMap<String, Value> {
        &self.attrs
    }

    pub fn parents(&self) -> &BTreeSet<EntityUid> {
        &self.parents
    }
}

/// The entities a caller supplies for one call. The slice is a claim about
/// what is relevant, not a guarantee of completeness.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slice(Vec<Entity>);

impl Slice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one entity and return the updated slice.
    pub fn with_entity(mut self, entity: Entity) -> Self {
        self.0.push(entity);
        self
    }

    pub fn push(&mut self, entity: Entity) {
        self.0.push(entity);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.0.iter()
    }
}

impl From<Vec<Entity>> for Slice {
    fn from(entities: Vec<Entity>) -> Self {
        Self(entities)
    }
}

impl FromIterator<Entity> for Slice {
    fn from_iter<I: IntoIterator<Item = Entity>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Slice {
    type Item = Entity;
    type IntoIter = std::vec::IntoIter<Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Slice {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
