//! The per-call entity index built from a slice.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::budget::StepBudget;
use crate::error::{AuthorizationError, EvaluationError};
use crate::types::{Entity, EntityUid, Slice, Value};

/// Result of an ancestry query over the slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ancestry {
    Descendant,
    NotDescendant,
    /// The ancestor was not reached and the walk ran into a cycle. The
    /// members are listed from the first repeated node back to itself.
    Cycle(Vec<EntityUid>),
}

impl Ancestry {
    pub fn is_descendant(&self) -> bool {
        matches!(self, Ancestry::Descendant)
    }
}

/// Read-only index over the entities of one call. Nothing is synthesized:
/// an entity missing from the slice is simply absent.
#[derive(Debug, Clone, Default)]
pub struct EntityStore {
    entities: HashMap<EntityUid, Entity>,
}

impl EntityStore {
    /// Index the slice, rejecting duplicate uids, self-parenting entities
    /// and slices above `max_entities`.
    pub fn from_entities(
        entities: impl IntoIterator<Item = Entity>,
        max_entities: usize,
    ) -> Result<Self, AuthorizationError> {
        let mut index = HashMap::new();
        for entity in entities {
            if index.len() >= max_entities {
                return Err(AuthorizationError::MalformedRequest(format!(
                    "slice holds more than {max_entities} entities"
                )));
            }
            if entity.parents().contains(entity.uid()) {
                return Err(AuthorizationError::MalformedRequest(format!(
                    "entity {} lists itself as a parent",
                    entity.uid()
                )));
            }
            if index.contains_key(entity.uid()) {
                return Err(AuthorizationError::MalformedRequest(format!(
                    "entity {} appears more than once in the slice",
                    entity.uid()
                )));
            }
            index.insert(entity.uid().clone(), entity);
        }
        debug!(event = "Request", phase = "Entities", count = index.len());
        Ok(Self { entities: index })
    }

    pub fn from_slice(slice: &Slice, max_entities: usize) -> Result<Self, AuthorizationError> {
        Self::from_entities(slice.iter().cloned(), max_entities)
    }

    pub fn lookup(&self, uid: &EntityUid) -> Option<&Entity> {
        self.entities.get(uid)
    }

    /// `None` when the entity is absent or lacks the attribute.
    pub fn attribute(&self, uid: &EntityUid, key: &str) -> Option<&Value> {
        self.lookup(uid).and_then(|entity| entity.attr(key))
    }

    pub fn contains(&self, uid: &EntityUid) -> bool {
        self.entities.contains_key(uid)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// The stored entities as a slice, ordered by uid.
    pub fn to_slice(&self) -> Slice {
        let mut entities: Vec<Entity> = self.entities.values().cloned().collect();
        entities.sort_by(|a, b| a.uid().cmp(b.uid()));
        Slice::from(entities)
    }

    /// Whether `ancestor` is reachable from `child` over parent edges.
    /// Equality is not descent.
    pub fn is_descendant_of(&self, child: &EntityUid, ancestor: &EntityUid) -> Ancestry {
        self.is_descendant_of_bounded(child, ancestor, &mut StepBudget::unlimited())
            .unwrap_or(Ancestry::NotDescendant)
    }

    /// Depth-first walk up the parent edges, charging one step per node.
    /// Parents that are named but absent from the slice count as reached
    /// but are not expanded further.
    pub fn is_descendant_of_bounded(
        &self,
        child: &EntityUid,
        ancestor: &EntityUid,
        budget: &mut StepBudget,
    ) -> Result<Ancestry, EvaluationError> {
        let Some(start) = self.entities.get(child) else {
            return Ok(Ancestry::NotDescendant);
        };
        budget.charge()?;

        let mut done: HashSet<&EntityUid> = HashSet::new();
        let mut on_path: HashSet<&EntityUid> = HashSet::from([start.uid()]);
        let mut path: Vec<&EntityUid> = vec![start.uid()];
        let mut frames = vec![start.parents().iter()];
        let mut cycle = None;

        while let Some(frame) = frames.last_mut() {
            match frame.next() {
                Some(parent) => {
                    if parent == ancestor {
                        return Ok(Ancestry::Descendant);
                    }
                    if on_path.contains(parent) {
                        if cycle.is_none() {
                            let from = path.iter().position(|uid| *uid == parent).unwrap_or(0);
                            let mut members: Vec<EntityUid> =
                                path[from..].iter().map(|uid| (*uid).clone()).collect();
                            members.push(parent.clone());
                            cycle = Some(members);
                        }
                        continue;
                    }
                    if done.contains(parent) {
                        continue;
                    }
                    budget.charge()?;
                    match self.entities.get(parent) {
                        Some(entity) => {
                            path.push(entity.uid());
                            on_path.insert(entity.uid());
                            frames.push(entity.parents().iter());
                        }
                        None => {
                            done.insert(parent);
                        }
                    }
                }
                None => {
                    frames.pop();
                    if let Some(uid) = path.pop() {
                        on_path.remove(uid);
                        done.insert(uid);
                    }
                }
            }
        }

        Ok(match cycle {
            Some(members) => Ancestry::Cycle(members),
            None => Ancestry::NotDescendant,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use proptest::prelude::*;
    use yare::parameterized;

    fn uid(s: &str) -> EntityUid {
        s.parse().unwrap()
    }

    fn entity(s: &str, parents: &[&str]) -> Entity {
        parents
            .iter()
            .fold(Entity::with_uid(uid(s)), |entity, parent| {
                entity.with_parent(uid(parent))
            })
    }

    fn store(entities: Vec<Entity>) -> EntityStore {
        EntityStore::from_entities(entities, 100).unwrap()
    }

    fn org_chart() -> EntityStore {
        store(vec![
            entity(r#"User::"alice""#, &[r#"Group::"devs""#]),
            entity(r#"Group::"devs""#, &[r#"Group::"staff""#]),
            entity(r#"Group::"staff""#, &[r#"Org::"acme""#]),
            entity(r#"User::"bob""#, &[r#"Group::"contractors""#]),
        ])
    }

    #[parameterized(
        direct = { r#"User::"alice""#, r#"Group::"devs""#, true },
        transitive = { r#"User::"alice""#, r#"Group::"staff""#, true },
        through_absent_leaf = { r#"User::"alice""#, r#"Org::"acme""#, true },
        absent_intermediate = { r#"User::"bob""#, r#"Group::"staff""#, false },
        named_absent_parent = { r#"User::"bob""#, r#"Group::"contractors""#, true },
        unrelated = { r#"Group::"devs""#, r#"User::"alice""#, false },
        equality_is_not_descent = { r#"User::"alice""#, r#"User::"alice""#, false },
        absent_child = { r#"User::"carol""#, r#"Group::"devs""#, false },
    )]
    fn test_is_descendant_of(child: &str, ancestor: &str, expected: bool) {
        assert_eq!(
            org_chart()
                .is_descendant_of(&uid(child), &uid(ancestor))
                .is_descendant(),
            expected
        );
    }

    #[test]
    fn test_cycle_is_reported_not_followed() {
        let store = store(vec![
            entity(r#"Group::"a""#, &[r#"Group::"b""#]),
            entity(r#"Group::"b""#, &[r#"Group::"c""#]),
            entity(r#"Group::"c""#, &[r#"Group::"a""#]),
        ]);
        let result = store.is_descendant_of(&uid(r#"Group::"a""#), &uid(r#"Group::"z""#));
        let Ancestry::Cycle(members) = result else {
            panic!("expected a cycle, got {result:?}");
        };
        assert_eq!(members.first(), members.last());
        assert_eq!(members.len(), 4);
    }

    #[test]
    fn test_cycle_does_not_hide_reachable_ancestor() {
        let store = store(vec![
            entity(r#"Group::"a""#, &[r#"Group::"b""#]),
            entity(r#"Group::"b""#, &[r#"Group::"a""#, r#"Group::"root""#]),
        ]);
        assert_eq!(
            store.is_descendant_of(&uid(r#"Group::"a""#), &uid(r#"Group::"root""#)),
            Ancestry::Descendant
        );
    }

    #[test]
    fn test_diamond_is_not_a_cycle() {
        let store = store(vec![
            entity(r#"User::"u""#, &[r#"Group::"left""#, r#"Group::"right""#]),
            entity(r#"Group::"left""#, &[r#"Group::"top""#]),
            entity(r#"Group::"right""#, &[r#"Group::"top""#]),
            entity(r#"Group::"top""#, &[]),
        ]);
        assert_eq!(
            store.is_descendant_of(&uid(r#"User::"u""#), &uid(r#"Group::"other""#)),
            Ancestry::NotDescendant
        );
    }

    #[test]
    fn test_bounded_walk_charges_budget() {
        let store = org_chart();
        let mut budget = StepBudget::new(2);
        let err = store
            .is_descendant_of_bounded(&uid(r#"User::"alice""#), &uid(r#"Org::"other""#), &mut budget)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::EvaluationBudgetExceeded);
    }

    #[parameterized(
        duplicate = { vec![entity(r#"User::"a""#, &[]), entity(r#"User::"a""#, &[])], "more than once" },
        self_parent = { vec![entity(r#"Group::"g""#, &[r#"Group::"g""#])], "itself as a parent" },
        oversized = { vec![entity(r#"User::"a""#, &[]), entity(r#"User::"b""#, &[]), entity(r#"User::"c""#, &[])], "more than 2 entities" },
    )]
    fn test_malformed_slices(entities: Vec<Entity>, expected: &str) {
        let err = EntityStore::from_entities(entities, 2).unwrap_err();
        assert!(matches!(err, AuthorizationError::MalformedRequest(_)));
        assert!(err.to_string().contains(expected), "{err}");
    }

    #[test]
    fn test_attribute_lookup() {
        let store = store(vec![
            Entity::with_uid(uid(r#"User::"alice""#)).with_attr("age", 30_i64),
            Entity::with_uid(uid(r#"User::"bob""#)),
        ]);
        assert_eq!(
            store.attribute(&uid(r#"User::"alice""#), "age"),
            Some(&Value::Long(30))
        );
        assert!(store.attribute(&uid(r#"User::"bob""#), "age").is_none());
        assert!(store.attribute(&uid(r#"User::"carol""#), "age").is_none());
        assert!(store.lookup(&uid(r#"User::"bob""#)).is_some());
        assert!(!store.contains(&uid(r#"User::"carol""#)));
    }

    fn arb_entity() -> impl Strategy<Value = Entity> {
        (
            "[a-e]",
            prop::collection::btree_map("[a-c]", any::<i64>(), 0..3),
            prop::collection::btree_set("[f-j]", 0..3),
        )
            .prop_map(|(id, attrs, parents)| {
                let mut entity = Entity::with_uid(EntityUid::new("User", id).unwrap());
                for (key, value) in attrs {
                    entity = entity.with_attr(key, value);
                }
                for parent in parents {
                    entity = entity.with_parent(EntityUid::new("Group", parent).unwrap());
                }
                entity
            })
    }

    proptest! {
        #[test]
        fn prop_store_round_trips_slice(entities in prop::collection::vec(arb_entity(), 0..8)) {
            let mut unique: Vec<Entity> = Vec::new();
            for entity in entities {
                if !unique.iter().any(|e| e.uid() == entity.uid()) {
                    unique.push(entity);
                }
            }
            let store = EntityStore::from_entities(unique.clone(), 100).unwrap();
            prop_assert_eq!(store.len(), unique.len());
            for entity in &unique {
                prop_assert_eq!(store.lookup(entity.uid()), Some(entity));
                for (key, value) in entity.attrs() {
                    prop_assert_eq!(store.attribute(entity.uid(), key), Some(value));
                }
            }

            unique.sort_by(|a, b| a.uid().cmp(b.uid()));
            prop_assert_eq!(store.to_slice(), Slice::from(unique));
        }
    }
}
