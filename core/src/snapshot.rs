//! Snapshot data model — one complete frame of world state.
//!
//! A snapshot is a self-contained picture of every entity at a single
//! simulation time. Producers emit them at whatever cadence they like;
//! the scheduler replays them smoothly. Entities are keyed in a
//! `BTreeMap` so iteration order (and therefore render order) is
//! deterministic for a given snapshot.
//!
//! RULE: snapshots are validated once at ingress and trusted after.

use crate::error::{PlaybackError, PlaybackResult};
use crate::types::{EntityId, Point, Time};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Lifecycle phase of a single entity within a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityPhase {
    /// Present but not yet participating.
    Idle,
    /// Participating, stationary this frame.
    Active,
    /// Participating and in motion.
    Moving,
    /// Halted by the producer; still rendered.
    Frozen,
    /// Finished its run normally.
    Terminated,
    /// Finished its run abnormally.
    Failed,
}

impl EntityPhase {
    /// Terminal phases never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, EntityPhase::Terminated | EntityPhase::Failed)
    }
}

/// State of one entity at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub pos:          Point,
    pub phase:        EntityPhase,
    /// How many coincident entities this record stands for. At least 1.
    #[serde(default = "default_multiplicity")]
    pub multiplicity: u32,
    /// Free-form badge rendered next to the entity (producer-defined).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marker:       Option<String>,
}

fn default_multiplicity() -> u32 {
    1
}

impl EntityState {
    pub fn new(pos: Point, phase: EntityPhase) -> Self {
        Self {
            pos,
            phase,
            multiplicity: 1,
            marker:       None,
        }
    }
}

/// One complete frame of world state at `time`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub time:     Time,
    #[serde(deserialize_with = "deserialize_entity_map")]
    pub entities: BTreeMap<EntityId, EntityState>,
}

/// JSON object keys are strings, and the buffered deserializer used by
/// internally-tagged enums (see `IngressEvent`) does not perform
/// serde_json's string→integer key conversion. Accept both integer and
/// integer-string keys so the map round-trips on every path.
fn deserialize_entity_map<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<EntityId, EntityState>, D::Error>
where
    D: Deserializer<'de>,
{
    struct EntityKey(EntityId);

    impl<'de> Deserialize<'de> for EntityKey {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            struct KeyVisitor;

            impl<'de> Visitor<'de> for KeyVisitor {
                type Value = EntityKey;

                fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                    f.write_str("an entity id (integer or integer string)")
                }

                fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<EntityKey, E> {
                    EntityId::try_from(v).map(EntityKey).map_err(E::custom)
                }

                fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<EntityKey, E> {
                    v.parse::<EntityId>().map(EntityKey).map_err(E::custom)
                }
            }

            deserializer.deserialize_any(KeyVisitor)
        }
    }

    struct MapVisitor;

    impl<'de> Visitor<'de> for MapVisitor {
        type Value = BTreeMap<EntityId, EntityState>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of entity ids to entity states")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut entities = BTreeMap::new();
            while let Some(EntityKey(id)) = access.next_key()? {
                entities.insert(id, access.next_value()?);
            }
            Ok(entities)
        }
    }

    deserializer.deserialize_map(MapVisitor)
}

impl Snapshot {
    pub fn new(time: Time) -> Self {
        Self {
            time,
            entities: BTreeMap::new(),
        }
    }

    /// Structural health check, run once when a snapshot enters the
    /// pipeline. Catches NaN/infinite coordinates and zero multiplicity
    /// before they can poison interpolation or viewport fitting.
    pub fn validate(&self) -> PlaybackResult<()> {
        if !self.time.is_finite() {
            return Err(PlaybackError::MalformedSnapshot {
                reason: format!("non-finite time {}", self.time),
            });
        }
        for (id, entity) in &self.entities {
            if !entity.pos.is_finite() {
                return Err(PlaybackError::MalformedSnapshot {
                    reason: format!(
                        "entity {id} has non-finite position ({}, {})",
                        entity.pos.x, entity.pos.y
                    ),
                });
            }
            if entity.multiplicity == 0 {
                return Err(PlaybackError::MalformedSnapshot {
                    reason: format!("entity {id} has zero multiplicity"),
                });
            }
        }
        Ok(())
    }

    /// Axis-aligned bounding box over all entity positions, or `None`
    /// for an empty snapshot.
    pub fn bounding_box(&self) -> Option<(Point, Point)> {
        let mut iter = self.entities.values();
        let first = iter.next()?.pos;
        let (mut min, mut max) = (first, first);
        for entity in iter {
            min.x = min.x.min(entity.pos.x);
            min.y = min.y.min(entity.pos.y);
            max.x = max.x.max(entity.pos.x);
            max.y = max.y.max(entity.pos.y);
        }
        Some((min, max))
    }
}
