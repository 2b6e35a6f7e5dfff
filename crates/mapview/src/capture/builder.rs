use std::fmt;

use thiserror::Error;
use tracing::debug;

use super::host::ConnectorObject;
use crate::world::{
    PlacementIndex, Room, RoomLocation, RoomTransition, TransitionIndex, TransitionRecord, Vec3,
    WorldBounds,
};

/// A connector seen in the loaded scene, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredConnector {
    pub name: String,
    pub target: String,
}

/// Every connector present in the scene, one per line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectorListing(pub Vec<DiscoveredConnector>);

impl fmt::Display for ConnectorListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "  (no connectors in scene)");
        }
        for (index, connector) in self.0.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "  {} -> {}", connector.name, connector.target)?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(
        "scene '{scene_id}': transition '{transition}' expects connector '{door_name}' but it is not in the scene; found:\n{discovered}"
    )]
    MissingConnector {
        scene_id: String,
        transition: String,
        door_name: String,
        discovered: ConnectorListing,
    },
    #[error(
        "scene '{scene_id}': transition '{transition}' matches {count} connectors named '{door_name}'"
    )]
    AmbiguousConnector {
        scene_id: String,
        transition: String,
        door_name: String,
        count: usize,
    },
}

/// Assembles a room from the live scene and the placement/transition indexes.
#[derive(Debug, Clone, Default)]
pub struct RoomGraphBuilder {
    placements: PlacementIndex,
    transitions: TransitionIndex,
}

impl RoomGraphBuilder {
    pub fn new(placements: PlacementIndex, transitions: TransitionIndex) -> Self {
        Self {
            placements,
            transitions,
        }
    }

    pub fn placements(&self) -> &PlacementIndex {
        &self.placements
    }

    pub fn transitions(&self) -> &TransitionIndex {
        &self.transitions
    }

    pub fn build(
        &self,
        scene_id: &str,
        bounds: WorldBounds,
        connectors: &[ConnectorObject],
    ) -> Result<Room, BuildError> {
        let mut room = Room::new(scene_id, bounds);

        room.locations = self
            .placements
            .in_scene(scene_id)
            .map(|placement| {
                RoomLocation::new(
                    placement.name.clone(),
                    placement.position,
                    placement.size.unwrap_or(Vec3::ZERO),
                )
            })
            .collect();

        for record in self.transitions.in_scene(scene_id) {
            let connector = resolve_connector(scene_id, record, connectors)?;
            let (position, size) = match connector.collider {
                Some(collider) => (collider.center, collider.size),
                None => (connector.position, Vec3::ZERO),
            };
            room.transitions.push(RoomTransition::new(
                record.name.clone(),
                record.door_name.clone(),
                position,
                size,
                record.target.clone(),
            ));
        }

        debug!(
            scene = scene_id,
            locations = room.locations.len(),
            transitions = room.transitions.len(),
            "room_built"
        );
        Ok(room)
    }
}

fn resolve_connector<'a>(
    scene_id: &str,
    record: &TransitionRecord,
    connectors: &'a [ConnectorObject],
) -> Result<&'a ConnectorObject, BuildError> {
    let mut matches = connectors
        .iter()
        .filter(|connector| connector.name == record.door_name);
    let Some(first) = matches.next() else {
        return Err(BuildError::MissingConnector {
            scene_id: scene_id.to_string(),
            transition: record.name.clone(),
            door_name: record.door_name.clone(),
            discovered: ConnectorListing(
                connectors
                    .iter()
                    .map(|connector| DiscoveredConnector {
                        name: connector.name.clone(),
                        target: connector.target_reference(),
                    })
                    .collect(),
            ),
        });
    };
    let extra = matches.count();
    if extra > 0 {
        return Err(BuildError::AmbiguousConnector {
            scene_id: scene_id.to_string(),
            transition: record.name.clone(),
            door_name: record.door_name.clone(),
            count: extra + 1,
        });
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::host::ColliderBounds;
    use crate::world::PlacementRecord;

    fn placement(name: &str, scene: &str, x: f32, size: Option<Vec3>) -> PlacementRecord {
        PlacementRecord {
            name: name.to_string(),
            scene: scene.to_string(),
            position: Vec3::new(x, 1.0, 0.0),
            size,
        }
    }

    fn transition(name: &str, scene: &str, door: &str, target: &str) -> TransitionRecord {
        TransitionRecord {
            name: name.to_string(),
            scene: scene.to_string(),
            door_name: door.to_string(),
            target: target.to_string(),
        }
    }

    fn connector(name: &str, x: f32, collider: Option<ColliderBounds>) -> ConnectorObject {
        ConnectorObject {
            name: name.to_string(),
            position: Vec3::new(x, 3.0, 0.0),
            collider,
            target_scene: "Town".to_string(),
            entry_point: "left1".to_string(),
        }
    }

    fn builder() -> RoomGraphBuilder {
        RoomGraphBuilder::new(
            PlacementIndex::from_records(vec![
                placement("Mask_Shard", "Crossroads_01", 4.0, None),
                placement("Geo_Chest", "Town", 9.0, None),
                placement("Charm_Notch", "Crossroads_01", 2.0, Some(Vec3::new(1.0, 2.0, 0.0))),
            ]),
            TransitionIndex::from_records(vec![
                transition("Crossroads_01[right1]", "Crossroads_01", "right1", "Town[left1]"),
                transition("Town[left1]", "Town", "left1", "Crossroads_01[right1]"),
                transition("Crossroads_01[top1]", "Crossroads_01", "top1", "Crossroads_02[bot1]"),
            ]),
        )
    }

    #[test]
    fn bounds_are_copied_verbatim() {
        let bounds = WorldBounds::new(-12.25, 3.5, 40.125, 28.0);
        let room = builder().build("Empty_01", bounds, &[]).expect("build");
        assert_eq!(room.bounds(), bounds);
        assert_eq!((room.x1, room.y1, room.x2, room.y2), (-12.25, 3.5, 40.125, 28.0));
        assert!(room.locations.is_empty());
        assert!(room.transitions.is_empty());
    }

    #[test]
    fn locations_are_the_scene_subset_in_index_order() {
        let connectors = [
            connector("right1", 30.0, None),
            connector("top1", 10.0, None),
        ];
        let room = builder()
            .build(
                "Crossroads_01",
                WorldBounds::new(0.0, 0.0, 32.0, 20.0),
                &connectors,
            )
            .expect("build");
        let ids = room
            .locations
            .iter()
            .map(|location| location.id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, ["Mask_Shard", "Charm_Notch"]);
        assert_eq!(room.locations[0].size(), Vec3::ZERO);
        assert_eq!(room.locations[1].size(), Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn transitions_take_collider_bounds_or_raw_position() {
        let connectors = [
            connector("top1", 10.0, None),
            connector(
                "right1",
                30.0,
                Some(ColliderBounds {
                    center: Vec3::new(31.5, 4.0, 0.0),
                    size: Vec3::new(1.0, 4.0, 0.0),
                }),
            ),
        ];
        let room = builder()
            .build(
                "Crossroads_01",
                WorldBounds::new(0.0, 0.0, 32.0, 20.0),
                &connectors,
            )
            .expect("build");

        assert_eq!(room.transitions.len(), 2);
        let right = &room.transitions[0];
        assert_eq!(right.id, "Crossroads_01[right1]");
        assert_eq!(right.src_door, "right1");
        assert_eq!(right.dest_door, "Town[left1]");
        assert_eq!(right.position(), Vec3::new(31.5, 4.0, 0.0));
        assert_eq!(right.size(), Vec3::new(1.0, 4.0, 0.0));

        let top = &room.transitions[1];
        assert_eq!(top.id, "Crossroads_01[top1]");
        assert_eq!(top.position(), Vec3::new(10.0, 3.0, 0.0));
        assert_eq!(top.size(), Vec3::ZERO);
    }

    #[test]
    fn missing_connector_lists_every_discovered_connector() {
        let connectors = [
            connector("right1", 30.0, None),
            connector("door_stag", 5.0, None),
        ];
        let error = builder()
            .build(
                "Crossroads_01",
                WorldBounds::new(0.0, 0.0, 32.0, 20.0),
                &connectors,
            )
            .expect_err("missing top1");

        let BuildError::MissingConnector {
            door_name,
            discovered,
            ..
        } = &error
        else {
            panic!("expected missing connector, got {error}");
        };
        assert_eq!(door_name, "top1");
        assert_eq!(discovered.0.len(), 2);
        let message = error.to_string();
        assert!(message.contains("right1 -> Town[left1]"));
        assert!(message.contains("door_stag -> Town[left1]"));
    }

    #[test]
    fn duplicate_connector_names_are_ambiguous() {
        let connectors = [
            connector("left1", 0.0, None),
            connector("left1", 1.0, None),
        ];
        let error = builder()
            .build("Town", WorldBounds::new(0.0, 0.0, 10.0, 10.0), &connectors)
            .expect_err("ambiguous");
        assert!(matches!(
            error,
            BuildError::AmbiguousConnector { count: 2, .. }
        ));
    }
}
