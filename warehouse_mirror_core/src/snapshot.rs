use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::{AgentId, MirrorError, Position};

/// One agent as reported by the simulation server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentReport {
    pub id: AgentId,
    pub position: Position,
    /// The server has historically named this field `carrying_box`.
    #[serde(default, alias = "carrying_box")]
    pub carrying: bool,
}

/// One loose box. Boxes only carry an `id` when the server assigns them one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxReport {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfReport {
    pub position: Position,
    pub box_count: u32,
}

/// A point-in-time description of the simulated warehouse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    pub agents: Vec<AgentReport>,
    pub boxes: Vec<BoxReport>,
    pub shelves: Vec<ShelfReport>,
}

/// What the state endpoint can answer with.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotMessage {
    Snapshot(RemoteSnapshot),
    /// The server has replayed its whole run (`{"status": "end"}`).
    End,
}

/// Identity used to match a snapshot box against a local box entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BoxKey {
    /// Position in the snapshot's box sequence.
    Index(usize),
    /// Server-assigned id.
    Id(u64),
}

/// A snapshot that passed validation and can be applied without failing.
#[derive(Debug)]
pub struct ValidatedSnapshot<'a> {
    /// Agents with duplicate ids collapsed, last entry winning.
    pub agents: Vec<&'a AgentReport>,
    pub boxes: Vec<(BoxKey, Position)>,
    pub shelves: &'a [ShelfReport],
}

/// Largest shelf stack a snapshot may report.
pub const MAX_STACK_HEIGHT: u32 = 1_000;

/// Parses one response body from the init or state endpoint.
pub fn parse_message(json: &str) -> Result<SnapshotMessage, MirrorError> {
    let value: Value = serde_json::from_str(json)?;
    let is_end = value.get("agents").is_none()
        && value.get("status").and_then(Value::as_str) == Some("end");
    if is_end {
        return Ok(SnapshotMessage::End);
    }
    let snapshot = serde_json::from_value(value)?;
    Ok(SnapshotMessage::Snapshot(snapshot))
}

impl RemoteSnapshot {
    /// Checks the whole snapshot and resolves entity identities.
    pub fn validate(&self) -> Result<ValidatedSnapshot<'_>, MirrorError> {
        for (index, agent) in self.agents.iter().enumerate() {
            check_finite("agent", index, agent.position)?;
        }
        for (index, item) in self.boxes.iter().enumerate() {
            check_finite("box", index, item.position)?;
        }
        for (index, shelf) in self.shelves.iter().enumerate() {
            check_finite("shelf", index, shelf.position)?;
            if shelf.box_count > MAX_STACK_HEIGHT {
                return Err(MirrorError::MalformedSnapshot(format!(
                    "shelf #{index} reports {} boxes, more than {MAX_STACK_HEIGHT}",
                    shelf.box_count
                )));
            }
        }

        let mut agent_slots: HashMap<AgentId, usize> = HashMap::new();
        let mut agents: Vec<&AgentReport> = Vec::with_capacity(self.agents.len());
        for agent in &self.agents {
            match agent_slots.get(&agent.id) {
                Some(&slot) => {
                    debug!(agent_id = agent.id, "duplicate agent id, keeping last entry");
                    agents[slot] = agent;
                }
                None => {
                    agent_slots.insert(agent.id, agents.len());
                    agents.push(agent);
                }
            }
        }

        Ok(ValidatedSnapshot {
            agents,
            boxes: self.box_keys()?,
            shelves: &self.shelves,
        })
    }

    fn box_keys(&self) -> Result<Vec<(BoxKey, Position)>, MirrorError> {
        let with_ids = self.boxes.iter().filter(|b| b.id.is_some()).count();
        if with_ids == 0 {
            return Ok(self
                .boxes
                .iter()
                .enumerate()
                .map(|(index, b)| (BoxKey::Index(index), b.position))
                .collect());
        }
        if with_ids != self.boxes.len() {
            return Err(MirrorError::MixedBoxIdentity);
        }

        let mut slots: HashMap<u64, usize> = HashMap::new();
        let mut keyed: Vec<(BoxKey, Position)> = Vec::with_capacity(self.boxes.len());
        for b in &self.boxes {
            let Some(id) = b.id else { continue };
            match slots.get(&id) {
                Some(&slot) => {
                    debug!(box_id = id, "duplicate box id, keeping last entry");
                    keyed[slot].1 = b.position;
                }
                None => {
                    slots.insert(id, keyed.len());
                    keyed.push((BoxKey::Id(id), b.position));
                }
            }
        }
        Ok(keyed)
    }
}

fn check_finite(kind: &'static str, index: usize, position: Position) -> Result<(), MirrorError> {
    if position.is_finite() {
        Ok(())
    } else {
        Err(MirrorError::NonFinitePosition { kind, index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(json: &str) -> RemoteSnapshot {
        match parse_message(json).unwrap() {
            SnapshotMessage::Snapshot(s) => s,
            SnapshotMessage::End => panic!("expected a snapshot"),
        }
    }

    #[test]
    fn test_parse_server_log_entry() {
        let s = snapshot(
            r#"{
                "agents": [{"id": 3, "position": [4, 7], "carrying_box": true}],
                "boxes": [{"position": [1, 2]}],
                "shelves": [{"position": [9, 9], "box_count": 2}]
            }"#,
        );
        assert_eq!(s.agents[0].id, 3);
        assert_eq!(s.agents[0].position, Position::new(4.0, 7.0));
        assert!(s.agents[0].carrying);
        assert_eq!(s.boxes[0].id, None);
        assert_eq!(s.shelves[0].box_count, 2);
    }

    #[test]
    fn test_carrying_defaults_to_false() {
        let s = snapshot(r#"{"agents": [{"id": 1, "position": [0, 0]}], "boxes": [], "shelves": []}"#);
        assert!(!s.agents[0].carrying);
    }

    #[test]
    fn test_end_of_run() {
        assert_eq!(parse_message(r#"{"status": "end"}"#).unwrap(), SnapshotMessage::End);
    }

    #[test]
    fn test_missing_category_is_malformed() {
        let err = parse_message(r#"{"agents": [], "boxes": []}"#).unwrap_err();
        assert!(matches!(err, MirrorError::MalformedSnapshot(msg) if msg.contains("shelves")));
    }

    #[test]
    fn test_non_numeric_position_is_malformed() {
        let err = parse_message(
            r#"{"agents": [{"id": 1, "position": ["a", 0]}], "boxes": [], "shelves": []}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MirrorError::MalformedSnapshot(_)));
    }

    #[test]
    fn test_negative_box_count_is_malformed() {
        let err = parse_message(
            r#"{"agents": [], "boxes": [], "shelves": [{"position": [0, 0], "box_count": -1}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, MirrorError::MalformedSnapshot(_)));
    }

    #[test]
    fn test_duplicate_agent_keeps_last_entry() {
        let s = snapshot(
            r#"{
                "agents": [
                    {"id": 1, "position": [0, 0]},
                    {"id": 2, "position": [5, 5]},
                    {"id": 1, "position": [3, 3]}
                ],
                "boxes": [],
                "shelves": []
            }"#,
        );
        let valid = s.validate().unwrap();
        assert_eq!(valid.agents.len(), 2);
        assert_eq!(valid.agents[0].id, 1);
        assert_eq!(valid.agents[0].position, Position::new(3.0, 3.0));
        assert_eq!(valid.agents[1].id, 2);
    }

    #[test]
    fn test_boxes_without_ids_use_index_keys() {
        let s = snapshot(
            r#"{"agents": [], "boxes": [{"position": [1, 1]}, {"position": [2, 2]}], "shelves": []}"#,
        );
        let valid = s.validate().unwrap();
        let keys: Vec<BoxKey> = valid.boxes.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![BoxKey::Index(0), BoxKey::Index(1)]);
    }

    #[test]
    fn test_boxes_with_ids_use_id_keys() {
        let s = snapshot(
            r#"{"agents": [], "boxes": [{"id": 40, "position": [1, 1]}, {"id": 7, "position": [2, 2]}], "shelves": []}"#,
        );
        let valid = s.validate().unwrap();
        let keys: Vec<BoxKey> = valid.boxes.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![BoxKey::Id(40), BoxKey::Id(7)]);
    }

    #[test]
    fn test_mixed_box_identity_is_rejected() {
        let s = snapshot(
            r#"{"agents": [], "boxes": [{"id": 1, "position": [1, 1]}, {"position": [2, 2]}], "shelves": []}"#,
        );
        assert_eq!(s.validate().unwrap_err(), MirrorError::MixedBoxIdentity);
    }

    #[test]
    fn test_non_finite_position_is_rejected() {
        let s = RemoteSnapshot {
            agents: vec![],
            boxes: vec![
                BoxReport { id: None, position: Position::new(0.0, 0.0) },
                BoxReport { id: None, position: Position::new(f32::INFINITY, 0.0) },
            ],
            shelves: vec![],
        };
        assert_eq!(
            s.validate().unwrap_err(),
            MirrorError::NonFinitePosition { kind: "box", index: 1 }
        );
    }

    #[test]
    fn test_oversized_stack_is_malformed() {
        let tallest = snapshot(
            r#"{"agents": [], "boxes": [], "shelves": [{"position": [0, 0], "box_count": 1000}]}"#,
        );
        assert!(tallest.validate().is_ok());

        let absurd = snapshot(
            r#"{"agents": [], "boxes": [], "shelves": [
                {"position": [0, 0], "box_count": 1000},
                {"position": [1, 0], "box_count": 4294967295}
            ]}"#,
        );
        assert!(matches!(absurd.validate(), Err(MirrorError::MalformedSnapshot(_))));
    }
}
