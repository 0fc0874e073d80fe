use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::{AgentId, MirrorError, Position};

/// What an agent's camera reported seeing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionReport {
    pub agent_id: AgentId,
    pub num_boxes: u32,
    pub position: Position,
    /// Detector confidence, in percent.
    #[serde(default)]
    pub confidence: f32,
}

impl DetectionReport {
    pub fn message(&self) -> String {
        let noun = if self.num_boxes > 1 { "boxes" } else { "box" };
        format!("Agent {} found {} {}", self.agent_id, self.num_boxes, noun)
    }
}

/// Parses the body of the detections endpoint, a JSON array of reports.
pub fn parse_detections(json: &str) -> Result<Vec<DetectionReport>, MirrorError> {
    Ok(serde_json::from_str(json)?)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub text: String,
    pub posted_at: Instant,
}

/// Recent messages, newest last. Holds at most `max_messages`; each one
/// expires `ttl` after it was posted.
#[derive(Debug, Clone)]
pub struct MessageLog {
    max_messages: usize,
    ttl: Duration,
    messages: VecDeque<Message>,
}

impl MessageLog {
    pub fn new(max_messages: usize, ttl: Duration) -> Self {
        MessageLog {
            max_messages,
            ttl,
            messages: VecDeque::with_capacity(max_messages),
        }
    }

    pub fn push(&mut self, text: impl Into<String>, now: Instant) {
        if self.max_messages == 0 {
            return;
        }
        self.messages.push_back(Message {
            text: text.into(),
            posted_at: now,
        });
        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
    }

    /// Posts a message for every report that found at least one box.
    /// Returns how many were posted.
    pub fn ingest(&mut self, reports: &[DetectionReport], now: Instant) -> usize {
        let mut posted = 0;
        for report in reports.iter().filter(|r| r.num_boxes > 0) {
            self.push(report.message(), now);
            posted += 1;
        }
        posted
    }

    /// Drops messages older than the ttl.
    pub fn expire(&mut self, now: Instant) {
        while let Some(oldest) = self.messages.front() {
            if now.saturating_duration_since(oldest.posted_at) < self.ttl {
                break;
            }
            self.messages.pop_front();
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
