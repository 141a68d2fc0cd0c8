//! Key lifecycle events published by the scheduler

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, TypesError};
use crate::schemas::*;

/// Event type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// A scheduled builder run completed and the task was re-armed
    #[serde(rename = "sks.keys.updated")]
    KeysUpdated,

    /// A scheduled builder run failed; the task keeps running
    #[serde(rename = "sks.keys.update_failed")]
    KeysUpdateFailed,

    /// A task stopped rescheduling itself
    #[serde(rename = "sks.task.degraded")]
    TaskDegraded,
}

/// Base event structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type identifier
    pub event_type: EventType,

    /// Unique event identifier
    pub event_id: Uuid,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Component that published the event
    pub source: String,

    /// Event payload (type depends on event_type)
    pub payload: serde_json::Value,
}

impl Event {
    /// Create a new event
    pub fn new(
        event_type: EventType,
        source: impl Into<String>,
        payload: impl Serialize,
    ) -> Result<Self> {
        let payload_value = serde_json::to_value(payload)?;

        Ok(Self {
            event_type,
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload: payload_value,
        })
    }

    /// Deserialize the payload into a specific type
    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| TypesError::InvalidPayload(e.to_string()))
    }

    /// Check that the payload matches the event type
    pub fn validate(&self) -> Result<()> {
        match self.event_type {
            EventType::KeysUpdated => {
                let _: KeysUpdatedPayload = self.payload_as()?;
            }
            EventType::KeysUpdateFailed => {
                let _: KeysUpdateFailedPayload = self.payload_as()?;
            }
            EventType::TaskDegraded => {
                let _: TaskDegradedPayload = self.payload_as()?;
            }
        }
        Ok(())
    }
}
