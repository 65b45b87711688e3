//! Combat logging
//!
//! Records combat events for post-match analysis. The log can be written to
//! disk as JSON together with a match summary.

use bevy::prelude::*;
use serde::Serialize;

/// A single entry in the combat log
#[derive(Debug, Clone, Serialize)]
pub struct CombatLogEntry {
    /// Timestamp in simulation time (seconds since start)
    pub timestamp: f32,
    /// The type of event
    pub event_type: CombatLogEventType,
    /// Human-readable description of the event
    pub message: String,
}

/// Types of combat log events for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CombatLogEventType {
    /// Damage dealt
    Damage,
    /// Status effect applied
    StatusApplied,
    /// Entity destroyed
    Death,
    /// Entity spawned
    Spawn,
    /// Hostile wave started
    Wave,
    /// Simulation event (start, end, etc.)
    MatchEvent,
}

/// The combat log storing all events
#[derive(Resource, Debug, Default, Clone)]
pub struct CombatLog {
    /// All log entries in chronological order
    pub entries: Vec<CombatLogEntry>,
    /// Current simulation time
    pub match_time: f32,
}

#[derive(Serialize)]
struct SavedLog<'a, M: Serialize> {
    summary: &'a M,
    entries: &'a [CombatLogEntry],
}

impl CombatLog {
    /// Clear the log for a new run
    pub fn clear(&mut self) {
        self.entries.clear();
        self.match_time = 0.0;
    }

    /// Add a new entry to the log
    pub fn log(&mut self, event_type: CombatLogEventType, message: String) {
        self.entries.push(CombatLogEntry {
            timestamp: self.match_time,
            event_type,
            message,
        });
    }

    /// Get entries filtered by event type
    pub fn filter_by_type(&self, event_type: CombatLogEventType) -> Vec<&CombatLogEntry> {
        self.entries
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    /// Get the last N entries
    pub fn recent(&self, count: usize) -> Vec<&CombatLogEntry> {
        self.entries.iter().rev().take(count).rev().collect()
    }

    /// Write the log and `summary` as pretty JSON.
    ///
    /// Without an explicit path the file goes to
    /// `match_logs/hordesim_<unix seconds>.json`. Returns the path written.
    pub fn save_to_file<M: Serialize>(&self, summary: &M, path: Option<&str>) -> Result<String, String> {
        let path = match path {
            Some(path) => path.to_string(),
            None => {
                let stamp = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or_default();
                format!("match_logs/hordesim_{}.json", stamp)
            }
        };

        if let Some(parent) = std::path::Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
            }
        }

        let contents = serde_json::to_string_pretty(&SavedLog {
            summary,
            entries: &self.entries,
        })
        .map_err(|e| format!("Failed to serialize combat log: {}", e))?;

        std::fs::write(&path, contents).map_err(|e| format!("Failed to write {}: {}", path, e))?;
        Ok(path)
    }
}
