//! Planning journal ("blackboard").
//!
//! One entry per iteration, append-only. Stored and listed most-recent-first;
//! the prompt replays the last [`REPLAY_WINDOW`] entries oldest-first so the
//! model reads its own plan in the order it was written.

use serde::{Deserialize, Serialize};

use super::session::BlackboardEntry;

pub const REPLAY_WINDOW: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Planning,
    Progress,
    Decision,
    Reasoning,
    NextSteps,
    Reflection,
}

pub const ENTRY_TYPES: &[EntryType] = &[
    EntryType::Planning,
    EntryType::Progress,
    EntryType::Decision,
    EntryType::Reasoning,
    EntryType::NextSteps,
    EntryType::Reflection,
];

impl EntryType {
    pub fn parse(s: &str) -> Option<EntryType> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "planning" | "plan" => Some(EntryType::Planning),
            "progress" => Some(EntryType::Progress),
            "decision" => Some(EntryType::Decision),
            "reasoning" => Some(EntryType::Reasoning),
            "next_steps" | "next_step" => Some(EntryType::NextSteps),
            "reflection" => Some(EntryType::Reflection),
            _ => None,
        }
    }

    /// Unknown or missing types are recorded as progress.
    pub fn parse_or_progress(s: Option<&str>) -> EntryType {
        s.and_then(EntryType::parse).unwrap_or(EntryType::Progress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Planning => "planning",
            EntryType::Progress => "progress",
            EntryType::Decision => "decision",
            EntryType::Reasoning => "reasoning",
            EntryType::NextSteps => "next_steps",
            EntryType::Reflection => "reflection",
        }
    }
}

impl std::fmt::Display for EntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Most-recent-first entries in, the last `REPLAY_WINDOW` oldest-first out.
pub fn replay_window(most_recent_first: &[BlackboardEntry]) -> Vec<&BlackboardEntry> {
    let mut window: Vec<&BlackboardEntry> = most_recent_first.iter().take(REPLAY_WINDOW).collect();
    window.reverse();
    window
}

/// Prompt section for the journal. Empty when there is nothing to replay.
pub fn render_journal(most_recent_first: &[BlackboardEntry]) -> String {
    let window = replay_window(most_recent_first);
    if window.is_empty() {
        return String::new();
    }
    let mut out = String::from("## Planning Journal (oldest first)\n\n");
    for (i, entry) in window.iter().enumerate() {
        out.push_str(&format!(
            "{}. [{}] {}\n",
            i + 1,
            entry.entry_type,
            entry.content.trim()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn entries(n: usize) -> Vec<BlackboardEntry> {
        let session_id = Uuid::new_v4();
        let now = Utc::now();
        // Most recent first: entry n-1 is newest.
        (0..n)
            .rev()
            .map(|i| BlackboardEntry {
                id: Uuid::new_v4(),
                session_id,
                entry_type: if i == 0 { EntryType::Planning } else { EntryType::Progress },
                content: format!("step {}", i),
                created_at: now + Duration::seconds(i as i64),
            })
            .collect()
    }

    #[test]
    fn replay_is_oldest_first_and_bounded() {
        let all = entries(25);
        let window = replay_window(&all);
        assert_eq!(window.len(), REPLAY_WINDOW);
        assert_eq!(window.first().unwrap().content, "step 5");
        assert_eq!(window.last().unwrap().content, "step 24");
    }

    #[test]
    fn journal_renders_in_order() {
        let rendered = render_journal(&entries(2));
        let first = rendered.find("step 0").unwrap();
        let second = rendered.find("step 1").unwrap();
        assert!(first < second);
        assert!(rendered.contains("[planning] step 0"));
        assert_eq!(render_journal(&[]), "");
    }

    #[test]
    fn entry_types_parse_leniently() {
        assert_eq!(EntryType::parse("next-steps"), Some(EntryType::NextSteps));
        assert_eq!(EntryType::parse("Decision"), Some(EntryType::Decision));
        assert_eq!(EntryType::parse_or_progress(Some("musing")), EntryType::Progress);
        assert_eq!(EntryType::parse_or_progress(None), EntryType::Progress);
        assert_eq!(serde_json::to_value(EntryType::NextSteps).unwrap(), "next_steps");
    }
}
