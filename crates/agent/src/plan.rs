//! Plan tracking — reading the numbered plan and step announcements out of
//! assistant content.

use naturalmaps_core::protocol::ProtocolMarkers;
use regex_lite::Regex;

/// Extracts the plan from the planning response and follows the step
/// counter through later responses.
pub struct PlanTracker {
    markers: ProtocolMarkers,
    bracketed_step: Regex,
    loose_step: Regex,
    numbered_item: Regex,
}

impl PlanTracker {
    pub fn new(markers: &ProtocolMarkers) -> Result<Self, regex_lite::Error> {
        let label = regex_lite::escape(markers.step_label.trim());
        Ok(Self {
            markers: markers.clone(),
            bracketed_step: Regex::new(&format!(r"(?i)\[\s*{label}\s*(\d+)\s*\]"))?,
            loose_step: Regex::new(&format!(r"(?i)\b{label}\s+(\d+)\b"))?,
            numbered_item: Regex::new(r"\d+\.\s")?,
        })
    }

    /// Whether `text` opens with the plan header.
    pub fn is_plan(&self, text: &str) -> bool {
        text.trim_start().starts_with(&self.markers.plan_header)
    }

    /// Split a planning response into its numbered steps.
    ///
    /// The header and everything from the end-of-plan token onwards are
    /// dropped; each item keeps its number (`"1. Find parks"`).
    pub fn extract_plan(&self, text: &str) -> Vec<String> {
        let text = text.trim_start();
        let body = text.strip_prefix(&self.markers.plan_header).unwrap_or(text);
        let body = match body.find(&self.markers.plan_end) {
            Some(end) => &body[..end],
            None => body,
        };

        let matches: Vec<_> = self.numbered_item.find_iter(body).collect();
        matches
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let until = matches.get(i + 1).map_or(body.len(), |next| next.start());
                format!("{} {}", m.as_str().trim_end(), body[m.end()..until].trim())
            })
            .collect()
    }

    /// Whether `text` talks about steps at all. Only such content is worth
    /// running through [`update_step`](Self::update_step).
    pub fn mentions_step(&self, text: &str) -> bool {
        text.to_lowercase()
            .contains(&self.markers.step_label.trim().to_lowercase())
    }

    /// The step number announced in `text`, if any. `[step N]` wins over a
    /// bare `step N`.
    pub fn step_marker(&self, text: &str) -> Option<u32> {
        self.bracketed_step
            .captures(text)
            .or_else(|| self.loose_step.captures(text))
            .and_then(|caps| caps.get(1))
            .and_then(|n| n.as_str().parse().ok())
    }

    /// The step to continue from after `text`.
    ///
    /// Without a readable marker the step advances by one. An announced
    /// step lower than `current` is ignored so the counter never goes
    /// backwards.
    pub fn update_step(&self, text: &str, current: u32) -> u32 {
        match self.step_marker(text) {
            Some(n) => n.max(current),
            None => current.saturating_add(1),
        }
    }
}
