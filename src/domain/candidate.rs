use serde::{Deserialize, Serialize};

use super::Session;

/// Rendered in place of a missing SET or VALUE figure
pub const PLACEHOLDER: &str = "--";

/// One extracted reading of a session's result.
///
/// Every field may be missing: the source page routinely shows a number before
/// its SET/VALUE figures, or nothing at all between draws.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub number: Option<String>,
    pub set: Option<String>,
    pub value: Option<String>,
    /// Time label printed next to the figures on the page
    pub timestamp_label: Option<String>,
    /// The page presents this reading as a settled result
    pub final_marker: bool,
}

impl Candidate {
    pub fn live(number: &str) -> Self {
        Self {
            number: Some(number.to_string()),
            ..Self::default()
        }
    }

    pub fn with_set(mut self, set: &str) -> Self {
        self.set = Some(set.to_string());
        self
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = Some(value.to_string());
        self
    }

    pub fn with_final_marker(mut self, label: Option<&str>) -> Self {
        self.final_marker = true;
        self.timestamp_label = label.map(str::to_string);
        self
    }

    /// The number, if it is exactly two ASCII digits
    pub fn usable_number(&self) -> Option<&str> {
        self.number
            .as_deref()
            .map(str::trim)
            .filter(|n| n.len() == 2 && n.bytes().all(|b| b.is_ascii_digit()))
    }

    pub fn set_or_placeholder(&self) -> &str {
        non_empty(self.set.as_deref()).unwrap_or(PLACEHOLDER)
    }

    pub fn value_or_placeholder(&self) -> &str {
        non_empty(self.value.as_deref()).unwrap_or(PLACEHOLDER)
    }

    /// Identity used to suppress repeated live announcements
    pub fn dedup_key(&self) -> Option<String> {
        let number = self.usable_number()?;
        Some(format!(
            "{}|{}|{}",
            number,
            self.set_or_placeholder(),
            self.value_or_placeholder()
        ))
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Extraction output for one poll
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedResults {
    pub morning: Candidate,
    pub evening: Candidate,
}

impl ExtractedResults {
    pub fn get(&self, session: Session) -> &Candidate {
        match session {
            Session::Morning => &self.morning,
            Session::Evening => &self.evening,
        }
    }

    /// Same reading for both sessions; window gating decides which one acts on it
    pub fn both(candidate: Candidate) -> Self {
        Self {
            morning: candidate.clone(),
            evening: candidate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_number() {
        assert_eq!(Candidate::live("82").usable_number(), Some("82"));
        assert_eq!(Candidate::live(" 07 ").usable_number(), Some("07"));
        assert_eq!(Candidate::live("8").usable_number(), None);
        assert_eq!(Candidate::live("--").usable_number(), None);
        assert_eq!(Candidate::live("123").usable_number(), None);
        assert_eq!(Candidate::default().usable_number(), None);
    }

    #[test]
    fn test_dedup_key_uses_placeholders() {
        assert_eq!(Candidate::live("82").dedup_key().unwrap(), "82|--|--");

        let full = Candidate::live("82").with_set("1,312.45").with_value("23,118.92");
        assert_eq!(full.dedup_key().unwrap(), "82|1,312.45|23,118.92");

        let blank_set = Candidate::live("82").with_set("  ");
        assert_eq!(blank_set.dedup_key().unwrap(), "82|--|--");

        assert!(Candidate::default().with_set("1,312.45").dedup_key().is_none());
    }
}
