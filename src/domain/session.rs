use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two daily draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Session {
    Morning,
    Evening,
}

impl Session {
    /// Evaluation order within a tick
    pub const ALL: [Session; 2] = [Session::Morning, Session::Evening];

    pub fn as_str(&self) -> &'static str {
        match self {
            Session::Morning => "morning",
            Session::Evening => "evening",
        }
    }

    /// Header label used in channel posts
    pub fn label(&self) -> &'static str {
        match self {
            Session::Morning => "🌅 MORNING",
            Session::Evening => "🌆 EVENING",
        }
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Session {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "morning" | "am" => Ok(Session::Morning),
            "evening" | "pm" => Ok(Session::Evening),
            _ => Err(format!("Unknown session: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_from_str() {
        assert_eq!("Morning".parse::<Session>().unwrap(), Session::Morning);
        assert_eq!(" pm ".parse::<Session>().unwrap(), Session::Evening);
        assert!("noon".parse::<Session>().is_err());
    }

    #[test]
    fn test_session_order() {
        assert_eq!(Session::ALL, [Session::Morning, Session::Evening]);
        assert_eq!(Session::Evening.to_string(), "evening");
    }
}
