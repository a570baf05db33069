//! Pre-project constants, the season enum, and input helpers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Category under which uploaded pre-project files are stored.
pub const FILE_CATEGORY: &str = "pre_projects";

pub const MAX_STUDENTS: usize = 3;
pub const MAX_ADVISORS: usize = 3;
pub const MAX_DEGREE: i32 = 100;

/// Academic season a pre-project targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Spring,
    Fall,
}

impl Season {
    pub fn as_str(self) -> &'static str {
        match self {
            Season::Spring => "spring",
            Season::Fall => "fall",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Season {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spring" => Ok(Season::Spring),
            "fall" => Ok(Season::Fall),
            other => Err(format!("unknown season '{other}'")),
        }
    }
}

/// Split a comma-separated email list as submitted by the client.
///
/// Entries are trimmed, blanks dropped, and repeats (case-insensitive)
/// collapsed while keeping first-seen order.
pub fn split_email_list(raw: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for email in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        if !out.iter().any(|seen| seen.eq_ignore_ascii_case(email)) {
            out.push(email.to_string());
        }
    }
    out
}
