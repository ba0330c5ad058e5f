use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one recording session.
///
/// Subject and session numbers are only unique within a project: two keys
/// with the same numbers but different projects are distinct sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionKey {
    /// Participant number
    pub subject: u32,
    /// Session number for this participant
    pub session: u32,
    /// Dataset/project name, as written in the metadata table's `Dataset` column
    pub project: String,
}

impl SessionKey {
    pub fn new(subject: u32, session: u32, project: impl Into<String>) -> Self {
        Self {
            subject,
            session,
            project: project.into(),
        }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "subject {:02} session {:02} ({})",
            self.subject, self.session, self.project
        )
    }
}

/// Canonical participant sex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
    Other,
}

impl Sex {
    /// Canonical single-letter token as stored in the output document.
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "M",
            Sex::Female => "F",
            Sex::Other => "O",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
