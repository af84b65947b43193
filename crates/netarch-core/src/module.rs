use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the three tutoring workflows.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Diagnosis,
    Task,
    Inquiry,
}

impl Module {
    pub const ALL: [Module; 3] = [Module::Diagnosis, Module::Task, Module::Inquiry];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Diagnosis => "diagnosis",
            Self::Task => "task",
            Self::Inquiry => "inquiry",
        }
    }

    /// Heading shown in the navigation selector.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Diagnosis => "Lab Diagnosis",
            Self::Task => "Task Workshop",
            Self::Inquiry => "Concept Inquiry",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Module {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "diagnosis" => Ok(Self::Diagnosis),
            "task" => Ok(Self::Task),
            "inquiry" => Ok(Self::Inquiry),
            other => Err(format!("unknown module: {other}")),
        }
    }
}

/// Self-reported familiarity with a topic. Scales generated task difficulty.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryLevel {
    /// Has not met the topic before.
    Novice,
    /// Recognizes the commands but cannot apply them unaided.
    #[default]
    Shaky,
    /// Can configure it from memory.
    Proficient,
    /// Wants the hardest exercise available.
    Challenge,
}

impl MasteryLevel {
    pub const ALL: [MasteryLevel; 4] = [
        MasteryLevel::Novice,
        MasteryLevel::Shaky,
        MasteryLevel::Proficient,
        MasteryLevel::Challenge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Novice => "novice",
            Self::Shaky => "shaky",
            Self::Proficient => "proficient",
            Self::Challenge => "challenge",
        }
    }

    /// Phrase used inside generated prompts.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Novice => "completely new to this topic",
            Self::Shaky => "has seen it but only half understands it",
            Self::Proficient => "has a solid working grasp of it",
            Self::Challenge => "wants to be pushed to the limit",
        }
    }

    /// Beginners get guided steps; everyone else gets hidden faults.
    pub fn wants_guided_steps(&self) -> bool {
        matches!(self, Self::Novice | Self::Shaky)
    }
}

impl fmt::Display for MasteryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MasteryLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "novice" => Ok(Self::Novice),
            "shaky" => Ok(Self::Shaky),
            "proficient" => Ok(Self::Proficient),
            "challenge" => Ok(Self::Challenge),
            other => Err(format!("unknown mastery level: {other}")),
        }
    }
}
