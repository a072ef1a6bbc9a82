use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(SessionId);
id_newtype!(QuestionId);
id_newtype!(UserId);

/// Baccalaureate series accepted by the orientation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SerieBac {
    S,
    C,
    D,
    A1,
    A2,
    L,
    #[serde(rename = "OSE")]
    Ose,
}

impl SerieBac {
    pub const ALL: [SerieBac; 7] = [
        SerieBac::S,
        SerieBac::C,
        SerieBac::D,
        SerieBac::A1,
        SerieBac::A2,
        SerieBac::L,
        SerieBac::Ose,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SerieBac::S => "S",
            SerieBac::C => "C",
            SerieBac::D => "D",
            SerieBac::A1 => "A1",
            SerieBac::A2 => "A2",
            SerieBac::L => "L",
            SerieBac::Ose => "OSE",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SerieBac::S => "Série S (Scientifique)",
            SerieBac::C => "Série C",
            SerieBac::D => "Série D",
            SerieBac::A1 => "Série A1",
            SerieBac::A2 => "Série A2",
            SerieBac::L => "Série L (Littéraire)",
            SerieBac::Ose => "Série OSE",
        }
    }
}

impl fmt::Display for SerieBac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown baccalaureate series '{0}'")]
pub struct UnknownSerie(pub String);

impl FromStr for SerieBac {
    type Err = UnknownSerie;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        SerieBac::ALL
            .into_iter()
            .find(|serie| serie.as_str() == value)
            .ok_or_else(|| UnknownSerie(value.to_string()))
    }
}

/// Server-side lifecycle of a stored orientation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initial,
    QuestionsSent,
    Completed,
    Error,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SessionStatus::Initial => "initial",
            SessionStatus::QuestionsSent => "questions sent",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        };
        f.write_str(text)
    }
}
