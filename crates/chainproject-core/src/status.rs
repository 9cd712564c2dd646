//! Lifecycle status codes shared by every participant table.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProjectionError;

/// Closed set of lifecycle labels, stored in rows by their numeric code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum Status {
    #[default]
    None = 0,
    Pending = 1,
    Accepted = 2,
    Rejected = 3,
    Appealed = 4,
    InReview = 5,
    Canceled = 6,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::None,
        Status::Pending,
        Status::Accepted,
        Status::Rejected,
        Status::Appealed,
        Status::InReview,
        Status::Canceled,
    ];

    pub fn from_code(code: u64) -> Result<Self, ProjectionError> {
        match code {
            0 => Ok(Status::None),
            1 => Ok(Status::Pending),
            2 => Ok(Status::Accepted),
            3 => Ok(Status::Rejected),
            4 => Ok(Status::Appealed),
            5 => Ok(Status::InReview),
            6 => Ok(Status::Canceled),
            other => Err(ProjectionError::UnknownStatus(other)),
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::None => "None",
            Status::Pending => "Pending",
            Status::Accepted => "Accepted",
            Status::Rejected => "Rejected",
            Status::Appealed => "Appealed",
            Status::InReview => "InReview",
            Status::Canceled => "Canceled",
        }
    }

    /// Threshold rule: `Accepted` iff `votes >= threshold`, else `Pending`.
    ///
    /// Callers must pass the threshold read at apply time.
    pub fn from_votes(votes: u128, threshold: u128) -> Self {
        if votes >= threshold {
            Status::Accepted
        } else {
            Status::Pending
        }
    }
}

impl TryFrom<u8> for Status {
    type Error = ProjectionError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Status::from_code(code as u64)
    }
}

impl From<Status> for u8 {
    fn from(s: Status) -> u8 {
        s.code()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
