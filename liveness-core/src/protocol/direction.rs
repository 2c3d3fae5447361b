//! Head-pose direction vocabulary shared by the wire protocol and the
//! label table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LivenessError;

/// A requested head pose, as named on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Center,
    Left,
    Right,
    Up,
    Down,
}

impl Direction {
    /// Every direction, in label-table order.
    pub const ALL: [Direction; 5] = [
        Direction::Center,
        Direction::Left,
        Direction::Right,
        Direction::Up,
        Direction::Down,
    ];

    /// The upper-case wire token for this direction.
    pub const fn as_token(self) -> &'static str {
        match self {
            Direction::Center => "CENTER",
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_token())
    }
}

impl FromStr for Direction {
    type Err = LivenessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Direction::ALL
            .into_iter()
            .find(|d| d.as_token() == s)
            .ok_or_else(|| LivenessError::MalformedMessage(format!("unknown direction {s:?}")))
    }
}
