// src/channel/action.rs
//
// Discrete transmit power adjustments and their index encoding.

use serde::{Deserialize, Serialize};

/// Version of the action index layout.
pub const ACTION_VERSION: u32 = 1;

/// Ordered set of power steps; the discriminant is the network output index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerAction {
    LargeDecrease = 0,
    SmallDecrease = 1,
    Hold = 2,
    SmallIncrease = 3,
    LargeIncrease = 4,
}

impl PowerAction {
    pub const COUNT: usize = 5;

    pub const ALL: [PowerAction; Self::COUNT] = [
        PowerAction::LargeDecrease,
        PowerAction::SmallDecrease,
        PowerAction::Hold,
        PowerAction::SmallIncrease,
        PowerAction::LargeIncrease,
    ];

    /// Power change applied by this action (dB).
    pub fn delta_db(self) -> f64 {
        match self {
            PowerAction::LargeDecrease => -3.0,
            PowerAction::SmallDecrease => -1.0,
            PowerAction::Hold => 0.0,
            PowerAction::SmallIncrease => 1.0,
            PowerAction::LargeIncrease => 3.0,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}
