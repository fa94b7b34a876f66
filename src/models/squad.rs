//! Manager squad selections.

use serde::{Deserialize, Serialize};

use super::{ManagerId, PlayerId};

/// Highest slot that counts towards the starting eleven.
pub const LAST_ACTIVE_SLOT: u8 = 11;

/// Number of picks in a full squad.
pub const SQUAD_SIZE: usize = 15;

/// One of a manager's selections for a gameweek.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SquadPick {
    pub player_id: PlayerId,
    /// Slot 1-11 starts, 12-15 is the bench in substitution order.
    pub position: u8,
    /// 0 unused, 1 normal, 2 captain, 3 triple captain.
    pub multiplier: u8,
    #[serde(default)]
    pub is_captain: bool,
    #[serde(default)]
    pub is_vice_captain: bool,
}

impl SquadPick {
    pub fn is_active(&self) -> bool {
        self.position <= LAST_ACTIVE_SLOT
    }

    pub fn is_bench(&self) -> bool {
        self.position > LAST_ACTIVE_SLOT
    }
}

/// A manager's full squad for one gameweek.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerSquad {
    pub manager_id: ManagerId,
    pub gameweek: u32,
    pub picks: Vec<SquadPick>,
    /// Chip played this gameweek ("bboost", "3xc", "freehit", ...). Passed through untouched.
    #[serde(default)]
    pub active_chip: Option<String>,
}

impl ManagerSquad {
    pub fn captain(&self) -> Option<&SquadPick> {
        self.picks.iter().find(|p| p.is_captain)
    }

    pub fn vice_captain(&self) -> Option<&SquadPick> {
        self.picks.iter().find(|p| p.is_vice_captain)
    }

    pub fn is_complete(&self) -> bool {
        self.picks.len() == SQUAD_SIZE
    }
}
