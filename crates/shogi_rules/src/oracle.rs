//! Oracle traits: the seams between the turn machine and the game rules.

use crate::{Action, GameStatus, PieceKind, Position, Rejection, Side, Square};
use std::time::Duration;

/// Adjudicates legality and computes resulting positions.
///
/// Callers treat implementors as black boxes: nothing outside this trait
/// may assume how moves are generated.
pub trait RulesOracle: Send + Sync {
    /// Legal board actions for the piece on `from`, for the side to move.
    ///
    /// Promotion-eligible moves appear once per legal promotion choice.
    fn targets_from(&self, position: &Position, from: Square) -> Vec<Action>;

    /// Legal placements of `kind` from `side`'s hand.
    fn drops_for(&self, position: &Position, kind: PieceKind, side: Side) -> Vec<Action>;

    /// Validates `action` and returns the resulting position.
    fn apply(&self, position: &Position, action: &Action) -> Result<Position, Rejection>;

    /// Every legal action for the side to move.
    fn legal_actions(&self, position: &Position) -> Vec<Action>;

    /// Whether the game continues, and who won if not.
    fn status(&self, position: &Position) -> GameStatus;

    /// Legal actions paired with their resulting positions.
    fn successors(&self, position: &Position) -> Vec<(Action, Position)> {
        self.legal_actions(position)
            .into_iter()
            .filter_map(|action| self.apply(position, &action).ok().map(|next| (action, next)))
            .collect()
    }
}

/// How far and how long a search may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBudget {
    /// Maximum iterative-deepening depth in plies.
    pub depth: u8,
    /// Wall-clock cutoff; the deepest completed iteration wins.
    pub time_limit: Duration,
}

impl SearchBudget {
    /// Creates a budget.
    pub fn new(depth: u8, time_limit: Duration) -> Self {
        Self { depth, time_limit }
    }
}

/// Chooses an action for the side to move.
pub trait SearchOracle: Send {
    /// Best action found within `budget`, `None` when there is nothing to play.
    fn best_action(&mut self, position: &Position, budget: SearchBudget) -> Option<Action>;
}
