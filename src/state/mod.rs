mod player_state;
mod snapshot;

pub use player_state::PlayerState;
pub use snapshot::{
    Companion, CompanionRole, EnemyState, FIRE_SUPPORT_WINDOW, GameSnapshot,
    IDEAL_FORMATION_SPACING, Obstacle, ProjectileState,
};
