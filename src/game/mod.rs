//! 游戏核心逻辑模块（牌组、状态、规则引擎等）。

pub mod deck;
pub mod effects;
pub mod rules;
pub mod state;

pub use deck::{build_catalog, new_game, new_game_from_entropy, CATALOG_SIZE};
pub use effects::{EffectContext, EffectEngine, EffectResolution};
pub use rules::{apply_action, GameAction, PlayCardAction, RuleEngine, RuleError, RuleResolution};
pub use state::{
    same_player_name,
    Affinity,
    Card,
    CardId,
    CardKind,
    GameEvent,
    GamePhase,
    GameState,
    IntegrityError,
    OrganSlot,
    OrganType,
    Player,
    PlayerId,
    RuleSet,
    TreatmentEffect,
    WasteReason,
};
