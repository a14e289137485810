use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::{
    deck,
    effects::{EffectContext, EffectEngine},
    state::{same_player_name, CardId, CardKind, GameEvent, GameState, Player, PlayerId},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayCardAction {
    pub player_id: PlayerId,
    pub card_id: CardId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_player_id: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_organ_id: Option<CardId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_organ_id: Option<CardId>,
}

impl PlayCardAction {
    pub fn new(player_id: PlayerId, card_id: CardId) -> Self {
        Self {
            player_id,
            card_id,
            target_player_id: None,
            target_organ_id: None,
            source_organ_id: None,
        }
    }

    pub fn targeting(mut self, player_id: PlayerId) -> Self {
        self.target_player_id = Some(player_id);
        self
    }

    pub fn with_target_organ(mut self, organ_id: CardId) -> Self {
        self.target_organ_id = Some(organ_id);
        self
    }

    pub fn with_source_organ(mut self, organ_id: CardId) -> Self {
        self.source_organ_id = Some(organ_id);
        self
    }
}

/// 传输层转发给规则引擎的玩家意图。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum GameAction {
    Join { player_name: String },
    /// 预留，目前不产生任何效果。
    Start,
    PlayCard(PlayCardAction),
    DiscardCards {
        player_id: PlayerId,
        card_ids: Vec<CardId>,
    },
    NextTurn { player_id: PlayerId },
    Reset { player_names: Vec<String> },
}

/// 被拒绝的动作。规则引擎对外把它们全部视为空操作，原因只用于日志与调试。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, thiserror::Error)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum RuleError {
    #[error("the game is already finished")]
    GameFinished,
    #[error("it is not player {player_id}'s turn")]
    NotPlayerTurn { player_id: PlayerId },
    #[error("player {player_id} is not seated")]
    PlayerNotFound { player_id: PlayerId },
    #[error("card {card_id} is not in the player's hand")]
    CardNotFound { card_id: CardId },
    #[error("no organ can take medicine {card_id}")]
    NoEligibleOrgan { card_id: CardId },
    #[error("none of the named cards are in the player's hand")]
    NothingToDiscard,
    #[error("a player named {name:?} already joined")]
    DuplicatePlayerName { name: String },
    #[error("a game needs at least one player")]
    EmptyRoster,
    #[error("{requested} players do not fit at one table")]
    TooManyPlayers { requested: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleResolution {
    pub state: GameState,
    pub events: Vec<GameEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<PlayerId>,
}

impl RuleResolution {
    pub fn new(state: GameState, events: Vec<GameEvent>) -> Self {
        let winner = state.winner_id;
        Self {
            state,
            events,
            winner,
        }
    }
}

/// 纯函数式的规则引擎：输入状态永远不会被修改，结算发生在它的副本上。
#[derive(Debug, Default, Clone, Copy)]
pub struct RuleEngine {
    effect_engine: EffectEngine,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            effect_engine: EffectEngine,
        }
    }

    /// 结算一个动作；被拒绝时返回原因，输入状态保持不变。
    pub fn resolve(&self, state: &GameState, action: &GameAction) -> Result<RuleResolution, RuleError> {
        let mut next = state.clone();
        let events = match action {
            GameAction::Join { player_name } => Self::join(&mut next, player_name)?,
            GameAction::Start => Vec::new(),
            GameAction::PlayCard(play) => self.play_card(&mut next, play)?,
            GameAction::DiscardCards {
                player_id,
                card_ids,
            } => Self::discard_cards(&mut next, *player_id, card_ids)?,
            GameAction::NextTurn { player_id } => Self::next_turn(&mut next, *player_id)?,
            GameAction::Reset { player_names } => {
                next = Self::reset(&mut next, player_names)?;
                Vec::new()
            }
        };
        Ok(RuleResolution::new(next, events))
    }

    /// 对外的 reducer：非法动作原样返回输入状态。
    pub fn apply(&self, state: &GameState, action: &GameAction) -> GameState {
        match self.resolve(state, action) {
            Ok(resolution) => resolution.state,
            Err(error) => {
                log::debug!("ignoring {action:?}: {error}");
                state.clone()
            }
        }
    }

    fn ensure_turn_owner(state: &GameState, player_id: PlayerId) -> Result<usize, RuleError> {
        if state.is_finished() {
            return Err(RuleError::GameFinished);
        }
        if state.current_player_id != player_id {
            return Err(RuleError::NotPlayerTurn { player_id });
        }
        state
            .player_index(player_id)
            .ok_or(RuleError::PlayerNotFound { player_id })
    }

    fn join(state: &mut GameState, player_name: &str) -> Result<Vec<GameEvent>, RuleError> {
        if state.is_finished() {
            return Err(RuleError::GameFinished);
        }
        let taken = state
            .players
            .iter()
            .any(|player| same_player_name(&player.name, player_name));
        if taken {
            return Err(RuleError::DuplicatePlayerName {
                name: player_name.to_string(),
            });
        }

        let player_id = match state.players.iter().map(|player| player.id).max() {
            Some(max) => max.checked_add(1).ok_or(RuleError::TooManyPlayers {
                requested: state.players.len() + 1,
            })?,
            None => 0,
        };
        if state.players.is_empty() {
            state.current_player_id = player_id;
        }
        state.players.push(Player::new(player_id, player_name));
        state.record_log(format!("{player_name} se une a la partida"));
        Ok(vec![GameEvent::PlayerJoined { player_id }])
    }

    fn reset(state: &mut GameState, player_names: &[String]) -> Result<GameState, RuleError> {
        let seed = state.take_rng().gen();
        let fresh = deck::new_game(player_names, state.rules, seed)?;
        log::info!("game reset with {} player(s)", fresh.players.len());
        Ok(fresh)
    }

    fn play_card(&self, state: &mut GameState, action: &PlayCardAction) -> Result<Vec<GameEvent>, RuleError> {
        let actor = Self::ensure_turn_owner(state, action.player_id)?;
        let hand_index = state.players[actor]
            .find_card_in_hand_index(action.card_id)
            .ok_or(RuleError::CardNotFound {
                card_id: action.card_id,
            })?;

        // 没有可用器官的疫苗不能打出：不消耗卡牌，也不结束回合
        if let CardKind::Medicine { organ_type } = state.players[actor].hand[hand_index].kind {
            if state.players[actor].slot_for(organ_type).is_none() {
                return Err(RuleError::NoEligibleOrgan {
                    card_id: action.card_id,
                });
            }
        }

        let card = state.players[actor].hand.remove(hand_index);
        let message = format!("{} juega {}", state.players[actor].name, card.name);
        let mut events = vec![GameEvent::CardPlayed {
            player_id: action.player_id,
            card_id: card.id,
        }];

        let target = EffectContext::resolve_target(state, actor, action.target_player_id);
        let context = EffectContext::new(actor, target)
            .with_target_organ(action.target_organ_id)
            .with_source_organ(action.source_organ_id);
        events.extend(self.effect_engine.resolve_card(state, context, card).events);
        state.record_log(message);

        if let Some(winner) = state.evaluate_victory(actor) {
            events.push(GameEvent::GameWon { winner });
            return Ok(events);
        }

        events.extend(Self::advance_turn(state, actor));
        Ok(events)
    }

    fn discard_cards(
        state: &mut GameState,
        player_id: PlayerId,
        card_ids: &[CardId],
    ) -> Result<Vec<GameEvent>, RuleError> {
        let actor = Self::ensure_turn_owner(state, player_id)?;
        let wanted: HashSet<CardId> = card_ids.iter().copied().collect();

        let player = &mut state.players[actor];
        let (discarded, kept) = std::mem::take(&mut player.hand)
            .into_iter()
            .partition::<Vec<_>, _>(|card| wanted.contains(&card.id));
        player.hand = kept;
        if discarded.is_empty() {
            return Err(RuleError::NothingToDiscard);
        }

        let message = format!("{} descarta {} carta(s)", player.name, discarded.len());
        let mut events = vec![GameEvent::CardsDiscarded {
            player_id,
            card_ids: discarded.iter().map(|card| card.id).collect(),
        }];
        state.discard_pile.extend(discarded);
        state.record_log(message);

        events.extend(Self::advance_turn(state, actor));
        Ok(events)
    }

    fn next_turn(state: &mut GameState, player_id: PlayerId) -> Result<Vec<GameEvent>, RuleError> {
        let actor = Self::ensure_turn_owner(state, player_id)?;
        let message = format!("{} pasa el turno", state.players[actor].name);
        state.record_log(message);
        Ok(Self::advance_turn(state, actor))
    }

    /// 回合结束：先补满出牌者的手牌，再把回合交给下一位并提前为其补牌。
    fn advance_turn(state: &mut GameState, actor: usize) -> Vec<GameEvent> {
        let mut events = state.refill_hand(actor);
        let next = state.next_player_index(actor);
        events.extend(state.refill_hand(next));

        let from = state.players[actor].id;
        let to = state.players[next].id;
        state.current_player_id = to;
        events.push(GameEvent::TurnPassed { from, to });
        events
    }
}

/// 规则引擎的入口：`(state, action) -> state`。
pub fn apply_action(state: &GameState, action: &GameAction) -> GameState {
    RuleEngine::new().apply(state, action)
}
