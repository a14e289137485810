//! 进程内的房间表：每个房间一份游戏状态，所有修改都经过规则引擎。
//!
//! 对注册表的修改需要 `&mut self`，因此同一房间的动作天然按到达顺序串行结算。
//! 网络收发与广播由调用方负责，这里只提供每次结算后的完整快照。

use std::collections::HashMap;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::game::{new_game, same_player_name, GameAction, GameState, RuleEngine, RuleError, RuleSet};

pub type RoomId = String;

pub const DEFAULT_ROOM: &str = "default-room";

#[derive(Debug, thiserror::Error)]
pub enum RoomError {
    #[error("room {0:?} not found")]
    NotFound(RoomId),
    #[error("could not open room: {0}")]
    Rules(#[from] RuleError),
    #[error("could not serialize snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub state: GameState,
    /// 当前连接在房间里的玩家名，与对局中的座位分开维护。
    pub members: Vec<String>,
}

impl Room {
    fn has_member(&self, name: &str) -> bool {
        self.members
            .iter()
            .any(|member| same_player_name(member, name))
    }
}

#[derive(Debug)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Room>,
    rules: RuleSet,
    engine: RuleEngine,
    seeds: ChaCha8Rng,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::with_seed(rand::thread_rng().gen())
    }
}

impl RoomRegistry {
    /// 固定新房间的洗牌种子，便于复现。
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rooms: HashMap::new(),
            rules: RuleSet::default(),
            engine: RuleEngine::new(),
            seeds: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    pub fn with_rules(mut self, rules: RuleSet) -> Self {
        self.rules = rules;
        self
    }

    fn room_key(room_id: &str) -> RoomId {
        if room_id.is_empty() {
            DEFAULT_ROOM.to_string()
        } else {
            room_id.to_string()
        }
    }

    /// 加入房间：房间不存在时以该玩家为唯一座位开一局新游戏，否则结算一次 `JOIN`。
    pub fn join(&mut self, room_id: &str, player_name: &str) -> Result<&GameState, RoomError> {
        let key = Self::room_key(room_id);
        if !self.rooms.contains_key(&key) {
            let state = new_game(&[player_name.to_string()], self.rules, self.seeds.gen())?;
            log::info!("opened room {key:?} for {player_name:?}");
            self.rooms.insert(
                key.clone(),
                Room {
                    id: key.clone(),
                    state,
                    members: Vec::new(),
                },
            );
        } else if let Some(room) = self.rooms.get_mut(&key) {
            let join = GameAction::Join {
                player_name: player_name.to_string(),
            };
            room.state = self.engine.apply(&room.state, &join);
        }

        let room = self
            .rooms
            .get_mut(&key)
            .ok_or_else(|| RoomError::NotFound(key.clone()))?;
        if !room.has_member(player_name) {
            room.members.push(player_name.to_string());
        }
        log::info!("{player_name:?} joined room {key:?} ({} member(s))", room.members.len());
        Ok(&room.state)
    }

    /// 按到达顺序结算一个动作。房间不存在时忽略该动作。
    pub fn dispatch(&mut self, room_id: &str, action: &GameAction) -> Option<&GameState> {
        let key = Self::room_key(room_id);
        let Some(room) = self.rooms.get_mut(&key) else {
            log::warn!("room {key:?} does not exist, ignoring {action:?}");
            return None;
        };
        log::debug!("room {key:?} applying {action:?}");
        room.state = self.engine.apply(&room.state, action);
        Some(&room.state)
    }

    /// 成员离开；房间空了就删除。返回房间是否被删除。
    pub fn leave(&mut self, room_id: &str, player_name: &str) -> bool {
        let key = Self::room_key(room_id);
        let Some(room) = self.rooms.get_mut(&key) else {
            return false;
        };
        room.members
            .retain(|member| !same_player_name(member, player_name));
        if room.members.is_empty() {
            self.rooms.remove(&key);
            log::info!("room {key:?} is empty, removed");
            return true;
        }
        false
    }

    pub fn close(&mut self, room_id: &str) -> Result<(), RoomError> {
        let key = Self::room_key(room_id);
        self.rooms
            .remove(&key)
            .map(|_| log::info!("closed room {key:?}"))
            .ok_or(RoomError::NotFound(key))
    }

    pub fn snapshot(&self, room_id: &str) -> Option<&GameState> {
        self.rooms.get(&Self::room_key(room_id)).map(|room| &room.state)
    }

    /// 广播用的 JSON 快照。
    pub fn snapshot_json(&self, room_id: &str) -> Result<String, RoomError> {
        let key = Self::room_key(room_id);
        let state = self
            .snapshot(&key)
            .ok_or_else(|| RoomError::NotFound(key.clone()))?;
        Ok(serde_json::to_string(state)?)
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(&Self::room_key(room_id))
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
