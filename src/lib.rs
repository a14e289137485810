pub mod game;
pub mod rooms;

use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

pub use game::{
    apply_action, new_game, Affinity, Card, CardId, CardKind, GameAction, GameEvent, GamePhase,
    GameState, IntegrityError, OrganSlot, OrganType, PlayCardAction, Player, PlayerId, RuleEngine,
    RuleError, RuleResolution, RuleSet, TreatmentEffect,
};
pub use rooms::{Room, RoomError, RoomId, RoomRegistry};

#[cfg(all(feature = "wee_alloc", target_arch = "wasm32"))]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
    init_console_logger();
}

fn to_js_error(error: RuleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn parse_rules(rules_json: Option<String>) -> Result<RuleSet, JsValue> {
    match rules_json {
        Some(json) => RuleSet::from_json(&json).map_err(serde_to_js_error),
        None => Ok(RuleSet::default()),
    }
}

/// 持有一局游戏状态的引擎句柄，供单机或房主端直接调用。
#[wasm_bindgen]
pub struct GameEngine {
    state: GameState,
}

#[wasm_bindgen]
impl GameEngine {
    /// `player_names_json` 是玩家名数组，`rules_json` 可选地覆盖规则参数。
    #[wasm_bindgen(constructor)]
    pub fn new(player_names_json: &str, rules_json: Option<String>) -> Result<GameEngine, JsValue> {
        let names: Vec<String> =
            serde_json::from_str(player_names_json).map_err(serde_to_js_error)?;
        let rules = parse_rules(rules_json)?;
        let state = game::new_game_from_entropy(&names, rules).map_err(to_js_error)?;
        Ok(GameEngine { state })
    }

    #[wasm_bindgen(js_name = "fromState")]
    pub fn from_state(state_json: &str) -> Result<GameEngine, JsValue> {
        let state: GameState = serde_json::from_str(state_json).map_err(serde_to_js_error)?;
        Ok(GameEngine { state })
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        serde_json::to_string(&self.state).map_err(serde_to_js_error)
    }

    /// 结算动作并返回新的快照；非法动作不会报错，快照保持不变。
    pub fn apply_action_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: GameAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        self.state = apply_action(&self.state, &action);
        self.state_json()
    }

    /// 与 `apply_action_json` 相同，但会带上事件列表，非法动作以错误形式返回原因。
    pub fn resolve_action_json(&mut self, action_json: &str) -> Result<String, JsValue> {
        let action: GameAction = serde_json::from_str(action_json).map_err(serde_to_js_error)?;
        let resolution = RuleEngine::new()
            .resolve(&self.state, &action)
            .map_err(to_js_error)?;
        self.state = resolution.state.clone();
        serde_json::to_string(&resolution).map_err(serde_to_js_error)
    }
}

#[wasm_bindgen(js_name = "createGame")]
pub fn create_game(player_names: JsValue, rules: JsValue) -> Result<JsValue, JsValue> {
    let names: Vec<String> = from_value(player_names).map_err(JsValue::from)?;
    let rules: Option<RuleSet> = from_value(rules).map_err(JsValue::from)?;
    let state = game::new_game_from_entropy(&names, rules.unwrap_or_default()).map_err(to_js_error)?;
    to_value(&state).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "applyAction")]
pub fn apply_action_js(state: JsValue, action: JsValue) -> Result<JsValue, JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    let action: GameAction = from_value(action).map_err(JsValue::from)?;
    to_value(&apply_action(&state, &action)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateState")]
pub fn validate_state(state: JsValue) -> Result<(), JsValue> {
    let state: GameState = from_value(state).map_err(JsValue::from)?;
    state
        .integrity_check()
        .map_err(|error| to_value(&error).unwrap_or_else(|_| JsValue::from_str(&error.to_string())))
}

/// 把 `log` 宏的输出转发到浏览器控制台。
struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = JsValue::from_str(&format!("[{}] {}", record.target(), record.args()));
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&line),
            log::Level::Warn => web_sys::console::warn_1(&line),
            log::Level::Info => web_sys::console::info_1(&line),
            log::Level::Debug | log::Level::Trace => web_sys::console::debug_1(&line),
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

fn init_console_logger() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(if cfg!(debug_assertions) {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        });
    }
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_handle_round_trips_through_json() {
        let mut engine = GameEngine::new(r#"["Ana","Luis"]"#, Some(r#"{"handSize":3}"#.into()))
            .unwrap_or_else(|_| panic!("engine should build"));
        let before: GameState = serde_json::from_str(&engine.state_json().unwrap_or_default())
            .expect("snapshot parses");
        assert_eq!(before.deck.len(), 58);

        let after_json = engine
            .apply_action_json(r#"{"type":"NEXT_TURN","playerId":0}"#)
            .unwrap_or_else(|_| panic!("valid action json"));
        let after: GameState = serde_json::from_str(&after_json).expect("snapshot parses");
        assert_eq!(after.current_player_id, 1);

        let ignored_json = engine
            .apply_action_json(r#"{"type":"NEXT_TURN","playerId":0}"#)
            .unwrap_or_else(|_| panic!("valid action json"));
        assert_eq!(ignored_json, after_json, "out-of-turn pass leaves the snapshot alone");
    }

    #[test]
    fn resolve_reports_events() {
        let mut engine = GameEngine::new(r#"["Ana","Luis"]"#, None)
            .unwrap_or_else(|_| panic!("engine should build"));
        let json = engine
            .resolve_action_json(r#"{"type":"NEXT_TURN","playerId":0}"#)
            .unwrap_or_else(|_| panic!("legal pass"));
        let value: serde_json::Value = serde_json::from_str(&json).expect("resolution parses");
        let events = value["events"].as_array().expect("events array");
        assert!(events
            .iter()
            .any(|event| event["type"] == "TurnPassed" && event["to"] == 1));
    }
}
