//! Browser-side checks for the JS bindings; run with `wasm-pack test --headless --firefox`.
#![cfg(target_arch = "wasm32")]

use serde_wasm_bindgen::{from_value, to_value};
use virus_core::{apply_action_js, create_game, validate_state, GameAction, GameEngine, GameState};
use wasm_bindgen::JsValue;
use wasm_bindgen_test::*;

wasm_bindgen_test_configure!(run_in_browser);

#[wasm_bindgen_test]
fn create_and_pass_turn_through_js_values() {
    let names = to_value(&vec!["Ana", "Luis"]).unwrap();
    let state = create_game(names, JsValue::UNDEFINED).unwrap();
    validate_state(state.clone()).unwrap();

    let action = to_value(&GameAction::NextTurn { player_id: 0 }).unwrap();
    let next: GameState = from_value(apply_action_js(state, action).unwrap()).unwrap();
    assert_eq!(next.current_player_id, 1);
    assert_eq!(next.players[1].hand.len(), 3);
}

#[wasm_bindgen_test]
fn empty_roster_is_reported_as_error() {
    let names = to_value(&Vec::<String>::new()).unwrap();
    assert!(create_game(names, JsValue::UNDEFINED).is_err());
}

#[wasm_bindgen_test]
fn illegal_action_surfaces_reason() {
    let mut engine = GameEngine::new(r#"["Ana","Luis"]"#, None).unwrap();
    let err = engine
        .resolve_action_json(r#"{"type":"NEXT_TURN","playerId":1}"#)
        .err()
        .unwrap();
    assert!(err.is_object());
}
