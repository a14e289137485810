//! 固定牌组的定义、洗牌与开局发牌。

use rand::seq::SliceRandom;
use rand::Rng;

use super::rules::RuleError;
use super::state::{
    Affinity, Card, CardId, CardKind, GameState, OrganType, Player, PlayerId, RuleSet,
    TreatmentEffect,
};

const ORGANS_PER_TYPE: usize = 5;
const VIRUSES_PER_TYPE: usize = 4;
const MEDICINES_PER_TYPE: usize = 4;
const TREATMENT_COPIES: usize = 2;

/// 完整牌组的张数：20 器官、17 病毒、17 疫苗、10 治疗。
pub const CATALOG_SIZE: usize = OrganType::ALL.len()
    * (ORGANS_PER_TYPE + VIRUSES_PER_TYPE + MEDICINES_PER_TYPE)
    + 2
    + TREATMENTS.len() * TREATMENT_COPIES;

const TREATMENTS: [(TreatmentEffect, &str, &str); 5] = [
    (
        TreatmentEffect::StealOrgan,
        "Ladrón de órganos",
        "Roba un órgano no inmunizado de otro jugador.",
    ),
    (
        TreatmentEffect::LatexGlove,
        "Guante de látex",
        "Todos los demás jugadores descartan su mano.",
    ),
    (
        TreatmentEffect::Transplant,
        "Trasplante",
        "Intercambia un órgano no inmunizado tuyo con uno de otro jugador.",
    ),
    (
        TreatmentEffect::Contagion,
        "Contagio",
        "Pasa todos tus virus a los órganos sanos de otro jugador.",
    ),
    (
        TreatmentEffect::MedicalError,
        "Error médico",
        "Intercambia todo tu cuerpo con el de otro jugador.",
    ),
];

struct CatalogBuilder {
    cards: Vec<Card>,
}

impl CatalogBuilder {
    fn push(&mut self, name: impl Into<String>, text: &str, kind: CardKind) {
        let id = self.cards.len() as CardId;
        self.cards.push(Card::new(id, name, text, kind));
    }

    fn organs(&mut self) {
        for organ_type in OrganType::ALL {
            for _ in 0..ORGANS_PER_TYPE {
                self.push(
                    organ_type.as_str().to_uppercase(),
                    "Órgano sano. Consigue 4 diferentes para ganar.",
                    CardKind::Organ { organ_type },
                );
            }
        }
    }

    fn viruses(&mut self) {
        for organ_type in OrganType::ALL {
            for _ in 0..VIRUSES_PER_TYPE {
                self.push(
                    format!("Virus {}", organ_type.as_str()),
                    "Infecta un órgano del mismo tipo de otro jugador.",
                    CardKind::Virus {
                        organ_type: organ_type.into(),
                    },
                );
            }
        }
        self.push(
            "Virus comodín",
            "Infecta cualquier órgano de otro jugador.",
            CardKind::Virus {
                organ_type: Affinity::Wild,
            },
        );
    }

    fn medicines(&mut self) {
        for organ_type in OrganType::ALL {
            for _ in 0..MEDICINES_PER_TYPE {
                self.push(
                    format!("Vacuna {}", organ_type.as_str()),
                    "Cura un virus de tu órgano de este tipo o añade una vacuna. Con 2 vacunas queda inmunizado.",
                    CardKind::Medicine {
                        organ_type: organ_type.into(),
                    },
                );
            }
        }
        self.push(
            "Vacuna comodín",
            "Cura un virus o vacuna cualquiera de tus órganos.",
            CardKind::Medicine {
                organ_type: Affinity::Wild,
            },
        );
    }

    fn treatments(&mut self) {
        for (effect, name, text) in TREATMENTS {
            for _ in 0..TREATMENT_COPIES {
                self.push(name, text, CardKind::Treatment { effect: effect.clone() });
            }
        }
    }
}

/// 按固定顺序生成全部卡牌，id 从 0 开始连续编号。
pub fn build_catalog() -> Vec<Card> {
    let mut builder = CatalogBuilder {
        cards: Vec::with_capacity(CATALOG_SIZE),
    };
    builder.organs();
    builder.viruses();
    builder.medicines();
    builder.treatments();
    builder.cards
}

pub fn shuffled_deck<R: Rng + ?Sized>(rng: &mut R) -> Vec<Card> {
    let mut deck = build_catalog();
    deck.shuffle(rng);
    deck
}

/// 用给定种子创建一局新游戏：洗牌后按座位顺序给每位玩家发牌。
pub fn new_game(player_names: &[String], rules: RuleSet, seed: u64) -> Result<GameState, RuleError> {
    if player_names.is_empty() {
        return Err(RuleError::EmptyRoster);
    }
    if player_names.len() > usize::from(PlayerId::MAX) + 1 {
        return Err(RuleError::TooManyPlayers {
            requested: player_names.len(),
        });
    }

    let mut state = GameState::new(Vec::new(), Vec::new(), seed).with_rules(rules);
    let mut rng = state.take_rng();
    let mut deck = shuffled_deck(&mut rng);

    state.players = player_names
        .iter()
        .enumerate()
        .map(|(index, name)| {
            let mut player = Player::new(index as PlayerId, name.clone());
            let dealt = rules.hand_size.min(deck.len());
            player.hand = deck.drain(..dealt).collect();
            player
        })
        .collect();
    state.deck = deck;
    state.current_player_id = state.players[0].id;
    state.record_log(format!("Partida creada con {}", player_names.join(", ")));

    log::info!(
        "dealt a new game for {} player(s), {} cards left in deck",
        state.players.len(),
        state.deck.len()
    );
    Ok(state)
}

/// 用系统熵作为种子创建新游戏。
pub fn new_game_from_entropy(player_names: &[String], rules: RuleSet) -> Result<GameState, RuleError> {
    new_game(player_names, rules, rand::thread_rng().gen())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn catalog_has_fixed_population() {
        let catalog = build_catalog();
        assert_eq!(catalog.len(), 64);
        assert_eq!(catalog.len(), CATALOG_SIZE);

        let count = |pred: fn(&CardKind) -> bool| catalog.iter().filter(|card| pred(&card.kind)).count();
        assert_eq!(count(|kind| matches!(kind, CardKind::Organ { .. })), 20);
        assert_eq!(count(|kind| matches!(kind, CardKind::Virus { .. })), 17);
        assert_eq!(count(|kind| matches!(kind, CardKind::Medicine { .. })), 17);
        assert_eq!(count(|kind| matches!(kind, CardKind::Treatment { .. })), 10);
        assert_eq!(
            count(|kind| matches!(
                kind,
                CardKind::Virus {
                    organ_type: Affinity::Wild
                } | CardKind::Medicine {
                    organ_type: Affinity::Wild
                }
            )),
            2
        );

        let ids: HashSet<CardId> = catalog.iter().map(|card| card.id).collect();
        assert_eq!(ids.len(), catalog.len(), "card ids must be unique");
    }

    #[test]
    fn two_player_deal_leaves_58_cards() {
        let state = new_game(&names(&["Ana", "Luis"]), RuleSet::default(), 7).expect("valid roster");
        assert_eq!(state.players.len(), 2);
        assert!(state.players.iter().all(|player| player.hand.len() == 3));
        assert_eq!(state.deck.len(), 58);
        assert!(state.discard_pile.is_empty());
        assert_eq!(state.current_player_id, 0);
        assert_eq!(state.log, vec!["Partida creada con Ana, Luis".to_string()]);
        assert_eq!(state.card_count(), CATALOG_SIZE);
        assert!(state.integrity_check().is_ok());
    }

    #[test]
    fn same_seed_deals_the_same_game() {
        let roster = names(&["Ana", "Luis", "Eva"]);
        let first = new_game(&roster, RuleSet::default(), 99).expect("valid roster");
        let second = new_game(&roster, RuleSet::default(), 99).expect("valid roster");
        assert_eq!(first, second);

        let other = new_game(&roster, RuleSet::default(), 100).expect("valid roster");
        assert_ne!(first.deck, other.deck);
    }

    #[test]
    fn solo_and_empty_rosters() {
        let solo = new_game(&names(&["Ana"]), RuleSet::default(), 3).expect("solo is legal");
        assert_eq!(solo.deck.len(), 61);
        assert_eq!(
            new_game(&[], RuleSet::default(), 3),
            Err(RuleError::EmptyRoster)
        );
    }

    #[test]
    fn crowded_table_runs_the_deck_dry() {
        let roster: Vec<String> = (0..25).map(|i| format!("P{i}")).collect();
        let state = new_game(&roster, RuleSet::default(), 5).expect("valid roster");
        assert!(state.deck.is_empty());
        assert_eq!(state.card_count(), CATALOG_SIZE);
        assert!(state.players.last().is_some_and(|player| player.hand.is_empty()));
    }
}
