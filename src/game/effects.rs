//! 卡牌效果结算：器官、病毒、疫苗与五种治疗牌。
//!
//! 这里的函数都假设出牌合法性已经由规则引擎检查过，卡牌也已经离开手牌。
//! 任何一张牌最终要么留在某个器官上，要么进入弃牌堆。

use super::state::{
    Affinity, Card, CardId, CardKind, GameEvent, GameState, OrganSlot, OrganType, PlayerId,
    TreatmentEffect, WasteReason,
};

/// 一次出牌的结算上下文，玩家均以座位下标表示。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectContext {
    pub actor: usize,
    pub target: usize,
    pub target_organ_id: Option<CardId>,
    pub source_organ_id: Option<CardId>,
}

impl EffectContext {
    pub fn new(actor: usize, target: usize) -> Self {
        Self {
            actor,
            target,
            target_organ_id: None,
            source_organ_id: None,
        }
    }

    pub fn with_target_organ(mut self, organ_id: Option<CardId>) -> Self {
        self.target_organ_id = organ_id;
        self
    }

    pub fn with_source_organ(mut self, organ_id: Option<CardId>) -> Self {
        self.source_organ_id = organ_id;
        self
    }

    /// 指定的目标玩家有效时用它，否则取桌上第一个其他玩家，单人局则是自己。
    pub fn resolve_target(state: &GameState, actor: usize, requested: Option<PlayerId>) -> usize {
        requested
            .and_then(|id| state.player_index(id))
            .or_else(|| (0..state.players.len()).find(|&idx| idx != actor))
            .unwrap_or(actor)
    }

    fn is_self_target(&self) -> bool {
        self.actor == self.target
    }
}

#[derive(Default, Debug, Clone)]
pub struct EffectResolution {
    pub events: Vec<GameEvent>,
}

impl EffectResolution {
    fn single(event: GameEvent) -> Self {
        Self {
            events: vec![event],
        }
    }

    pub fn extend(&mut self, mut other: EffectResolution) {
        self.events.append(&mut other.events);
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct EffectEngine;

impl EffectEngine {
    /// 按卡牌种类分发结算。疫苗的目标器官由规则引擎预先确定（见 `medicate`）。
    pub fn resolve_card(&self, state: &mut GameState, ctx: EffectContext, card: Card) -> EffectResolution {
        match card.kind.clone() {
            CardKind::Organ { organ_type } => Self::place_organ(state, ctx, card, organ_type),
            CardKind::Virus { organ_type } => Self::infect(state, ctx, card, organ_type),
            CardKind::Medicine { organ_type } => match state.players[ctx.actor].slot_for(organ_type) {
                Some(slot_index) => Self::medicate(state, ctx, slot_index, card),
                None => Self::waste(state, ctx, card, WasteReason::NoTarget),
            },
            CardKind::Treatment { effect } => Self::treat(state, ctx, card, &effect),
        }
    }

    fn waste(state: &mut GameState, ctx: EffectContext, card: Card, reason: WasteReason) -> EffectResolution {
        let player_id = state.players[ctx.actor].id;
        log::debug!("card {} from player {} wasted: {:?}", card.id, player_id, reason);
        let card_id = card.id;
        state.discard(card);
        EffectResolution::single(GameEvent::CardWasted {
            player_id,
            card_id,
            reason,
        })
    }

    fn place_organ(
        state: &mut GameState,
        ctx: EffectContext,
        organ: Card,
        organ_type: OrganType,
    ) -> EffectResolution {
        let player = &mut state.players[ctx.actor];
        if player.has_organ_type(organ_type) {
            return Self::waste(state, ctx, organ, WasteReason::DuplicateOrgan);
        }
        let event = GameEvent::OrganPlaced {
            player_id: player.id,
            organ_id: organ.id,
        };
        player.organs.push(OrganSlot::new(organ, organ_type));
        EffectResolution::single(event)
    }

    fn infect(
        state: &mut GameState,
        ctx: EffectContext,
        virus: Card,
        affinity: Affinity,
    ) -> EffectResolution {
        let target = &state.players[ctx.target];
        let player_id = target.id;
        let Some(slot_index) = target.slot_for(affinity) else {
            return Self::waste(state, ctx, virus, WasteReason::NoTarget);
        };
        if target.organs[slot_index].is_immunized() {
            return Self::waste(state, ctx, virus, WasteReason::Immunized);
        }

        let virus_id = virus.id;
        let slot = &mut state.players[ctx.target].organs[slot_index];
        let organ_id = slot.organ.id;
        slot.viruses.push(virus);

        if !slot.medicines.is_empty() {
            // 病毒与疫苗相互抵消，各取最后附上的一张
            let medicine_id = slot.medicines.last().map_or(0, |card| card.id);
            state.discard_pile.extend(slot.viruses.pop());
            state.discard_pile.extend(slot.medicines.pop());
            return EffectResolution::single(GameEvent::InfectionCured {
                player_id,
                organ_id,
                virus_id,
                medicine_id,
            });
        }

        if slot.viruses.len() >= 2 {
            let destroyed = state.players[ctx.target].organs.remove(slot_index);
            state.discard_pile.extend(destroyed.into_cards());
            return EffectResolution::single(GameEvent::OrganDestroyed {
                player_id,
                organ_id,
            });
        }

        EffectResolution::single(GameEvent::VirusAttached {
            player_id,
            organ_id,
            virus_id,
        })
    }

    /// 疫苗只作用于自己的器官，`slot_index` 必须指向出牌者的器官。
    pub fn medicate(
        state: &mut GameState,
        ctx: EffectContext,
        slot_index: usize,
        medicine: Card,
    ) -> EffectResolution {
        let player = &mut state.players[ctx.actor];
        let player_id = player.id;
        let Some(slot) = player.organs.get_mut(slot_index) else {
            return Self::waste(state, ctx, medicine, WasteReason::NoTarget);
        };
        let organ_id = slot.organ.id;
        let medicine_id = medicine.id;

        if let Some(virus) = slot.viruses.pop() {
            let virus_id = virus.id;
            state.discard_pile.push(virus);
            state.discard_pile.push(medicine);
            return EffectResolution::single(GameEvent::InfectionCured {
                player_id,
                organ_id,
                virus_id,
                medicine_id,
            });
        }

        slot.medicines.push(medicine);
        EffectResolution::single(GameEvent::MedicineAttached {
            player_id,
            organ_id,
            medicine_id,
            immunized: slot.is_immunized(),
        })
    }

    fn treat(
        state: &mut GameState,
        ctx: EffectContext,
        treatment: Card,
        effect: &TreatmentEffect,
    ) -> EffectResolution {
        let targeted = matches!(
            effect,
            TreatmentEffect::StealOrgan
                | TreatmentEffect::Transplant
                | TreatmentEffect::Contagion
                | TreatmentEffect::MedicalError
        );
        if targeted && state.is_solo() {
            return Self::waste(state, ctx, treatment, WasteReason::SoloGame);
        }
        if targeted && ctx.is_self_target() {
            return Self::waste(state, ctx, treatment, WasteReason::SelfTarget);
        }

        match effect {
            TreatmentEffect::StealOrgan => Self::steal_organ(state, ctx, treatment),
            TreatmentEffect::LatexGlove => Self::latex_glove(state, ctx, treatment),
            TreatmentEffect::Transplant => Self::transplant(state, ctx, treatment),
            TreatmentEffect::Contagion => Self::contagion(state, ctx, treatment),
            TreatmentEffect::MedicalError => Self::medical_error(state, ctx, treatment),
            TreatmentEffect::Unrecognized(name) => {
                log::warn!("unrecognized treatment effect {name:?}");
                Self::waste(state, ctx, treatment, WasteReason::UnknownEffect)
            }
        }
    }

    fn steal_organ(state: &mut GameState, ctx: EffectContext, treatment: Card) -> EffectResolution {
        let victim = &state.players[ctx.target];
        let Some(slot_index) = victim.unimmunized_slot(ctx.target_organ_id) else {
            return Self::waste(state, ctx, treatment, WasteReason::NoTarget);
        };
        let organ_type = victim.organs[slot_index].organ_type;
        if state.players[ctx.actor].has_organ_type(organ_type) {
            return Self::waste(state, ctx, treatment, WasteReason::DuplicateAfterMove);
        }

        let stolen = state.players[ctx.target].organs.remove(slot_index);
        let event = GameEvent::OrganStolen {
            thief: state.players[ctx.actor].id,
            victim: state.players[ctx.target].id,
            organ_id: stolen.organ.id,
        };
        state.players[ctx.actor].organs.push(stolen);
        state.discard(treatment);
        EffectResolution::single(event)
    }

    fn latex_glove(state: &mut GameState, ctx: EffectContext, treatment: Card) -> EffectResolution {
        let mut resolution = EffectResolution::default();
        for (idx, player) in state.players.iter_mut().enumerate() {
            if idx == ctx.actor || player.hand.is_empty() {
                continue;
            }
            resolution.events.push(GameEvent::HandDiscarded {
                player_id: player.id,
                count: player.hand.len(),
            });
            state.discard_pile.append(&mut player.hand);
        }
        state.discard(treatment);
        resolution
    }

    fn transplant(state: &mut GameState, ctx: EffectContext, treatment: Card) -> EffectResolution {
        let actor = &state.players[ctx.actor];
        let target = &state.players[ctx.target];
        let (Some(own_index), Some(their_index)) = (
            actor.unimmunized_slot(ctx.source_organ_id),
            target.unimmunized_slot(ctx.target_organ_id),
        ) else {
            return Self::waste(state, ctx, treatment, WasteReason::NoTarget);
        };

        let own_type = actor.organs[own_index].organ_type;
        let their_type = target.organs[their_index].organ_type;
        let clashes = |organs: &[OrganSlot], skip: usize, incoming: OrganType| {
            organs
                .iter()
                .enumerate()
                .any(|(idx, slot)| idx != skip && slot.organ_type == incoming)
        };
        if clashes(&actor.organs, own_index, their_type) || clashes(&target.organs, their_index, own_type) {
            return Self::waste(state, ctx, treatment, WasteReason::DuplicateAfterMove);
        }

        let own_slot = state.players[ctx.actor].organs.remove(own_index);
        let their_slot = state.players[ctx.target].organs.remove(their_index);
        let event = GameEvent::OrgansTransplanted {
            player_id: state.players[ctx.actor].id,
            target_id: state.players[ctx.target].id,
            given: own_slot.organ.id,
            received: their_slot.organ.id,
        };
        state.players[ctx.actor].organs.insert(own_index, their_slot);
        state.players[ctx.target].organs.insert(their_index, own_slot);
        state.discard(treatment);
        EffectResolution::single(event)
    }

    fn contagion(state: &mut GameState, ctx: EffectContext, treatment: Card) -> EffectResolution {
        let from = state.players[ctx.actor].id;
        let to = state.players[ctx.target].id;

        let mut spreading = Vec::new();
        for slot in &mut state.players[ctx.actor].organs {
            while let Some(virus) = slot.viruses.pop() {
                spreading.push(virus);
            }
        }

        let mut resolution = EffectResolution::default();
        for virus in spreading {
            let affinity = virus.affinity().unwrap_or(Affinity::Wild);
            let virus_id = virus.id;
            let destination = state.players[ctx.target]
                .organs
                .iter_mut()
                .find(|slot| slot.is_clean() && affinity.matches(slot.organ_type));
            let organ_id = match destination {
                Some(slot) => {
                    slot.viruses.push(virus);
                    Some(slot.organ.id)
                }
                None => {
                    state.discard_pile.push(virus);
                    None
                }
            };
            resolution.events.push(GameEvent::VirusSpread {
                from,
                to,
                virus_id,
                organ_id,
            });
        }

        state.discard(treatment);
        resolution
    }

    fn medical_error(state: &mut GameState, ctx: EffectContext, treatment: Card) -> EffectResolution {
        let own = std::mem::take(&mut state.players[ctx.actor].organs);
        let theirs = std::mem::replace(&mut state.players[ctx.target].organs, own);
        state.players[ctx.actor].organs = theirs;
        state.discard(treatment);
        EffectResolution::single(GameEvent::BodiesSwapped {
            player_id: state.players[ctx.actor].id,
            target_id: state.players[ctx.target].id,
        })
    }
}
