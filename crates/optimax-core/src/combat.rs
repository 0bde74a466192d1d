//! Per-tick action resolution: sanitation, the position phase and the combat phase.
//!
//! Agents and enemies go through exactly the same rules. Every attack is judged against
//! both the pre-move and post-move positions of whoever it was aimed at:
//!
//! - the occupant after movement is attacking the attacker back: a mutual exchange, half
//!   damage both ways and both sides go on cooldown;
//! - the occupant held its ground with a defending `Stay`: the hit is negated and the
//!   attacker is penalized for the next tick;
//! - otherwise the post-move occupant takes full damage;
//! - nobody left on the tile but somebody started there: a clean miss.
//!
//! Damage is not applied here. Everything lands in a [`DamageLedger`] computed from the
//! pre-tick stats, which the engine applies in one go.

use std::collections::{BTreeMap, BTreeSet};

use optimax_protocol::{Action, Actor, AgentSlot, AttackOutcome, DowngradeReason, Pos, TickEvent};

use crate::state::GameState;

/// One actor's sanitized intent for the tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Intent {
    pub actor: Actor,
    pub depth: u32,
    /// Position at the start of the tick.
    pub from: Pos,
    /// Position after the position phase.
    pub to: Pos,
    /// Effective action. Rejected moves and invalid attacks end up as `Stay`.
    pub action: Action,
}

/// Damage dealt to one actor. `source` is `None` for separation damage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Hit {
    pub source: Option<Actor>,
    pub target: Actor,
    pub amount: i32,
}

/// Everything the combat phase decided, to be applied at the end of the tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DamageLedger {
    pub hits: Vec<Hit>,
    pub heals: Vec<(AgentSlot, i32)>,
    /// Actors entering the exchange cooldown.
    pub cooldowns: BTreeSet<Actor>,
    /// Actors whose attack was negated; they are penalized next tick.
    pub penalties: BTreeSet<Actor>,
}

impl DamageLedger {
    pub fn damage_to(&self, target: Actor) -> i32 {
        self.hits
            .iter()
            .filter(|h| h.target == target)
            .map(|h| h.amount)
            .sum()
    }

    pub fn healing_for(&self, slot: AgentSlot) -> i32 {
        self.heals
            .iter()
            .filter(|(s, _)| *s == slot)
            .map(|(_, amount)| amount)
            .sum()
    }

    /// Agent that dealt the most damage to `target` this tick. Ties go to the lower slot.
    pub fn top_agent_attacker(&self, target: Actor) -> Option<AgentSlot> {
        let mut dealt = [0_i32; 2];
        let mut involved = [false; 2];
        for hit in self.hits.iter().filter(|h| h.target == target) {
            if let Some(Actor::Agent(slot)) = hit.source {
                dealt[slot.index()] += hit.amount;
                involved[slot.index()] = true;
            }
        }
        match (involved[0], involved[1]) {
            (false, false) => None,
            (true, false) => Some(AgentSlot::First),
            (false, true) => Some(AgentSlot::Second),
            (true, true) if dealt[1] > dealt[0] => Some(AgentSlot::Second),
            (true, true) => Some(AgentSlot::First),
        }
    }
}

/// Sanitize, move and fight. Positions and mana are updated in `state`; health is not.
pub fn resolve_actions(
    state: &mut GameState,
    actions: &BTreeMap<Actor, Action>,
    events: &mut Vec<TickEvent>,
) -> (Vec<Intent>, DamageLedger) {
    let mut intents = sanitize(state, actions, events);
    resolve_movement(state, &mut intents, events);
    let ledger = resolve_combat(state, &intents, events);
    (intents, ledger)
}

/// Turn submitted actions into legal intents. Missing actions default to `Stay`.
pub fn sanitize(
    state: &GameState,
    actions: &BTreeMap<Actor, Action>,
    events: &mut Vec<TickEvent>,
) -> Vec<Intent> {
    let attack_range = state.rules().attack_range;
    let mut intents = Vec::new();

    for actor in state.actors() {
        let (Some((depth, pos)), Some(stats)) = (state.locate(actor), state.combatant(actor))
        else {
            continue;
        };
        let mut action = actions.get(&actor).copied().unwrap_or_default();

        // Only agents channel mana into healing.
        if matches!(actor, Actor::Enemy(_)) && action == Action::Heal {
            action = Action::Stay;
        }

        let downgrade = if stats.penalized && action != Action::Stay {
            Some(DowngradeReason::Penalized)
        } else if let Action::AttackTile { target } = action {
            if !stats.cooldown.is_ready() {
                Some(DowngradeReason::Cooldown)
            } else if target == pos {
                Some(DowngradeReason::OwnTile)
            } else if pos.manhattan(target) > attack_range {
                Some(DowngradeReason::OutOfRange)
            } else {
                None
            }
        } else {
            None
        };

        if let Some(reason) = downgrade {
            events.push(TickEvent::ActionDowngraded {
                actor,
                depth,
                reason,
            });
            action = Action::Stay;
        }

        intents.push(Intent {
            actor,
            depth,
            from: pos,
            to: pos,
            action,
        });
    }
    intents
}

/// Position phase. A move fails if its destination is not walkable, was occupied by anyone
/// at the start of the tick, or is claimed by more than one mover. Failed moves become `Stay`.
pub fn resolve_movement(
    state: &mut GameState,
    intents: &mut [Intent],
    events: &mut Vec<TickEvent>,
) {
    let occupied: BTreeSet<(u32, Pos)> = intents.iter().map(|i| (i.depth, i.from)).collect();
    let mut claims: BTreeMap<(u32, Pos), u32> = BTreeMap::new();
    for intent in intents.iter() {
        if let Action::Move { direction } = intent.action {
            *claims
                .entry((intent.depth, intent.from.step(direction)))
                .or_default() += 1;
        }
    }

    for intent in intents.iter_mut() {
        let Action::Move { direction } = intent.action else {
            continue;
        };
        let dest = intent.from.step(direction);
        let walkable = state
            .dungeon(intent.depth)
            .is_some_and(|d| d.is_walkable(dest));
        let contested = claims.get(&(intent.depth, dest)).copied().unwrap_or(0) > 1;

        if !walkable || occupied.contains(&(intent.depth, dest)) || contested {
            intent.action = Action::Stay;
            events.push(TickEvent::MoveBlocked {
                actor: intent.actor,
                depth: intent.depth,
                at: intent.from,
                toward: dest,
            });
        } else {
            intent.to = dest;
            state.set_position(intent.actor, dest);
            events.push(TickEvent::Moved {
                actor: intent.actor,
                depth: intent.depth,
                from: intent.from,
                to: dest,
            });
        }
    }
}

/// Combat phase: heals and attacks, judged on pre-tick stats.
pub fn resolve_combat(
    state: &mut GameState,
    intents: &[Intent],
    events: &mut Vec<TickEvent>,
) -> DamageLedger {
    let mana_damage_ratio = state.rules().mana_damage_ratio;
    let heal_ratio = state.rules().heal_ratio;
    let mut ledger = DamageLedger::default();

    for intent in intents {
        match intent.action {
            Action::Heal => {
                let Actor::Agent(slot) = intent.actor else {
                    continue;
                };
                let Some(stats) = state.combatant_mut(intent.actor) else {
                    continue;
                };
                let spent = stats.conversion_budget();
                stats.set_mana(stats.mana - spent);
                let amount = spent * heal_ratio;
                ledger.heals.push((slot, amount));
                events.push(TickEvent::Healed {
                    agent: slot,
                    depth: intent.depth,
                    amount,
                    mana_spent: spent,
                });
            }
            Action::AttackTile { target } => {
                let Some(stats) = state.combatant_mut(intent.actor) else {
                    continue;
                };
                let spent = stats.conversion_budget();
                stats.set_mana(stats.mana - spent);
                let power = stats.damage + spent * mana_damage_ratio;

                let outcome = judge_attack(state, intents, intent, target, power, &mut ledger);
                events.push(TickEvent::Attacked {
                    attacker: intent.actor,
                    depth: intent.depth,
                    target,
                    mana_spent: spent,
                    outcome,
                });
            }
            Action::Move { .. } | Action::Stay => {}
        }
    }
    ledger
}

fn judge_attack(
    state: &GameState,
    intents: &[Intent],
    attacker: &Intent,
    target: Pos,
    power: i32,
    ledger: &mut DamageLedger,
) -> AttackOutcome {
    let on_tile = intents
        .iter()
        .find(|d| d.depth == attacker.depth && d.to == target && d.actor != attacker.actor);

    let Some(defender) = on_tile else {
        let fled = intents
            .iter()
            .find(|d| d.depth == attacker.depth && d.from == target);
        return match fled {
            Some(d) => AttackOutcome::Missed { defender: d.actor },
            None => AttackOutcome::Whiff,
        };
    };

    let Some(stats) = state.combatant(defender.actor) else {
        return AttackOutcome::Whiff;
    };

    if defender.action == (Action::AttackTile { target: attacker.to }) {
        let damage = (power / 2 - stats.armor).max(0);
        ledger.hits.push(Hit {
            source: Some(attacker.actor),
            target: defender.actor,
            amount: damage,
        });
        ledger.cooldowns.insert(attacker.actor);
        ledger.cooldowns.insert(defender.actor);
        return AttackOutcome::Exchange {
            defender: defender.actor,
            damage,
        };
    }

    if defender.from == target && defender.action == Action::Stay && stats.can_defend() {
        ledger.penalties.insert(attacker.actor);
        return AttackOutcome::Negated {
            defender: defender.actor,
        };
    }

    let damage = (power - stats.armor).max(0);
    ledger.hits.push(Hit {
        source: Some(attacker.actor),
        target: defender.actor,
        amount: damage,
    });
    AttackOutcome::Hit {
        defender: defender.actor,
        damage,
    }
}
