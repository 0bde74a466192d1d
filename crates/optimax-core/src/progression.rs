//! Experience, levels, item pickups and mana regeneration.

use optimax_protocol::{AgentSlot, TickEvent};

use crate::entities::Agent;
use crate::rules::RulesConfig;
use crate::state::GameState;

/// Experience needed to leave `level`.
#[inline]
pub fn level_threshold(level: u32, rules: &RulesConfig) -> u32 {
    level.saturating_mul(rules.xp_per_level)
}

/// Grant kill experience. Dead agents gain nothing.
pub fn award_experience(
    state: &mut GameState,
    slot: AgentSlot,
    amount: u32,
    events: &mut Vec<TickEvent>,
) {
    let rules = state.rules().clone();
    let agent = state.agent_mut(slot);
    if !agent.is_alive() || amount == 0 {
        return;
    }
    agent.experience += amount;
    events.push(TickEvent::ExperienceGained {
        agent: slot,
        depth: agent.depth,
        amount,
    });
    level_up(agent, &rules, events);
}

/// Consume thresholds while the agent has enough experience. Each level raises the caps
/// and refills health and mana.
fn level_up(agent: &mut Agent, rules: &RulesConfig, events: &mut Vec<TickEvent>) {
    loop {
        let threshold = level_threshold(agent.level, rules);
        if threshold == 0 || agent.experience < threshold {
            break;
        }
        agent.experience -= threshold;
        agent.level += 1;
        agent.stats.max_health += rules.level_health_increment;
        agent.stats.max_mana += rules.level_mana_increment;
        agent.stats.damage += rules.level_damage_increment;
        agent.stats.refill();
        events.push(TickEvent::LevelUp {
            agent: agent.slot,
            depth: agent.depth,
            level: agent.level,
        });
    }
}

/// Living agents standing on an item take it. The item is gone for good; only a new item
/// can ever fill its slot again.
pub fn pick_up_items(state: &mut GameState, events: &mut Vec<TickEvent>) {
    for slot in AgentSlot::ALL {
        let agent = state.agent(slot);
        if !agent.is_alive() {
            continue;
        }
        let (depth, pos) = (agent.depth, agent.pos);
        let Some(index) = state
            .items
            .iter()
            .position(|i| i.depth == depth && i.pos == pos)
        else {
            continue;
        };
        let item = state.items.remove(index);
        state.agent_mut(slot).apply_bonus(item.bonus);
        events.push(TickEvent::ItemPickedUp {
            agent: slot,
            depth,
            item: item.id,
            bonus: item.bonus,
        });
    }
}

pub fn regenerate_mana(state: &mut GameState) {
    let regen = state.rules().mana_regen_per_tick;
    for agent in state.agents.iter_mut().filter(|a| a.is_alive()) {
        agent.stats.set_mana(agent.stats.mana + regen);
    }
}
