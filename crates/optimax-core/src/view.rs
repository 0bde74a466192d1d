//! Per-recipient `STATE_UPDATE` construction.
//!
//! Agents only see their own depth and only see the ladder once they have spotted it.
//! Spectators see every depth with every ladder.

use std::collections::BTreeMap;

use optimax_protocol::{AgentSlot, DungeonView, StateUpdate, TickEvent};

use crate::state::GameState;

/// Which dungeon layouts a recipient has already been sent, and whether that copy showed
/// the ladder. A map is re-sent once its ladder becomes visible.
#[derive(Clone, Debug, Default)]
pub struct MapMemory {
    sent: BTreeMap<u32, bool>,
}

impl MapMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `viewer` has not seen in their current form; spectators pass `None`.
    pub fn fresh_maps(&mut self, state: &GameState, viewer: Option<AgentSlot>) -> Vec<DungeonView> {
        let visible: Vec<(u32, bool)> = match viewer {
            Some(slot) => {
                let depth = state.agent(slot).depth;
                vec![(depth, state.ladder_revealed(slot, depth))]
            }
            None => state.world().iter().map(|d| (d.depth(), true)).collect(),
        };

        let mut maps = Vec::new();
        for (depth, ladder) in visible {
            let current = self.sent.get(&depth).is_some_and(|&shown| shown || !ladder);
            if current {
                continue;
            }
            if let Some(dungeon) = state.dungeon(depth) {
                maps.push(dungeon.view(ladder));
                self.sent.insert(depth, ladder);
            }
        }
        maps
    }
}

/// Build the update an agent receives after a tick.
pub fn agent_update(
    state: &GameState,
    slot: AgentSlot,
    memory: &mut MapMemory,
    events: &[TickEvent],
) -> StateUpdate {
    let depth = state.agent(slot).depth;
    StateUpdate {
        tick: state.tick(),
        viewer: Some(slot),
        maps: memory.fresh_maps(state, Some(slot)),
        agents: state
            .agents()
            .iter()
            .filter(|a| a.slot == slot || a.depth == depth)
            .map(|a| a.view())
            .collect(),
        enemies: state.enemies_on(depth).map(|e| e.view()).collect(),
        items: state.items_on(depth).map(|i| i.view()).collect(),
        separation_ticks: state.separation_timer(),
        events: events
            .iter()
            .filter(|e| e.visible_to(slot, depth))
            .cloned()
            .collect(),
    }
}

/// Build the full-world update a spectator receives.
pub fn spectator_update(
    state: &GameState,
    memory: &mut MapMemory,
    events: &[TickEvent],
) -> StateUpdate {
    StateUpdate {
        tick: state.tick(),
        viewer: None,
        maps: memory.fresh_maps(state, None),
        agents: state.agents().iter().map(|a| a.view()).collect(),
        enemies: state.enemies().iter().map(|e| e.view()).collect(),
        items: state.items().iter().map(|i| i.view()).collect(),
        separation_ticks: state.separation_timer(),
        events: events.to_vec(),
    }
}
