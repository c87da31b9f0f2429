//! Battle bookkeeping for proximity duels.
//!
//! A battle is a two-party timed choice duel. This module owns the pending
//! set and its invariants: at most one pending battle per unordered player
//! pair, at most one recorded choice per participant, and removal from the
//! pending set before resolution so a battle can never resolve twice. The
//! deadline timer itself is a task spawned by the network layer; the battle
//! stores its handle and the resolution path aborts it.

use rand::Rng;
use shared::Choice;
use std::collections::HashMap;
use tokio::task::JoinHandle;

/// A pending duel between two players.
#[derive(Debug)]
pub struct Battle {
    pub id: u64,
    pub participants: [u32; 2],
    /// At most one entry per participant
    pub choices: HashMap<u32, Choice>,
    /// Deadline task handle, aborted on early resolution
    pub timer: Option<JoinHandle<()>>,
}

impl Battle {
    fn new(id: u64, a: u32, b: u32) -> Self {
        Self {
            id,
            participants: [a, b],
            choices: HashMap::new(),
            timer: None,
        }
    }

    pub fn contains(&self, player: u32) -> bool {
        self.participants.contains(&player)
    }

    pub fn opponent_of(&self, player: u32) -> u32 {
        if self.participants[0] == player {
            self.participants[1]
        } else {
            self.participants[0]
        }
    }

    pub fn abort_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Result of recording a choice submission.
#[derive(Debug)]
pub enum ChoiceOutcome {
    /// Unknown battle, non-participant, or duplicate submission
    Rejected,
    /// Choice stored; the opponent has not answered yet
    Recorded,
    /// Both choices are in; the battle has left the pending set
    Ready(Battle),
}

fn pair_key(a: u32, b: u32) -> (u32, u32) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// The set of pending battles, indexed by id and by unordered pair.
pub struct BattleBook {
    pending: HashMap<u64, Battle>,
    by_pair: HashMap<(u32, u32), u64>,
    next_id: u64,
}

impl BattleBook {
    pub fn new() -> Self {
        Self {
            pending: HashMap::new(),
            by_pair: HashMap::new(),
            next_id: 1,
        }
    }

    /// Starts a battle for a pair unless one is already pending for it.
    pub fn try_start(&mut self, a: u32, b: u32) -> Option<u64> {
        let key = pair_key(a, b);
        if self.by_pair.contains_key(&key) {
            return None;
        }

        let id = self.next_id;
        self.next_id += 1;
        self.pending.insert(id, Battle::new(id, a, b));
        self.by_pair.insert(key, id);
        Some(id)
    }

    pub fn attach_timer(&mut self, battle_id: u64, timer: JoinHandle<()>) {
        if let Some(battle) = self.pending.get_mut(&battle_id) {
            battle.timer = Some(timer);
        } else {
            // Battle already resolved before the timer was attached
            timer.abort();
        }
    }

    /// Records a participant's choice. When the second choice arrives the
    /// battle is removed from the pending set and handed back for
    /// resolution.
    pub fn record_choice(&mut self, battle_id: u64, player: u32, choice: Choice) -> ChoiceOutcome {
        let battle = match self.pending.get_mut(&battle_id) {
            Some(battle) => battle,
            None => return ChoiceOutcome::Rejected,
        };

        if !battle.contains(player) || battle.choices.contains_key(&player) {
            return ChoiceOutcome::Rejected;
        }

        battle.choices.insert(player, choice);

        if battle.choices.len() == 2 {
            let battle = self.take(battle_id).expect("battle present");
            ChoiceOutcome::Ready(battle)
        } else {
            ChoiceOutcome::Recorded
        }
    }

    /// Removes a battle from the pending set. Returns None when the battle
    /// already resolved, which makes late deadline firings no-ops.
    pub fn take(&mut self, battle_id: u64) -> Option<Battle> {
        let battle = self.pending.remove(&battle_id)?;
        self.by_pair
            .remove(&pair_key(battle.participants[0], battle.participants[1]));
        Some(battle)
    }

    pub fn has_pending_pair(&self, a: u32, b: u32) -> bool {
        self.by_pair.contains_key(&pair_key(a, b))
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_ids(&self) -> Vec<u64> {
        self.pending.keys().copied().collect()
    }

    /// Drops every pending battle, aborting outstanding timers.
    pub fn clear(&mut self) {
        for battle in self.pending.values_mut() {
            battle.abort_timer();
        }
        self.pending.clear();
        self.by_pair.clear();
    }
}

impl Default for BattleBook {
    fn default() -> Self {
        Self::new()
    }
}

/// Uniformly random duel choice, substituted for participants who miss the
/// deadline.
pub fn random_choice() -> Choice {
    match rand::thread_rng().gen_range(0..3) {
        0 => Choice::Rock,
        1 => Choice::Paper,
        _ => Choice::Scissors,
    }
}
