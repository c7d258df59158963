//! The state-machine IR shared by both NFA constructions (spec §4.3/§4.4).
//!
//! A [`Smir`] is a graph of states and transitions, each carrying an ordered
//! list of [`Action`]s to run as the VM crosses it. Unlike the original
//! implementation's doubly-linked-list arena (`struct trans` nodes chained
//! through `prev`/`next`), states and transitions here live in flat `Vec`s
//! indexed by [`StateId`]/[`TransId`] — no `Rc<RefCell<_>>` cycles to tear
//! down (see `DESIGN.md`).
//!
//! State id `0` never exists as a real state; it is the "no destination"
//! sentinel a final transition's `dst` carries, and the pseudo-source the
//! initial transitions hang off of. That split is represented here with
//! `Option<StateId>` rather than a reserved sentinel value.

use crate::interval::Intervals;

/// A state identifier. 1-based to match the source of truth's numbering;
/// `index()` converts to the 0-based `Vec` slot.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct StateId(u32);

impl StateId {
    fn from_index(i: usize) -> Self {
        StateId(i as u32 + 1)
    }

    fn index(self) -> usize {
        (self.0 - 1) as usize
    }
}

/// A transition identifier: which state it leaves from (`None` for one of
/// the state machine's initial transitions) plus its position in that
/// state's outgoing list.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TransId {
    src: Option<StateId>,
    idx: u32,
}

/// One step a transition or state performs as the VM crosses/enters it.
#[derive(Clone, Debug, PartialEq)]
pub enum Action {
    /// `^` — zero-width start-of-text assertion.
    Begin,
    /// `$` — zero-width end-of-text assertion.
    End,
    /// Consume one input character if it matches `ch`.
    Char(char),
    /// Consume one input character if it falls in `pred`.
    Pred(Intervals),
    /// Record the current input position into capture memory slot `k`.
    Save(u32),
    /// Memoisation check/mark keyed by a unique regex node id (spec §4.6).
    Memo(u32),
    /// Epsilon-loop guard: has thread `k`'s state pointer already been
    /// stored for this input position (spec §4.4's `EpsChk`/`EpsSet` pair).
    EpsChk(u32),
    EpsSet(u32),
    /// Emit one byte to the thread's trace buffer. Produced by the
    /// path-encoding transform (spec §4.6), never by a construction pass.
    Write(u8),
    /// Zero-width lookahead assertion: cross this action iff running `sub`
    /// anchored at the current input position succeeds (`positive`) or
    /// fails (`!positive`). `sub` is the lookahead body's own state
    /// machine, compiled and run independently of the enclosing one (see
    /// `thompson::build` and `vm::Vm::run_zwa`, and DESIGN.md's note on
    /// why this needed a representation the original implementation never
    /// finished).
    Zwa(bool, Box<Smir>),
}

#[derive(Clone, Debug, Default, PartialEq)]
struct Transition {
    actions: Vec<Action>,
    dst: Option<StateId>,
}

#[derive(Clone, Debug, Default, PartialEq)]
struct StateData {
    actions: Vec<Action>,
    out: Vec<Transition>,
    pre_meta: Option<u32>,
    post_meta: Option<u32>,
}

/// The state machine itself: a regex's states and transitions, built up by
/// a construction pass and consumed by the transforms and compiler.
#[derive(Clone, Debug, PartialEq)]
pub struct Smir {
    regex: String,
    states: Vec<StateData>,
    initial: Vec<Transition>,
}

impl Smir {
    /// A state machine with no states yet (construction passes that don't
    /// know `nstates` up front call [`Smir::add_state`] as they go).
    pub fn default(regex: impl Into<String>) -> Self {
        Smir { regex: regex.into(), states: Vec::new(), initial: Vec::new() }
    }

    /// A state machine pre-sized to `nstates` states, each already
    /// allocated and addressable by id `1..=nstates`.
    pub fn new(regex: impl Into<String>, nstates: u32) -> Self {
        let mut sm = Smir::default(regex);
        for _ in 0..nstates {
            sm.add_state();
        }
        sm
    }

    pub fn regex(&self) -> &str {
        &self.regex
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn add_state(&mut self) -> StateId {
        self.states.push(StateData::default());
        StateId::from_index(self.states.len() - 1)
    }

    pub fn states(&self) -> impl Iterator<Item = StateId> + '_ {
        (0..self.states.len()).map(StateId::from_index)
    }

    // --- initial / final ---------------------------------------------------

    /// Marks `sid` as an initial state by pushing a blank initial
    /// transition to it. Call order matters: it fixes the priority with
    /// which a thread spawned for each initial function is tried.
    pub fn set_initial(&mut self, sid: StateId) -> TransId {
        let idx = self.initial.len() as u32;
        self.initial.push(Transition { actions: Vec::new(), dst: Some(sid) });
        TransId { src: None, idx }
    }

    pub fn initial_transitions(&self) -> impl Iterator<Item = TransId> + '_ {
        (0..self.initial.len() as u32).map(|idx| TransId { src: None, idx })
    }

    /// Marks `sid` as final by appending a transition with no destination
    /// (crossing it means the match completed). Any transition appended to
    /// `sid` beforehand is tried with higher priority.
    pub fn set_final(&mut self, sid: StateId) -> TransId {
        self.add_transition(sid)
    }

    // --- transitions ---------------------------------------------------------

    /// Appends a fresh, destination-less outgoing transition to `sid`.
    /// Pair with [`Smir::set_dst`] once the target state exists.
    pub fn add_transition(&mut self, sid: StateId) -> TransId {
        let state = &mut self.states[sid.index()];
        let idx = state.out.len() as u32;
        state.out.push(Transition::default());
        TransId { src: Some(sid), idx }
    }

    pub fn out_transitions(&self, sid: StateId) -> impl Iterator<Item = TransId> + '_ {
        let n = self.states[sid.index()].out.len() as u32;
        (0..n).map(move |idx| TransId { src: Some(sid), idx })
    }

    fn transition(&self, tid: TransId) -> &Transition {
        match tid.src {
            Some(sid) => &self.states[sid.index()].out[tid.idx as usize],
            None => &self.initial[tid.idx as usize],
        }
    }

    fn transition_mut(&mut self, tid: TransId) -> &mut Transition {
        match tid.src {
            Some(sid) => &mut self.states[sid.index()].out[tid.idx as usize],
            None => &mut self.initial[tid.idx as usize],
        }
    }

    /// The state a transition leaves from, or `None` for an initial
    /// transition (it leaves from the pseudo start state).
    pub fn get_src(&self, tid: TransId) -> Option<StateId> {
        tid.src
    }

    pub fn get_dst(&self, tid: TransId) -> Option<StateId> {
        self.transition(tid).dst
    }

    pub fn set_dst(&mut self, tid: TransId, dst: Option<StateId>) {
        self.transition_mut(tid).dst = dst;
    }

    // --- actions -------------------------------------------------------------

    pub fn state_actions(&self, sid: StateId) -> &[Action] {
        &self.states[sid.index()].actions
    }

    pub fn state_append_action(&mut self, sid: StateId, act: Action) {
        self.states[sid.index()].actions.push(act);
    }

    pub fn state_prepend_action(&mut self, sid: StateId, act: Action) {
        self.states[sid.index()].actions.insert(0, act);
    }

    pub fn state_set_actions(&mut self, sid: StateId, acts: Vec<Action>) {
        self.states[sid.index()].actions = acts;
    }

    pub fn trans_actions(&self, tid: TransId) -> &[Action] {
        &self.transition(tid).actions
    }

    pub fn trans_append_action(&mut self, tid: TransId, act: Action) {
        self.transition_mut(tid).actions.push(act);
    }

    pub fn trans_prepend_action(&mut self, tid: TransId, act: Action) {
        self.transition_mut(tid).actions.insert(0, act);
    }

    pub fn trans_set_actions(&mut self, tid: TransId, acts: Vec<Action>) {
        self.transition_mut(tid).actions = acts;
    }

    /// A cursor over a state's action list that supports removing the
    /// action just yielded — the idiomatic stand-in for the original's
    /// `ActionListIterator` (which could walk and splice a doubly-linked
    /// list in either direction; a retain-style cursor covers the one
    /// direction the transforms actually need: forward-with-removal).
    pub fn state_actions_cursor(&mut self, sid: StateId) -> ActionCursor<'_> {
        ActionCursor { actions: &mut self.states[sid.index()].actions, pos: 0 }
    }

    pub fn trans_actions_cursor(&mut self, tid: TransId) -> ActionCursor<'_> {
        ActionCursor { actions: &mut self.transition_mut(tid).actions, pos: 0 }
    }

    // --- per-state compiler metadata ------------------------------------------

    /// Slot the compiler's layout pass uses to stash the byte offset it
    /// assigned a state's entry point, read back during jump-patching.
    pub fn set_pre_meta(&mut self, sid: StateId, meta: Option<u32>) -> Option<u32> {
        std::mem::replace(&mut self.states[sid.index()].pre_meta, meta)
    }

    pub fn get_pre_meta(&self, sid: StateId) -> Option<u32> {
        self.states[sid.index()].pre_meta
    }

    pub fn set_post_meta(&mut self, sid: StateId, meta: Option<u32>) -> Option<u32> {
        std::mem::replace(&mut self.states[sid.index()].post_meta, meta)
    }

    pub fn get_post_meta(&self, sid: StateId) -> Option<u32> {
        self.states[sid.index()].post_meta
    }

    // --- reordering ------------------------------------------------------------

    /// Physically reorders the states so that `new_order[i]` (the state
    /// currently holding `new_order[i]`'s identity) becomes state `i + 1`.
    /// `new_order` must be a permutation of every state id. Invalidates
    /// every `TransId` obtained before the call, since a transition's
    /// position within its (possibly moved) source state is unaffected but
    /// any `dst` pointing at a moved state now names a different slot.
    pub fn reorder_states(&mut self, new_order: &[StateId]) {
        debug_assert_eq!(new_order.len(), self.states.len());
        let mut old_to_new = vec![0u32; self.states.len() + 1];
        for (new_idx, &old_sid) in new_order.iter().enumerate() {
            old_to_new[old_sid.0 as usize] = new_idx as u32 + 1;
        }
        let remap = |dst: Option<StateId>| dst.map(|s| StateId(old_to_new[s.0 as usize]));

        let mut new_states: Vec<StateData> = new_order.iter().map(|&sid| self.states[sid.index()].clone()).collect();
        for state in &mut new_states {
            for trans in &mut state.out {
                trans.dst = remap(trans.dst);
            }
        }
        for trans in &mut self.initial {
            trans.dst = remap(trans.dst);
        }
        self.states = new_states;
    }
}

/// A forward cursor over one action list, allowing the action just
/// returned by [`ActionCursor::next`] to be dropped in place.
pub struct ActionCursor<'a> {
    actions: &'a mut Vec<Action>,
    pos: usize,
}

impl<'a> ActionCursor<'a> {
    pub fn next(&mut self) -> Option<&Action> {
        let act = self.actions.get(self.pos)?;
        self.pos += 1;
        Some(act)
    }

    /// Removes the action most recently returned by `next`. A no-op if
    /// `next` hasn't been called yet, or has already run past the end.
    pub fn remove_current(&mut self) {
        if self.pos > 0 && self.pos <= self.actions.len() {
            self.actions.remove(self.pos - 1);
            self.pos -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_are_one_based() {
        let mut sm = Smir::default("a");
        let s1 = sm.add_state();
        let s2 = sm.add_state();
        assert_eq!(sm.num_states(), 2);
        assert_ne!(s1, s2);
    }

    #[test]
    fn initial_and_final_round_trip() {
        let mut sm = Smir::default("a");
        let s1 = sm.add_state();
        let init = sm.set_initial(s1);
        assert_eq!(sm.get_src(init), None);
        assert_eq!(sm.get_dst(init), Some(s1));

        let fin = sm.set_final(s1);
        assert_eq!(sm.get_src(fin), Some(s1));
        assert_eq!(sm.get_dst(fin), None);
    }

    #[test]
    fn transition_actions_append_and_prepend() {
        let mut sm = Smir::default("a");
        let s1 = sm.add_state();
        let s2 = sm.add_state();
        let t = sm.add_transition(s1);
        sm.set_dst(t, Some(s2));
        sm.trans_append_action(t, Action::Char('a'));
        sm.trans_prepend_action(t, Action::Save(0));
        assert_eq!(sm.trans_actions(t), &[Action::Save(0), Action::Char('a')]);
    }

    #[test]
    fn action_cursor_removes_current_element() {
        let mut sm = Smir::default("a");
        let s1 = sm.add_state();
        sm.state_append_action(s1, Action::Begin);
        sm.state_append_action(s1, Action::Memo(3));
        sm.state_append_action(s1, Action::End);
        {
            let mut cur = sm.state_actions_cursor(s1);
            while let Some(act) = cur.next() {
                if matches!(act, Action::Memo(_)) {
                    cur.remove_current();
                }
            }
        }
        assert_eq!(sm.state_actions(s1), &[Action::Begin, Action::End]);
    }

    #[test]
    fn reorder_states_remaps_destinations() {
        let mut sm = Smir::default("a");
        let s1 = sm.add_state();
        let s2 = sm.add_state();
        let t = sm.add_transition(s1);
        sm.set_dst(t, Some(s2));

        // swap s1 and s2's positions
        sm.reorder_states(&[s2, s1]);

        let new_s1 = StateId::from_index(0);
        let transitions: Vec<_> = sm.out_transitions(new_s1).collect();
        assert_eq!(transitions.len(), 0, "s2 had no outgoing transitions before the swap");

        let new_s2 = StateId::from_index(1);
        let transitions: Vec<_> = sm.out_transitions(new_s2).collect();
        assert_eq!(transitions.len(), 1);
        assert_eq!(sm.get_dst(transitions[0]), Some(new_s1));
    }
}
