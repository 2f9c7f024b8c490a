use std::fmt::Display;

use crate::StateAddress;

///The three ways an atom can touch a state cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    ///Read and written. Used whenever a write cannot be proven to cover the
    /// whole cell, so earlier writers have to stay live.
    Modify,
    Write,
}

impl Display for AccessKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessKind::Read => write!(f, "read"),
            AccessKind::Modify => write!(f, "modify"),
            AccessKind::Write => write!(f, "write"),
        }
    }
}

///State accesses of a single atom. The graph holds one behavior per atom, in
/// atom-stream order.
///
/// The three lists are multisets over addresses; only *adjacent* duplicates are
/// suppressed when pushing, so a consumer must not assume set semantics.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Behavior {
    pub reads: Vec<StateAddress>,
    pub modifies: Vec<StateAddress>,
    pub writes: Vec<StateAddress>,
    ///Forces the atom live irrespective of graph reachability.
    pub keep_alive: bool,
    ///Set when the reference state rejected the atom. An aborted behavior
    /// carries no accesses and downstream DCE treats the atom as opaque.
    pub aborted: bool,
}

impl Behavior {
    pub fn new() -> Self {
        Behavior::default()
    }

    pub fn aborted() -> Self {
        Behavior {
            aborted: true,
            ..Behavior::default()
        }
    }

    pub(crate) fn push(&mut self, kind: AccessKind, addr: StateAddress) {
        if addr.is_null() {
            return;
        }
        let list = match kind {
            AccessKind::Read => &mut self.reads,
            AccessKind::Modify => &mut self.modifies,
            AccessKind::Write => &mut self.writes,
        };
        //collapse the common "touch, then touch again" idiom. Non-adjacent
        //duplicates stay.
        if list.last() == Some(&addr) {
            return;
        }
        list.push(addr);
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn push_read(&mut self, addr: StateAddress) {
        self.push(AccessKind::Read, addr);
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn push_modify(&mut self, addr: StateAddress) {
        self.push(AccessKind::Modify, addr);
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn push_write(&mut self, addr: StateAddress) {
        self.push(AccessKind::Write, addr);
    }

    ///True if no access was recorded at all.
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.modifies.is_empty() && self.writes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adjacent_duplicates_collapse() {
        let mut b = Behavior::new();
        b.push_read(StateAddress(1));
        b.push_read(StateAddress(1));
        b.push_read(StateAddress(2));
        b.push_read(StateAddress(2));
        assert_eq!(b.reads, vec![StateAddress(1), StateAddress(2)]);
    }

    #[test]
    fn non_adjacent_duplicates_stay() {
        let mut b = Behavior::new();
        b.push_modify(StateAddress(1));
        b.push_modify(StateAddress(2));
        b.push_modify(StateAddress(1));
        assert_eq!(
            b.modifies,
            vec![StateAddress(1), StateAddress(2), StateAddress(1)]
        );
    }

    #[test]
    fn lists_do_not_interfere() {
        let mut b = Behavior::new();
        b.push_read(StateAddress(1));
        b.push_write(StateAddress(1));
        b.push_read(StateAddress(2));
        assert_eq!(b.reads, vec![StateAddress(1), StateAddress(2)]);
        assert_eq!(b.writes, vec![StateAddress(1)]);
    }

    #[test]
    fn null_addresses_are_ignored() {
        let mut b = Behavior::new();
        b.push_write(StateAddress::NULL);
        assert!(b.is_empty());
    }
}
