use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};

use fxhash::FxHashSet;

use crate::{
    atom::Atom,
    dispatch,
    state::{StateMutator, TrackedState},
    AddressMap, Behavior, BuildError, CaptureError, CommandBufferPool, MemoryPool, StateAddress,
    StateKey, TrackingMutator,
};

///Source of an atom stream plus a factory for the reference state the stream
/// is replayed against.
pub trait Capture {
    ///The ordered atom stream of this capture.
    fn atoms(&self) -> Result<&[Atom], CaptureError>;

    ///A fresh reference state. Captures of mid-execution traces seed state the
    /// stream itself cannot recreate, e.g. swapchain images.
    fn new_state(&self) -> TrackedState;
}

///[Capture] over an atom vector, mostly useful for tests and tools that
/// already decoded a trace.
pub struct InMemoryCapture {
    atoms: Vec<Atom>,
    base_state: TrackedState,
}

impl InMemoryCapture {
    pub fn new(atoms: Vec<Atom>) -> Self {
        Self::with_state(atoms, TrackedState::new())
    }

    pub fn with_state(atoms: Vec<Atom>, base_state: TrackedState) -> Self {
        InMemoryCapture { atoms, base_state }
    }
}

impl Capture for InMemoryCapture {
    fn atoms(&self) -> Result<&[Atom], CaptureError> {
        Ok(&self.atoms)
    }

    fn new_state(&self) -> TrackedState {
        self.base_state.clone()
    }
}

///Shared cancellation flag. The build observes it between atoms and returns
/// [BuildError::Cancelled] without publishing a partial graph.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

///The finished graph: one [Behavior] per atom, the canonical address space and
/// the composite models behind it, plus the root addresses the DCE consumer
/// must always treat as live.
pub struct DependencyGraph<'c> {
    atoms: &'c [Atom],
    behaviors: Vec<Behavior>,
    addresses: AddressMap,
    memories: MemoryPool,
    command_buffers: CommandBufferPool,
    roots: FxHashSet<StateAddress>,
}

impl<'c> DependencyGraph<'c> {
    ///The atom stream this graph was built for.
    pub fn atoms(&self) -> &'c [Atom] {
        self.atoms
    }

    ///Behaviors, indexed 1:1 with [atoms](Self::atoms).
    pub fn behaviors(&self) -> &[Behavior] {
        &self.behaviors
    }

    pub fn behavior(&self, index: usize) -> Option<&Behavior> {
        self.behaviors.get(index)
    }

    pub fn addresses(&self) -> &AddressMap {
        &self.addresses
    }

    pub fn memories(&self) -> &MemoryPool {
        &self.memories
    }

    pub fn command_buffers(&self) -> &CommandBufferPool {
        &self.command_buffers
    }

    ///Addresses the DCE pass must keep live unconditionally.
    pub fn roots(&self) -> &FxHashSet<StateAddress> {
        &self.roots
    }

    pub fn is_root(&self, address: StateAddress) -> bool {
        self.roots.contains(&address)
    }

    pub fn key_of(&self, address: StateAddress) -> Option<StateKey> {
        self.addresses.key_of(address)
    }

    pub fn parent_of(&self, address: StateAddress) -> StateAddress {
        self.addresses.parent_of(address)
    }

    ///Logs one behavior's accesses with their addresses and keys.
    pub fn print_behavior(&self, index: usize) {
        let behavior = match self.behaviors.get(index) {
            Some(b) => b,
            None => return,
        };
        let describe = |address: &StateAddress| {
            self.addresses
                .key_of(*address)
                .map(|key| key.to_string())
                .unwrap_or_else(|| "<null>".to_string())
        };
        for read in &behavior.reads {
            log::info!(" - read [{}]{}", read, describe(read));
        }
        for modify in &behavior.modifies {
            log::info!(" - modify [{}]{}", modify, describe(modify));
        }
        for write in &behavior.writes {
            log::info!(" - write [{}]{}", write, describe(write));
        }
        if behavior.aborted {
            log::info!(" - aborted");
        }
    }
}

///Builds a [DependencyGraph] by streaming a capture's atoms through a
/// [StateMutator] and the behavior extractor, one atom at a time.
pub struct GraphBuilder<M = TrackingMutator> {
    mutator: M,
    cancel: CancelToken,
}

impl GraphBuilder<TrackingMutator> {
    pub fn new() -> Self {
        Self::with_mutator(TrackingMutator::new())
    }
}

impl Default for GraphBuilder<TrackingMutator> {
    fn default() -> Self {
        GraphBuilder::new()
    }
}

impl<M: StateMutator> GraphBuilder<M> {
    ///Builder over a custom reference-state mutator.
    pub fn with_mutator(mutator: M) -> Self {
        GraphBuilder {
            mutator,
            cancel: CancelToken::new(),
        }
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    ///Builds the graph. Only capture-level errors and cancellation abort the
    /// build; an atom the mutator rejects yields an aborted behavior and the
    /// build continues.
    pub fn build<'c, C: Capture>(
        mut self,
        capture: &'c C,
    ) -> Result<DependencyGraph<'c>, BuildError> {
        let atoms = capture.atoms()?;
        let mut state = capture.new_state();

        let mut behaviors = Vec::with_capacity(atoms.len());
        let mut addresses = AddressMap::new();
        let mut memories = MemoryPool::new();
        let mut command_buffers = CommandBufferPool::new();
        let mut roots = FxHashSet::default();

        let start = Instant::now();
        for (index, atom) in atoms.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(BuildError::Cancelled);
            }
            #[cfg(feature = "log_reasoning")]
            log::trace!("getBehaviour: {} {:?}", index, atom.kind);

            let behavior = match self.mutator.mutate(&mut state, atom) {
                Ok(()) => dispatch::extract(
                    &mut addresses,
                    &mut memories,
                    &mut command_buffers,
                    &mut roots,
                    &state,
                    atom,
                ),
                Err(err) => {
                    log::error!("Atom {}: {}", index, err);
                    Behavior::aborted()
                }
            };
            behaviors.push(behavior);
        }
        log::debug!(
            target: crate::BUILD_COUNTER,
            "built {} behaviors in {:?}",
            behaviors.len(),
            start.elapsed()
        );

        Ok(DependencyGraph {
            atoms,
            behaviors,
            addresses,
            memories,
            command_buffers,
            roots,
        })
    }
}
