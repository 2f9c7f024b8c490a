//! # Vulkan trace dependency graph
//!
//! Builds, for a captured stream of Vulkan commands (called *atoms*), a per-atom
//! record of which abstract *state cells* the atom reads, modifies and writes.
//! A dead-code-elimination pass can then walk this graph backwards from a set of
//! roots (usually the presentation queues) and drop every atom that is not live.
//!
//! On a high level the build is a single streaming pass: each atom is first applied
//! to a reference state (see [TrackedState](state::TrackedState)), then handed to the
//! behavior extractor which resolves its parameters into [state keys](StateKey) and
//! canonical [addresses](StateAddress).
//!
//! # State keys
//! Raw Vulkan handles become tagged handle keys. Device memories and command buffers
//! need composition: a memory owns its handle cell and a growing history of
//! `[start, end)` bindings, each with an opaque data cell; a command buffer owns its
//! handle cell and its records cell.
//!
//! # Recorded commands
//! A `vkCmd*` atom only touches the target command buffer's records at record time.
//! Its effective reads and writes are attached as [deferred effects](DeferredEffect)
//! and materialized into the behavior of every `vkQueueSubmit` that submits the
//! command buffer.

#![deny(warnings)]

pub use ash;

mod address;
pub use address::{AddressMap, HandleKind, StateAddress, StateKey};

mod behavior;
pub use behavior::{AccessKind, Behavior};

mod memory;
pub use memory::{Binding, BindingKey, MemoryKey, MemoryPool};

mod command_buffer;
pub use command_buffer::{CommandBufferKey, CommandBufferPool, DeferredEffect};

pub mod atom;
pub use atom::{Atom, AtomKind, AtomOrigin};

pub mod state;
pub use state::{StateMutator, TrackedState, TrackingMutator};

mod dispatch;

mod graph;
pub use graph::{CancelToken, Capture, DependencyGraph, GraphBuilder, InMemoryCapture};

mod error;
pub use error::{BuildError, CaptureError, MutationError};

///Log target under which the build reports its timing.
pub const BUILD_COUNTER: &str = "dependencyGraph.build";
