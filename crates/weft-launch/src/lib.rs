//! Dataflow supervisor and CLI for weft.
//!
//! `run-dataflow` spawns one child process per node spec and supervises the
//! graph (heartbeats in, SIGTERM out); `run-node` is the child entry point;
//! `draw-dataflow` renders the wiring as a Mermaid graph.

pub mod cli;
pub mod draw;
pub mod manager;
pub mod process;
pub mod runner;

pub use cli::{Command, DrawDataflowArgs, RunDataflowArgs, RunNodeArgs, WeftArgs};
pub use manager::{Health, ManagerError, NodeManager};

// Linking the built-in node classes into every binary that uses this crate;
// their registrations resolve through inventory at startup.
pub use weft_nodes as builtin_nodes;
