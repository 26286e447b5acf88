//! hoopflow: a deterministic executor for business flows expressed as
//! directed graphs of typed nodes ("hoops").
//!
//! A caller submits a flow plus an input map; the engine walks the graph,
//! renders each node's parameters against the layered execution context,
//! dispatches the handler registered for the node's hoop kind, records
//! outputs, routes on branch decisions, and publishes one execution event
//! per attempted node. Remote collaborators sit behind traits so the whole
//! engine runs hermetically in tests.

pub mod clients;
pub mod config;
pub mod engine;
pub mod events;
pub mod flow;
pub mod hoops;
pub mod metrics;
pub mod render;

pub use engine::{Engine, RetryPolicy, RunOptions, RunReport, RunStatus};
pub use flow::Flow;
pub use hoops::Registry;
