//! Graph data model and mutation primitives.
//!
//! This module is the engine's source of truth for topology:
//!
//! - [`store`]: copy-on-write [`Graph`] snapshots and the shared
//!   [`GraphStore`] handle
//! - [`edge`]: directed, port-addressed [`Edge`] values
//! - [`validate`]: the connection compatibility table and
//!   [`is_valid_connection`]
//! - [`capacity`]: capacity policies and the gated [`connect`] path
//!
//! User actions flow through `is_valid_connection`/`can_accept_connection`
//! (UI gating) and `connect` (actual insertion); the orchestrator mutates
//! only through [`GraphStore::update_node`] and
//! [`Graph::patch_node_data`].

pub mod capacity;
pub mod edge;
pub mod store;
pub mod validate;

pub use capacity::{ConnectError, can_accept_connection, connect};
pub use edge::Edge;
pub use store::{Graph, GraphError, GraphStore};
pub use validate::{Accepts, CapacityPolicy, Connection, PortRule, is_valid_connection, port_rule};
