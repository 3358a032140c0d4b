//! # Musegraph: Graph Execution Engine for Generative Canvases
//!
//! Musegraph models a node-and-wire canvas for AI content generation: typed
//! nodes connected by typed edges, with copy-on-write snapshots, gated
//! connection admission, recursive input resolution, and an orchestrator
//! that drives generation runs against pluggable backends.
//!
//! ## Core Concepts
//!
//! - **Nodes**: Typed units carrying a closed [`node::NodePayload`] union
//! - **Graph**: Immutable snapshots behind a shared [`graph::GraphStore`]
//! - **Connections**: Admitted through a compatibility table plus per-port
//!   capacity policies ([`graph::connect`])
//! - **Resolution**: Read-only traversal computing effective inputs,
//!   including derived crops ([`resolver`])
//! - **Runs**: Guard, resolve, dispatch, write-back
//!   ([`runtime::Orchestrator`]), with async video jobs polled to a
//!   terminal state ([`runtime::TaskPoller`])
//!
//! ## Quick Start
//!
//! ### Building a Graph
//!
//! ```
//! use musegraph::graph::{connect, Connection, Graph};
//! use musegraph::node::{Node, NodePayload};
//!
//! let graph = Graph::default()
//!     .with_node(Node::with_id("prompt", NodePayload::prompt("A lighthouse at dusk")))
//!     .with_node(Node::with_id("gen", NodePayload::generate()));
//!
//! let graph = connect(
//!     &graph,
//!     &Connection {
//!         source: "prompt".into(),
//!         source_port: "text".into(),
//!         target: "gen".into(),
//!         target_port: "text".into(),
//!     },
//! )
//! .expect("prompt feeds generate");
//! assert_eq!(graph.edge_count(), 1);
//! ```
//!
//! ### Resolving Inputs
//!
//! ```
//! # use musegraph::graph::{Edge, Graph};
//! # use musegraph::node::{Node, NodePayload};
//! # let graph = Graph::default()
//! #     .with_node(Node::with_id("prompt", NodePayload::prompt("  A lighthouse  ")))
//! #     .with_node(Node::with_id("gen", NodePayload::generate()))
//! #     .with_edge(Edge::new("prompt", "text", "gen", "text"));
//! use musegraph::resolver::resolve_text;
//!
//! // Trimmed; whitespace-only sources resolve to nothing.
//! assert_eq!(resolve_text(&graph, "gen").as_deref(), Some("A lighthouse"));
//! ```
//!
//! ### Running Nodes
//!
//! Runs go through [`runtime::Orchestrator`], which owns nothing but a
//! [`graph::GraphStore`] handle and the [`runtime::Backends`] trait objects.
//! See the `runtime` module docs for the dispatch rules (create / edit /
//! blend by input cardinality, batch slot semantics, video job polling).
//!
//! ## Module Guide
//!
//! - [`types`] - Shared identifiers, port kinds, run status
//! - [`media`] - Media references (embedded / remote / ephemeral) and crops
//! - [`node`] - The closed node payload union
//! - [`graph`] - Snapshots, the store, connection validation and capacity
//! - [`resolver`] - Effective-input resolution, crop derivation
//! - [`runtime`] - Orchestrator, poller, runtime configuration
//! - [`backends`] - External collaborator contracts
//! - [`event_bus`] - Engine event fan-out to pluggable sinks

pub mod backends;
pub mod event_bus;
pub mod graph;
pub mod media;
pub mod node;
pub mod resolver;
pub mod runtime;
pub mod telemetry;
pub mod types;
pub mod utils;
