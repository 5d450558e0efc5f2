//! Game-facing state: the wire model pushed by the server, the per-player
//! ledger projection, the local override layer, and the session that ties
//! them to the staging coordinator. The session lives in WASM memory
//! (thread_local) for the lifetime of the Web Worker.

pub mod ledger;
pub mod model;
pub mod overrides;
pub mod session;
