//! End-to-end tests: candidates in, recommendations out, settlements
//! folded into persisted aggregates.

mod pipeline;
mod settlement;
