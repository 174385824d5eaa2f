//! AI keyword discovery: history mining, candidate generation and
//! validation, the discovery cycle, and rejection learning.

pub mod analyzer;
pub mod engine;
pub mod generator;
pub mod llm;
pub mod rejection;
pub mod suggest;
pub mod validator;

pub use engine::{DiscoveryCycleResult, DiscoveryEngine};
