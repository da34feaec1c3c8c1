//! Quorum refinement pipelines over an OpenAI-compatible backend.
//!
//! - `backend`: the generation backend trait and its HTTP implementation
//! - `contracts`: JSON extraction, required keys, bounded retry
//! - `modes`: fan-out executor, debate and sequential engines, driver
//! - `prompts`: per-stage prompt builders
//! - `config`, `input`, `report`: the CLI's file and settings plumbing

pub mod backend;
pub mod config;
pub mod contracts;
pub mod input;
pub mod modes;
pub mod prompts;
pub mod report;
