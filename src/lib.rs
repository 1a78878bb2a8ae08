//! Rail Sahayak - AI Completion Orchestration Engine
//!
//! This crate implements the conversational core of the Rail Sahayak
//! complaint-intake portal: it turns a user message plus conversation history
//! into a validated assistant reply, routing across multiple LLM backends
//! with tiered fallback, extracting function calls embedded in free-form
//! model text, and gating emergency-response disclosure behind an explicit
//! two-stage confirmation.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod orchestrator;
pub mod ports;
