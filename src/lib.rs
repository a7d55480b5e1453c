//! Permit Leads Scoring API Library
//!
//! Turns municipal building permits into contractor sales leads and scores
//! them. The library holds the scoring pipeline, its persistence, the model
//! client and the HTTP handlers; `main.rs` wires them into a server.
//!
//! # Modules
//!
//! - `api`: API definitions.
//! - `core`: Core business logic.
//! - `integrations`: External service integrations.
//! - `circuit_breaker`: Circuit breaker for the model service.
//! - `classifier`: Trade/service classification of free text.
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Database storage operations.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `identity`: Canonical permit identifiers.
//! - `ingest`: Permit to lead conversion.
//! - `ml_client`: Model scoring client with rule fallback.
//! - `models`: Core data models.
//! - `personalization`: Per-user score adjustments.
//! - `router`: HTTP routes and middleware.
//! - `scoring`: Rules-based lead scorer.
//! - `services`: Scoring pipeline orchestration.

pub mod api;
pub mod core;
pub mod integrations;

pub mod circuit_breaker;
pub mod classifier;
pub mod config;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod identity;
pub mod ingest;
pub mod ml_client;
pub mod models;
pub mod personalization;
pub mod router;
pub mod scoring;
pub mod services;
