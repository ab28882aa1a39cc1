//! Core logic - Framework-agnostic component persistence and dispatch
//!
//! Nothing in here talks to Discord directly: interactions come in through the
//! [`interaction::ComponentInteraction`] trait, which the bot layer implements on top of
//! serenity.

/// Id codec between internal ids and `custom_id`s
pub mod ids;

/// Component types, builders and loaded data
pub mod data;

/// Persistent handler registry and ephemeral handler registries
pub mod handlers;

/// Interaction filters and rejection handling
pub mod filters;

/// Framework-agnostic interaction and event types
pub mod interaction;

/// Rate limit buckets
pub mod ratelimit;

/// Database access for components
pub mod repository;

/// Timeout scheduling
pub mod timeout;

/// Component creation, deletion and awaiting
pub mod controller;

/// Interaction and timeout dispatch
pub mod listener;

/// Unhandled error reporting
pub mod exceptions;

/// Startup wiring
pub mod service;
