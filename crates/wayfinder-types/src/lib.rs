//! # wayfinder-types
//!
//! Core type definitions for the wayfinder route-prediction pipeline.
//!
//! Every other wayfinder crate depends on this one. It contains:
//!
//! - **[`route`]** -- routes, sessions, navigation contexts and the
//!   documents derived from them
//! - **[`config`]** -- configuration schema for generation, caching,
//!   vectorization and model storage
//! - **[`error`]** -- [`WayfinderError`], the top-level error type

pub mod config;
pub mod error;
pub mod route;

pub use config::Config;
pub use error::{Result, WayfinderError};
pub use route::{IntentType, NavigationContext, Route, RouteDocument, RouteScored, Session};
