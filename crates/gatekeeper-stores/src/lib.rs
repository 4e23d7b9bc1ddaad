//! Browser extension store clients for Gatekeeper
//!
//! This crate provides integration with the browser extension stores and the
//! pipeline that drives a release through them.
//!
//! ## Supported Stores
//!
//! - **Chrome**: Chrome Web Store API v1.1
//! - **Firefox**: addons.mozilla.org, signed via `web-ext`
//! - **Edge**: Microsoft Edge Add-ons API v1
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use gatekeeper_core::{CancelToken, MetricsCollector, RetryPolicy};
//! use gatekeeper_stores::{PublishPipeline, PublishRequest, StoreRegistry};
//!
//! let (registry, _skipped) = StoreRegistry::from_config(&config, &config.stores());
//! let pipeline = PublishPipeline::new(
//!     RetryPolicy::new(config.retry_config()),
//!     Arc::new(MetricsCollector::new()),
//!     CancelToken::new(),
//! );
//!
//! for client in registry.all() {
//!     let outcome = pipeline.publish(client.as_ref(), &request).await;
//! }
//! ```
//!
//! Failed runs can be filed as GitHub issues with [`reporter::IssueReporter`].

pub mod auth;
pub mod health;
pub mod manifest;
pub mod packaging;
pub mod pipeline;
pub mod registry;
pub mod reporter;
pub mod traits;
pub mod types;
pub mod webext;

mod http;

pub mod chrome;
pub mod edge;
pub mod firefox;

pub use auth::{validate_token, TokenValidation};
pub use health::{HealthCheck, HealthReport};
pub use pipeline::{PublishPipeline, PublishRequest, Stage, StageFailure, StoreOutcome};
pub use registry::StoreRegistry;
pub use reporter::{IssueReporter, ReportContext};
pub use traits::StoreClient;
pub use types::*;
