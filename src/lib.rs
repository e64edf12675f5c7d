//! `workshop` — incremental calendar and mail synchronization core.
//!
//! This crate provides reference-counted shared resources, live windowed
//! list views (TOCs) with a namespace registry, the calendar event
//! reconciler with Google and Microsoft Graph adapters, the task mutation
//! boundary, and ActiveSync folder change enumeration.

pub mod activesync;
pub mod chew;
pub mod config;
pub mod context;
pub mod error;
pub mod model;
pub mod resource;
pub mod task;
pub mod toc;
