//! Ad selection and rendering for forum pages.
//!
//! Ads are attached to slots, and every slot has a slot class naming the
//! placement strategy that decides where its ads appear. A cached snapshot of
//! the active slots and ads is loaded once per request into an
//! [`engine::Engine`], which picks ads for page positions, serves each slot
//! and ad at most once, logs views and renders the chosen ads into template
//! hooks.
//!
//! # Modules
//!
//! - [`criteria`]: Visitor targeting rules attached to ads
//! - [`engine`]: Per-request selection, serving and hook rendering
//! - [`error`]: Error types
//! - [`memory`]: In-process store, registry, cache and view log
//! - [`models`]: Slot and ad records
//! - [`served`]: Available/served bookkeeping for one request
//! - [`settings`]: Configuration loading and validation
//! - [`slots`]: Slot strategies and their registry
//! - [`snapshot`]: The cached active-ads snapshot
//! - [`store`]: Host collaborator traits
//! - [`test_support`]: Test fixtures
//! - [`visitor`]: The current visitor

pub mod criteria;
pub mod engine;
pub mod error;
pub mod memory;
pub mod models;
pub mod served;
pub mod settings;
pub mod slots;
pub mod snapshot;
pub mod store;
pub mod test_support;
pub mod visitor;
