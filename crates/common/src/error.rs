//! Error types for the ad engine and its host collaborators.
//!
//! Selection and serving never fail outward; these errors come from
//! configuration loading, admin-side validation, and the host stores the
//! engine reads from. Callers wrap them in [`error_stack::Report`].

use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum AdEngineError {
    /// Settings could not be loaded or failed validation.
    #[display("Configuration error: {message}")]
    Configuration { message: String },

    /// The slot/ad store could not answer a query.
    #[display("Store error: {message}")]
    Store { message: String },

    /// The shared data registry or simple cache could not be read or written.
    #[display("Registry error: {message}")]
    Registry { message: String },

    #[display("Serialization error: {message}")]
    Serialization { message: String },

    /// Admin-submitted ad options were rejected by a slot strategy.
    #[display("Invalid ad options: {message}")]
    InvalidAdOptions { message: String },
}
