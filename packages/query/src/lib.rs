#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Analytical query composition.
//!
//! [`QueryComposer`] turns an area set, a year set and a [`FilterSet`]
//! into one of the fixed [`QueryShape`]s over the `loan_applications` fact
//! table. Every caller-supplied value is bound as a numbered `$n`
//! parameter; the SQL text only ever contains placeholders.
//!
//! [`FilterSet`]: lending_atlas_query_models::FilterSet
//! [`QueryShape`]: lending_atlas_query_models::QueryShape

pub mod composer;
pub mod predicates;
pub mod shapes;

pub use composer::{ComposerLimits, QueryComposer};

/// Errors that can occur while composing a query.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// The request is malformed or exceeds a configured limit.
    #[error("Validation error: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },
}

impl QueryError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
