//! # TaskMesh Testing Utils
//!
//! Shared testing utilities for the taskmesh workspace: in-memory
//! implementations of every port trait in `taskmesh-core`, builders for test
//! data and a few async helpers.
//!
//! ## Usage
//!
//! ```toml
//! [dev-dependencies]
//! taskmesh-testing-utils = { path = "../testing-utils" }
//! ```
//!
//! ```rust
//! use taskmesh_testing_utils::mocks::*;
//! use taskmesh_testing_utils::builders::*;
//! ```

pub mod builders;
pub mod helpers;
pub mod mocks;

pub use builders::*;
pub use helpers::*;
pub use mocks::*;
