// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tagprint core: types, configuration and error definitions shared across
// all crates.

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use error::{Result, TagprintError};
pub use store::{CredentialStore, MemoryCredentialStore};
pub use types::*;
