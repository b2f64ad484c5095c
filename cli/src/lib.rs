// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! widthswarm CLI library - exposes testable components
//!
//! # Architecture
//!
//! - **Layer:** Interface / Presentation Layer
//! - **Purpose:** Logging setup, the process launcher and report rendering
//!   shared by the `widthswarm` and `widthswarm-agent` binaries

pub mod commands;
pub mod launcher;
pub mod logging;
pub mod report;

pub use launcher::ProcessLauncher;
pub use logging::{init_logging, level_for_verbosity};
