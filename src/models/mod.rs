// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod assignment;
pub mod user;

pub use assignment::{Assignment, AssignmentFields, AssignmentView, Subject};
pub use user::{Identity, User};
