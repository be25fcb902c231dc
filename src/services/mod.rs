// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - external collaborators behind traits.

pub mod identity;

pub use identity::{GoogleSignIn, IdentityError, IdentityProvider};
