// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Polaris Auth Server - Device Onboarding & Session Token Service
//!
//! Authenticates IoT devices that sign their own tokens with a provisioned
//! per-device key, issues and rotates user session tokens after OAuth login,
//! and tracks devices through the onboarding waiting room.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Token codec, device/user extractors, session lifecycle, OAuth
//! - `onboarding` - Waiting-room state machine
//! - `storage` - Credential store (redb)

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod onboarding;
pub mod state;
pub mod storage;
