// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::{OAuthProvider, SessionConfig, SessionIssuer};
use crate::storage::CredentialStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CredentialStore>,
    pub sessions: SessionIssuer,
    /// `None` disables OAuth login
    pub identity: Option<OAuthProvider>,
}

impl AppState {
    pub fn new(store: Arc<CredentialStore>, session_config: SessionConfig) -> Self {
        let sessions = SessionIssuer::new(store.clone(), session_config);
        Self {
            store,
            sessions,
            identity: None,
        }
    }

    pub fn with_identity_provider(mut self, provider: OAuthProvider) -> Self {
        self.identity = Some(provider);
        self
    }
}
