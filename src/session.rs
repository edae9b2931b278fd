#![forbid(unsafe_code)]

//! In-memory admin sessions.
//!
//! A session is a random bearer token held in a process-local set and carried
//! by the browser in an `HttpOnly` cookie. Nothing is persisted: restarting
//! the process logs every admin out, which is the intended lifetime.

use std::collections::HashSet;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use parking_lot::Mutex;
use rand_core::{OsRng, RngCore};

pub const SESSION_COOKIE: &str = "vidgate_session";

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Default)]
pub struct SessionStore {
    tokens: Mutex<HashSet<String>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a fresh admin session and returns its bearer token.
    pub fn open_admin(&self) -> String {
        let token = generate_token();
        self.tokens.lock().insert(token.clone());
        token
    }

    pub fn is_admin(&self, token: &str) -> bool {
        self.tokens.lock().contains(token)
    }

    /// Ends a session. Unknown tokens are ignored so logout is idempotent.
    pub fn close(&self, token: &str) {
        self.tokens.lock().remove(token);
    }
}

fn generate_token() -> String {
    let mut raw = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut raw);
    URL_SAFE_NO_PAD.encode(raw)
}

/// Pulls one cookie's value out of a `Cookie` request header.
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (candidate, value) = pair.trim().split_once('=')?;
        if candidate.trim() == name {
            Some(value.trim())
        } else {
            None
        }
    })
}
