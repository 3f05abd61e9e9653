use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use crate::models::Session;

/// Called with the access token and the session now behind it (`None`
/// after sign-out).
pub type SessionCallback = Box<dyn Fn(&str, Option<&Session>) + Send + Sync>;

/// Source of authenticated users, keyed by access token. Core logic never
/// reads this directly; handlers resolve the caller's session per request
/// and pass it down.
pub trait SessionProvider: Send + Sync {
    fn current_session(&self, token: &str) -> Option<Session>;

    /// Opens a session for `user_id` under a fresh access token.
    fn sign_in(&self, user_id: &str) -> Session;

    /// Ends the session behind `token`. Returns false if there was none.
    fn sign_out(&self, token: &str) -> bool;

    /// Registers `on_change`, called after every sign-in and sign-out. The
    /// callback stays registered until the returned handle is dropped or
    /// `unsubscribe` is called.
    fn subscribe(&self, on_change: SessionCallback) -> Subscription;
}

#[derive(Default)]
struct Listeners {
    next_id: u64,
    callbacks: HashMap<u64, SessionCallback>,
}

/// Process-local session table. Sessions are lost on restart.
#[derive(Default)]
pub struct InMemorySessionProvider {
    sessions: Mutex<HashMap<String, Session>>,
    listeners: Arc<Mutex<Listeners>>,
}

impl InMemorySessionProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn notify(&self, token: &str, session: Option<&Session>) {
        if let Ok(listeners) = self.listeners.lock() {
            for callback in listeners.callbacks.values() {
                callback(token, session);
            }
        }
    }
}

impl SessionProvider for InMemorySessionProvider {
    fn current_session(&self, token: &str) -> Option<Session> {
        self.sessions.lock().ok().and_then(|s| s.get(token).cloned())
    }

    fn sign_in(&self, user_id: &str) -> Session {
        let token = uuid::Uuid::new_v4().to_string();
        let session = Session {
            user_id: user_id.to_string(),
            access_token: Some(token.clone()),
        };
        if let Ok(mut sessions) = self.sessions.lock() {
            sessions.insert(token.clone(), session.clone());
        }
        tracing::info!(user_id = %session.user_id, "signed in");
        self.notify(&token, Some(&session));
        session
    }

    fn sign_out(&self, token: &str) -> bool {
        let removed = self.sessions.lock().ok().and_then(|mut s| s.remove(token));
        let Some(session) = removed else {
            return false;
        };
        tracing::info!(user_id = %session.user_id, "signed out");
        self.notify(token, None);
        true
    }

    fn subscribe(&self, on_change: SessionCallback) -> Subscription {
        let id = match self.listeners.lock() {
            Ok(mut listeners) => {
                let id = listeners.next_id;
                listeners.next_id += 1;
                listeners.callbacks.insert(id, on_change);
                id
            }
            Err(_) => u64::MAX,
        };
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }
}

/// Unsubscribe handle returned by `SessionProvider::subscribe`.
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            if let Ok(mut listeners) = listeners.lock() {
                listeners.callbacks.remove(&self.id);
            }
        }
    }
}
