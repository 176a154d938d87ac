use super::session::Session;
use super::transaction::TransactionId;
use std::collections::VecDeque;
use std::sync::Arc;

/// Stack of sessions bound for one datastore. The current session is the
/// most recently added one.
#[derive(Debug)]
pub struct SessionHolder {
    sessions: VecDeque<Arc<Session>>,
    creator: Option<String>,
    synchronized_with_transaction: bool,
}

impl SessionHolder {
    pub fn new(session: Arc<Session>) -> Self {
        let mut sessions = VecDeque::new();
        sessions.push_back(session);
        Self {
            sessions,
            creator: None,
            synchronized_with_transaction: false,
        }
    }

    pub fn with_creator(session: Arc<Session>, creator: &str) -> Self {
        let mut holder = Self::new(session);
        holder.creator = Some(creator.to_string());
        holder
    }

    pub fn creator(&self) -> Option<&str> {
        self.creator.as_deref()
    }

    /// Current session
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.sessions.back()
    }

    /// Current session, discarding closed sessions from the top first.
    pub fn validated_session(&mut self) -> Option<Arc<Session>> {
        while let Some(top) = self.sessions.back() {
            if top.is_connected() {
                return Some(Arc::clone(top));
            }
            self.sessions.pop_back();
        }
        None
    }

    pub fn add_session(&mut self, session: Arc<Session>) {
        if self.synchronized_with_transaction {
            session.set_synchronized_with_transaction(true);
        }
        self.sessions.push_back(session);
    }

    pub fn remove_session(&mut self, session: &Session) -> bool {
        match self.sessions.iter().position(|s| s.id() == session.id()) {
            Some(index) => {
                self.sessions.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains_session(&self, session: &Session) -> bool {
        self.sessions.iter().any(|s| s.id() == session.id())
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Arc<Session>> {
        self.sessions.iter()
    }

    /// Active transaction of the current session
    pub fn transaction(&self) -> Option<TransactionId> {
        self.session().and_then(|s| s.transaction())
    }

    pub fn is_synchronized_with_transaction(&self) -> bool {
        self.synchronized_with_transaction
    }

    /// Applies to every held session.
    pub fn set_synchronized_with_transaction(&mut self, synchronized: bool) {
        self.synchronized_with_transaction = synchronized;
        for session in &self.sessions {
            session.set_synchronized_with_transaction(synchronized);
        }
    }
}
