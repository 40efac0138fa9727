//! Superseding in-flight requests per session.
//!
//! Every new request for a session bumps that session's generation. A result
//! computed under an older generation is stale and must not be shown.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestTicket {
    session: String,
    generation: u64,
}

impl RequestTicket {
    pub fn session(&self) -> &str {
        &self.session
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

#[derive(Debug, Default)]
struct Generations {
    /// Last generation handed out, across all sessions.
    last: u64,
    current: HashMap<String, u64>,
}

#[derive(Debug, Default)]
pub struct RequestTracker {
    generations: Mutex<Generations>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a request for `session`, superseding any earlier one.
    pub fn begin(&self, session: &str) -> RequestTicket {
        let mut generations = self.generations.lock().unwrap_or_else(|e| e.into_inner());
        generations.last += 1;
        let generation = generations.last;
        generations.current.insert(session.to_string(), generation);
        RequestTicket {
            session: session.to_string(),
            generation,
        }
    }

    pub fn is_current(&self, ticket: &RequestTicket) -> bool {
        let generations = self.generations.lock().unwrap_or_else(|e| e.into_inner());
        generations.current.get(&ticket.session) == Some(&ticket.generation)
    }

    /// Pass `value` through if `ticket` is still the latest for its session.
    pub fn accept<T>(&self, ticket: &RequestTicket, value: T) -> Option<T> {
        if self.is_current(ticket) {
            Some(value)
        } else {
            debug!(
                session = %ticket.session,
                generation = ticket.generation,
                "dropping stale result"
            );
            None
        }
    }

    /// Forget a session entirely; outstanding tickets become stale.
    pub fn end(&self, session: &str) {
        let mut generations = self.generations.lock().unwrap_or_else(|e| e.into_inner());
        generations.current.remove(session);
    }
}
