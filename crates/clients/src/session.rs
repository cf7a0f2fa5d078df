use crate::ClientDescriptor;
use livedev_protocol::RemoteTransport;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

/// One live connection to a remote page.
pub struct Session {
    id: SessionId,
    client: Arc<ClientDescriptor>,
    transport: Arc<dyn RemoteTransport>,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn client(&self) -> &ClientDescriptor {
        &self.client
    }

    pub fn transport(&self) -> &dyn RemoteTransport {
        self.transport.as_ref()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("client", &self.client.id())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Connected { session: SessionId, client: String },
    Disconnected { session: SessionId, client: String },
}

/// Active sessions shared by the registry and every client it created.
pub(crate) struct SessionTable {
    sessions: Mutex<Vec<Arc<Session>>>,
    next_id: AtomicU64,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionTable {
    pub(crate) fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            sessions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    pub(crate) fn open(
        &self,
        client: Arc<ClientDescriptor>,
        transport: Arc<dyn RemoteTransport>,
    ) -> Arc<Session> {
        let session = Arc::new(Session {
            id: SessionId(self.next_id.fetch_add(1, Ordering::SeqCst)),
            client,
            transport,
        });
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&session));

        log::info!("{} connected ({})", session.id, session.client.name());
        let _ = self.events.send(SessionEvent::Connected {
            session: session.id,
            client: session.client.id().to_string(),
        });
        session
    }

    pub(crate) fn close(&self, id: SessionId) -> Option<Arc<Session>> {
        let removed = {
            let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            let index = sessions.iter().position(|session| session.id == id)?;
            sessions.remove(index)
        };

        log::info!("{} disconnected ({})", removed.id, removed.client.name());
        let _ = self.events.send(SessionEvent::Disconnected {
            session: removed.id,
            client: removed.client.id().to_string(),
        });
        Some(removed)
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}
