use crate::error::{ClientError, Result};
use crate::session::SessionTable;
use crate::validation::{validate_client_id, validate_client_name};
use crate::{ClientDescriptor, Session, SessionEvent, SessionId};
use futures::future::try_join_all;
use livedev_protocol::RemoteTransport;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, watch};

/// Clients known out of the box.
pub const DEFAULT_CLIENTS_JSON: &str = r#"{ "chrome": { "name": "Google Chrome" } }"#;

const DEFAULT_EVENT_CAPACITY: usize = 64;

/// A registered client kind; connects transports into sessions.
pub struct Client {
    descriptor: Arc<ClientDescriptor>,
    table: Arc<SessionTable>,
}

impl Client {
    pub fn id(&self) -> &str {
        self.descriptor.id()
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &ClientDescriptor {
        &self.descriptor
    }

    /// Runs every session initializer concurrently, then opens a session.
    ///
    /// The first failing initializer aborts the connect and no session is
    /// recorded.
    pub async fn connect(&self, transport: Arc<dyn RemoteTransport>) -> Result<Arc<Session>> {
        let initializers = self.descriptor.session_initializers();
        try_join_all(
            initializers
                .iter()
                .map(|initializer| initializer.initialize(&self.descriptor, transport.as_ref())),
        )
        .await
        .map_err(|err| {
            log::warn!("{}: session initializer failed: {err}", self.id());
            ClientError::InitializerFailed {
                client: self.id().to_string(),
                reason: err.to_string(),
            }
        })?;

        Ok(self.table.open(Arc::clone(&self.descriptor), transport))
    }

    /// Sessions currently open for this client.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.table
            .snapshot()
            .into_iter()
            .filter(|session| session.client().id() == self.id())
            .collect()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("id", &self.id())
            .field("name", &self.name())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct ClientDefinition {
    name: String,
}

/// Outcome of [`ClientRegistry::define_clients_from_json`].
#[derive(Debug, Default)]
pub struct DefinitionReport {
    pub registered: Vec<Arc<Client>>,
    pub failed: Vec<(String, ClientError)>,
}

#[derive(Default)]
struct RegistryState {
    clients: HashMap<String, Arc<Client>>,
    /// One readiness channel per id somebody is waiting for.
    pending: HashMap<String, watch::Sender<Option<Arc<Client>>>>,
}

/// Process-wide set of client kinds and their active sessions.
///
/// Owned by the host and passed by reference; starts empty.
pub struct ClientRegistry {
    state: Mutex<RegistryState>,
    table: Arc<SessionTable>,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    pub fn with_event_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            table: Arc::new(SessionTable::new(capacity)),
        }
    }

    /// Registers a client kind and wakes everyone waiting for its id.
    ///
    /// Invalid ids or names and duplicate ids are rejected and logged; an
    /// existing registration is never replaced.
    pub fn register_client(&self, descriptor: ClientDescriptor) -> Result<Arc<Client>> {
        if let Err(err) = validate_client_id(descriptor.id())
            .and_then(|()| validate_client_name(descriptor.name()))
        {
            log::error!("rejecting client {:?}: {err}", descriptor.id());
            return Err(err.into());
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.clients.contains_key(descriptor.id()) {
            log::error!("client {:?} is already registered", descriptor.id());
            return Err(ClientError::DuplicateClient(descriptor.id().to_string()));
        }

        let client = Arc::new(Client {
            descriptor: Arc::new(descriptor),
            table: Arc::clone(&self.table),
        });
        let id = client.id().to_string();
        state.clients.insert(id.clone(), Arc::clone(&client));
        if let Some(ready) = state.pending.remove(&id) {
            ready.send_replace(Some(Arc::clone(&client)));
        }
        drop(state);

        log::debug!("registered client {id} ({})", client.name());
        Ok(client)
    }

    pub fn client(&self, id: &str) -> Option<Arc<Client>> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clients
            .get(id)
            .cloned()
    }

    pub fn client_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clients
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Resolves once a client with `id` is registered (immediately if it already is).
    pub async fn wait_until_client_ready(&self, id: &str) -> Result<Arc<Client>> {
        let mut ready = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(client) = state.clients.get(id) {
                return Ok(Arc::clone(client));
            }
            state
                .pending
                .entry(id.to_string())
                .or_insert_with(|| watch::channel(None).0)
                .subscribe()
        };

        let client = ready
            .wait_for(Option::is_some)
            .await
            .map_err(|_| ClientError::RegistryClosed)?
            .as_ref()
            .cloned();
        client.ok_or(ClientError::RegistryClosed)
    }

    /// Snapshot of the active sessions; not kept current after return.
    pub fn get_sessions(&self) -> Vec<Arc<Session>> {
        self.table.snapshot()
    }

    pub fn disconnect(&self, session: SessionId) -> Result<Arc<Session>> {
        self.table
            .close(session)
            .ok_or(ClientError::UnknownSession(session))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.table.subscribe()
    }

    /// Registers every entry of `{ "<id>": { "name": "<name>" } }`.
    ///
    /// `configure` attaches updaters and initializers before registration.
    /// Malformed JSON fails as a whole; a bad entry only fails itself.
    pub fn define_clients_from_json<F>(&self, json: &str, configure: F) -> Result<DefinitionReport>
    where
        F: Fn(ClientDescriptor) -> ClientDescriptor,
    {
        let entries: BTreeMap<String, Value> = serde_json::from_str(json)?;
        let mut report = DefinitionReport::default();

        for (id, value) in entries {
            let outcome = serde_json::from_value::<ClientDefinition>(value)
                .map_err(ClientError::from)
                .and_then(|definition| {
                    self.register_client(configure(ClientDescriptor::new(id.clone(), definition.name)))
                });
            match outcome {
                Ok(client) => report.registered.push(client),
                Err(err) => {
                    log::warn!("client definition {id:?} skipped: {err}");
                    report.failed.push((id, err));
                }
            }
        }

        Ok(report)
    }

    pub fn define_default_clients<F>(&self, configure: F) -> Result<DefinitionReport>
    where
        F: Fn(ClientDescriptor) -> ClientDescriptor,
    {
        self.define_clients_from_json(DEFAULT_CLIENTS_JSON, configure)
    }
}
