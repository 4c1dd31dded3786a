use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::cancel::{CancellationSource, CancellationToken};
use crate::log::{debug, warning};
use crate::native::Transport;

/// Per-connection disconnect notifications.
///
/// The first token requested for a connection starts a task waiting on
/// [`Transport::wait_for_disconnect`], the token is cancelled when that wait completes, even
/// with an error.
#[derive(Clone)]
pub struct DisconnectListener {
    transport: Arc<dyn Transport>,
    connections: Arc<Mutex<HashMap<u64, CancellationToken>>>,
}

impl DisconnectListener {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport, connections: Arc::default() }
    }

    /// Returns the token cancelled when `connection_id` closes.
    ///
    /// Without a tokio runtime the returned token is never cancelled.
    pub fn token_for_connection(&self, connection_id: u64) -> CancellationToken {
        let mut connections = self.connections.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(token) = connections.get(&connection_id) {
            return token.clone();
        }

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warning!("connection {connection_id}: no runtime, disconnect notification disabled");
            return CancellationToken::none();
        };

        let source = CancellationSource::new();
        let token = source.token();
        connections.insert(connection_id, token.clone());

        let transport = self.transport.clone();
        let registry = Arc::downgrade(&self.connections);
        handle.spawn(async move {
            match transport.wait_for_disconnect(connection_id).await {
                Ok(()) => {
                    debug!("connection {connection_id}: disconnected");
                }
                Err(_err) => {
                    debug!("connection {connection_id}: disconnect wait failed: {_err}");
                }
            }
            source.cancel();
            if let Some(registry) = registry.upgrade() {
                registry.lock().unwrap_or_else(PoisonError::into_inner).remove(&connection_id);
            }
        });

        token
    }

    /// Number of connections currently observed.
    pub fn len(&self) -> usize {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for DisconnectListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DisconnectListener").field("connections", &self.len()).finish()
    }
}
