use std::{collections::BTreeMap, time::Duration};

use log::{debug, info};
use parking_lot::Mutex;
use rand::seq::IteratorRandom;
use tokio::{sync::Notify, time};

use crate::proxy::{ClientId, ClientProxy};

/// The registry of the clients currently connected to the server.
pub struct ClientManager<P: ClientProxy> {
    clients: Mutex<BTreeMap<ClientId, P>>,
    arrived: Notify,
}

impl<P: ClientProxy> Default for ClientManager<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: ClientProxy> ClientManager<P> {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(BTreeMap::new()),
            arrived: Notify::new(),
        }
    }

    /// Adds `client` to the registry and wakes up every pending `wait_for`.
    ///
    /// # Returns
    /// `false` if a client with the same id was already registered, it's left untouched.
    pub fn register(&self, client: P) -> bool {
        let id = client.id();

        let inserted = {
            let mut clients = self.clients.lock();
            if clients.contains_key(&id) {
                false
            } else {
                clients.insert(id, client);
                true
            }
        };

        if inserted {
            info!(client = id; "client registered");
            self.arrived.notify_waiters();
        }

        inserted
    }

    pub fn unregister(&self, id: ClientId) {
        if self.clients.lock().remove(&id).is_some() {
            info!(client = id; "client unregistered");
        }
    }

    pub fn num_available(&self) -> usize {
        self.clients.lock().len()
    }

    /// A snapshot of every registered client.
    pub fn all(&self) -> Vec<P> {
        self.clients.lock().values().cloned().collect()
    }

    /// Waits until at least `n` clients are registered.
    ///
    /// # Arguments
    /// * `n` - The amount of clients to wait for.
    /// * `timeout` - How long to wait for, `None` waits forever.
    ///
    /// # Returns
    /// `true` if `n` clients are available, `false` if the timeout went off first.
    pub async fn wait_for(&self, n: usize, timeout: Option<Duration>) -> bool {
        let wait = async {
            loop {
                let notified = self.arrived.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                if self.num_available() >= n {
                    return;
                }

                notified.await;
            }
        };

        match timeout {
            Some(timeout) => time::timeout(timeout, wait).await.is_ok(),
            None => {
                wait.await;
                true
            }
        }
    }

    /// Picks `n` distinct clients uniformly at random once `min` are available.
    ///
    /// # Arguments
    /// * `n` - The amount of clients wanted, capped by the amount available.
    /// * `min` - The amount of clients to wait for before sampling.
    /// * `timeout` - How long to wait for `min` clients, `None` waits forever.
    ///
    /// # Returns
    /// The sampled clients, empty if `min` clients didn't show up in time.
    pub async fn sample(&self, n: usize, min: usize, timeout: Option<Duration>) -> Vec<P> {
        if !self.wait_for(min, timeout).await {
            debug!(wanted = min, available = self.num_available(); "not enough clients to sample");
            return Vec::new();
        }

        let mut sampled = {
            let clients = self.clients.lock();
            let mut rng = rand::rng();
            clients.values().cloned().choose_multiple(&mut rng, n)
        };

        sampled.sort_by_key(|client| client.id());
        sampled
    }
}
