/*
Copyright 2024-2025 The Graphbridge Authors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

     https://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Bounded per-endpoint channel pool.
//!
//! At most `max_per_endpoint` channels coexist per endpoint; acquisition
//! waits for a slot when all are leased. Channels are created lazily and
//! returned on call completion regardless of the call's outcome; channels
//! observed broken are dropped instead of returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use snafu::prelude::*;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tonic::transport::{Channel, Endpoint as TonicEndpoint};

use crate::endpoints::Endpoint;
use crate::{InvalidEndpointSnafu, Result, TransportClosedSnafu};

#[derive(Debug)]
struct EndpointPool {
    slots: Arc<Semaphore>,
    idle: Mutex<Vec<Channel>>,
}

impl EndpointPool {
    fn new(max: usize) -> Self {
        EndpointPool {
            slots: Arc::new(Semaphore::new(max)),
            idle: Mutex::new(Vec::new()),
        }
    }
}

/// A leased channel. Return it with [`ConnectionPool::release`]; dropping the
/// lease frees the slot without recycling the channel.
#[derive(Debug)]
pub struct Lease {
    pub channel: Channel,
    endpoint: Endpoint,
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug)]
pub struct ConnectionPool {
    max_per_endpoint: usize,
    endpoints: DashMap<Endpoint, Arc<EndpointPool>>,
    closed: AtomicBool,
}

impl ConnectionPool {
    #[must_use]
    pub fn new(max_per_endpoint: usize) -> Self {
        ConnectionPool {
            max_per_endpoint: max_per_endpoint.max(1),
            endpoints: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Acquires a channel to `endpoint`, creating one lazily when no idle
    /// channel is available and the bound permits.
    pub async fn acquire(&self, endpoint: &Endpoint) -> Result<Lease> {
        ensure!(!self.closed.load(Ordering::Acquire), TransportClosedSnafu);

        let pool = self
            .endpoints
            .entry(Arc::clone(endpoint))
            .or_insert_with(|| Arc::new(EndpointPool::new(self.max_per_endpoint)))
            .clone();

        let permit = Arc::clone(&pool.slots)
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("pool semaphores are never closed"));
        ensure!(!self.closed.load(Ordering::Acquire), TransportClosedSnafu);

        let existing = {
            let mut idle = pool.idle.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            idle.pop()
        };
        let channel = match existing {
            Some(channel) => channel,
            None => TonicEndpoint::from_shared(format!("http://{endpoint}"))
                .context(InvalidEndpointSnafu {
                    endpoint: endpoint.to_string(),
                })?
                .connect_lazy(),
        };

        Ok(Lease {
            channel,
            endpoint: Arc::clone(endpoint),
            _permit: permit,
        })
    }

    /// Returns a lease. `reusable: false` drops the channel (broken
    /// connection); the slot frees either way. Channels returned to a closed
    /// or full pool are dropped.
    pub fn release(&self, lease: Lease, reusable: bool) {
        let Lease {
            channel,
            endpoint,
            _permit,
        } = lease;
        if !reusable || self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Some(pool) = self.endpoints.get(&endpoint) {
            let mut idle = pool.idle.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if idle.len() < self.max_per_endpoint {
                idle.push(channel);
            }
        }
    }

    /// Closes the pool: in-flight leases complete, but their channels are
    /// dropped on return and new acquisitions fail fast.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for entry in self.endpoints.iter() {
            let mut idle = entry
                .idle
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            idle.clear();
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[cfg(test)]
    fn idle_count(&self, endpoint: &Endpoint) -> usize {
        self.endpoints
            .get(endpoint)
            .map(|pool| {
                pool.idle
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .len()
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::from("localhost:4000")
    }

    #[tokio::test]
    async fn test_release_recycles_channels() {
        let pool = ConnectionPool::new(2);
        let ep = endpoint();

        let lease = pool.acquire(&ep).await.expect("acquire");
        assert_eq!(pool.idle_count(&ep), 0);
        pool.release(lease, true);
        assert_eq!(pool.idle_count(&ep), 1);

        let again = pool.acquire(&ep).await.expect("acquire recycled");
        assert_eq!(pool.idle_count(&ep), 0);
        pool.release(again, true);
    }

    #[tokio::test]
    async fn test_bound_blocks_until_release() {
        let pool = Arc::new(ConnectionPool::new(1));
        let ep = endpoint();

        let first = pool.acquire(&ep).await.expect("first lease");
        let waiter = {
            let pool = Arc::clone(&pool);
            let ep = ep.clone();
            tokio::spawn(async move { pool.acquire(&ep).await.map(|_| ()) })
        };
        // The second acquire cannot complete while the only slot is leased.
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        pool.release(first, true);
        waiter
            .await
            .expect("waiter joins")
            .expect("second lease succeeds");
    }

    #[tokio::test]
    async fn test_broken_channels_are_dropped() {
        let pool = ConnectionPool::new(2);
        let ep = endpoint();
        let lease = pool.acquire(&ep).await.expect("acquire");
        pool.release(lease, false);
        assert_eq!(pool.idle_count(&ep), 0);
    }

    #[tokio::test]
    async fn test_closed_pool_fails_fast() {
        let pool = ConnectionPool::new(2);
        let ep = endpoint();
        let lease = pool.acquire(&ep).await.expect("acquire before close");
        pool.close();

        pool.release(lease, true);
        assert_eq!(pool.idle_count(&ep), 0, "returns to a closed pool drop");

        let err = pool.acquire(&ep).await.expect_err("closed");
        assert!(matches!(err, crate::Error::TransportClosed));
    }
}
