//! Single-flight access to a device transport
//!
//! [`OperationGuard`] owns the transport behind one async mutex. An operation
//! calls [`OperationGuard::begin`], which waits for the lock and connects, and
//! finishes with [`Session::end`], which disconnects before the lock is
//! released. Concurrent callers queue on the mutex in FIFO order, so at most
//! one exchange per device is ever in flight.

use std::ops::{Deref, DerefMut};

use errors::GatewayResult;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::transport::Connection;

/// Mutual exclusion plus connect/disconnect bracketing around a transport
#[derive(Debug)]
pub struct OperationGuard<T> {
    transport: Mutex<T>,
}

impl<T: Connection> OperationGuard<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Mutex::new(transport),
        }
    }

    /// Wait for exclusive access and connect
    ///
    /// On connect failure the transport is left disconnected and the lock is
    /// released when the error is returned.
    pub async fn begin(&self) -> GatewayResult<Session<'_, T>> {
        let mut transport = self.transport.lock().await;
        if let Err(e) = transport.connect().await {
            transport.disconnect().await;
            return Err(e);
        }
        debug!("Session opened to {}", transport.endpoint());
        Ok(Session { transport })
    }

    pub async fn settings(&self) -> T::Settings {
        self.transport.lock().await.settings().clone()
    }

    /// Replace the transport settings between operations
    pub async fn update_settings(&self, settings: T::Settings) {
        let mut transport = self.transport.lock().await;
        transport.disconnect().await;
        transport.update_settings(settings);
    }
}

/// Connected, exclusively held transport
///
/// Dropping a session without calling [`Session::end`] still releases the
/// lock; the socket is then closed by the next `connect`.
pub struct Session<'a, T: Connection> {
    transport: MutexGuard<'a, T>,
}

impl<T: Connection> Session<'_, T> {
    /// Disconnect and release the lock
    pub async fn end(mut self) {
        self.transport.disconnect().await;
    }
}

impl<T: Connection> Deref for Session<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.transport
    }
}

impl<T: Connection> DerefMut for Session<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::test_utils::MockRegisterTransport;
    use crate::transport::RegisterTransport;

    #[tokio::test]
    async fn test_session_brackets_connect_and_disconnect() {
        let mock = MockRegisterTransport::new();
        let guard = OperationGuard::new(mock.clone());

        let mut session = guard.begin().await.unwrap();
        assert!(session.is_connected());
        session.read_registers(0, 1).await.unwrap();
        session.end().await;

        assert_eq!(mock.connect_count(), 1);
        assert_eq!(mock.disconnect_count(), 1);
        assert!(!mock.is_open());
    }

    #[tokio::test]
    async fn test_failed_connect_releases_lock() {
        let mock = MockRegisterTransport::new();
        mock.fail_connect(true);
        let guard = OperationGuard::new(mock.clone());

        assert!(guard.begin().await.is_err());
        mock.fail_connect(false);
        // would hang if the first attempt kept the lock
        let session = guard.begin().await.unwrap();
        session.end().await;
        assert_eq!(mock.connect_count(), 2);
    }

    #[tokio::test]
    async fn test_update_settings_replaces_wholesale() {
        let mock = MockRegisterTransport::new();
        let guard = OperationGuard::new(mock);
        let mut settings = guard.settings().await;
        settings.address = "192.168.0.25".into();
        settings.slave_id = 7;
        guard.update_settings(settings.clone()).await;
        assert_eq!(guard.settings().await, settings);
    }
}
