//! Destination connection handling.
//!
//! The engine acquires one destination session per collection import (plus
//! short-lived sessions for run-level bookkeeping) and releases each session
//! explicitly after use.

use anyhow::Context;
use tokio_postgres::{Client, NoTls};

/// Factory for destination sessions, configured once per engine instance.
#[derive(Clone, Debug)]
pub struct Destination {
    config: String,
}

impl Destination {
    /// Create a destination from a PostgreSQL connection string.
    pub fn new(config: impl Into<String>) -> Self {
        Self {
            config: config.into(),
        }
    }

    /// Open a new session against the destination.
    pub async fn session(&self) -> anyhow::Result<PgSession> {
        let (client, connection) = tokio_postgres::connect(&self.config, NoTls)
            .await
            .context("failed to connect to the destination database")?;

        let connection_task = tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("Destination connection error: {e}");
            }
        });

        Ok(PgSession {
            client,
            connection_task,
        })
    }
}

/// One open destination session.
///
/// Dereferences to the underlying [`Client`]; call [`PgSession::close`]
/// when done so the connection task is torn down promptly.
pub struct PgSession {
    client: Client,
    connection_task: tokio::task::JoinHandle<()>,
}

impl PgSession {
    /// Release the session and its connection task.
    pub fn close(self) {
        drop(self.client);
        self.connection_task.abort();
    }
}

impl std::ops::Deref for PgSession {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.client
    }
}

impl std::ops::DerefMut for PgSession {
    fn deref_mut(&mut self) -> &mut Client {
        &mut self.client
    }
}
