//! Neo4j connection adapter.
//!
//! Owns the pooled driver connection and gives the store one narrow surface:
//! run a parameterized statement and collect rows, or run it for effect only.
//! Each statement executes in its own auto-committed transaction; atomicity
//! across statements is deliberately not provided here; every store
//! operation is phrased as a single statement.
//!
//! Errors are surfaced unmodified as [`GraphError::Database`]; there are no
//! local retries.

use neo4rs::{Graph, Query, query};
use tracing::{info, warn};

use crate::error::GraphError;

/// Schema bootstrap statements. `IF NOT EXISTS` makes the whole set
/// idempotent across restarts.
const CONSTRAINTS: &[&str] = &[
    "CREATE CONSTRAINT user_id IF NOT EXISTS FOR (u:User) REQUIRE u.id IS UNIQUE",
    "CREATE CONSTRAINT session_id IF NOT EXISTS FOR (s:Session) REQUIRE s.id IS UNIQUE",
    // Composite open-session key ("{user_id}:{kind}"), only set on sessions
    // made by get-or-create, so concurrent calls converge on one node.
    "CREATE CONSTRAINT session_open_key IF NOT EXISTS FOR (s:Session) REQUIRE s.open_key IS UNIQUE",
    "CREATE CONSTRAINT question_id IF NOT EXISTS FOR (q:Question) REQUIRE q.id IS UNIQUE",
    "CREATE CONSTRAINT message_id IF NOT EXISTS FOR (m:Message) REQUIRE m.id IS UNIQUE",
    "CREATE CONSTRAINT tag_name IF NOT EXISTS FOR (t:Tag) REQUIRE t.name IS UNIQUE",
];

const INDEXES: &[&str] = &[
    "CREATE INDEX message_session IF NOT EXISTS FOR (m:Message) ON (m.session_id)",
    "CREATE INDEX session_kind IF NOT EXISTS FOR (s:Session) ON (s.kind)",
];

/// Thin wrapper over the `neo4rs` driver.
#[derive(Clone)]
pub struct GraphAdapter {
    graph: Graph,
}

impl GraphAdapter {
    /// Open a pooled connection to the server.
    pub async fn connect(
        uri: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, GraphError> {
        let graph = Graph::new(uri, username, password).await?;
        info!(uri = %uri, "connected to graph database");
        Ok(Self { graph })
    }

    /// Create uniqueness constraints and indexes. Individual failures are
    /// logged and skipped so startup survives older server versions.
    pub async fn ensure_schema(&self) -> Result<(), GraphError> {
        for stmt in CONSTRAINTS.iter().chain(INDEXES) {
            if let Err(e) = self.graph.run(query(stmt)).await {
                warn!(error = %e, "schema statement skipped");
            }
        }
        Ok(())
    }

    /// Execute a statement and collect all rows.
    pub async fn fetch(&self, q: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(q).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a statement and return the first row, if any.
    pub async fn fetch_one(&self, q: Query) -> Result<Option<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(q).await?;
        Ok(stream.next().await?)
    }

    /// Execute a statement for effect only.
    pub async fn run(&self, q: Query) -> Result<(), GraphError> {
        self.graph.run(q).await?;
        Ok(())
    }
}

impl std::fmt::Debug for GraphAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphAdapter").finish_non_exhaustive()
    }
}
