//! Error types for the MongoDB storage implementation.

use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Convenient result alias returning [`MongoDaoError`] failures.
pub type MongoResult<T> = Result<T, MongoDaoError>;

/// Failures that can occur while interacting with MongoDB.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// The connection URI could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Offending URI.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Building the client from parsed options failed.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The initial ping never succeeded.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Number of attempts made before giving up.
        attempts: u32,
        /// Driver error from the last attempt.
        #[source]
        source: MongoError,
    },
    /// A health-check ping failed on an established connection.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Index creation failed.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection the index belongs to.
        collection: &'static str,
        /// Index key description.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Inserting a new timer document failed.
    #[error("failed to create timer `{id}`")]
    CreateTimer {
        /// Timer id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Committing a timer aggregate failed.
    #[error("failed to save timer `{id}`")]
    SaveTimer {
        /// Timer id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Reading a timer aggregate failed.
    #[error("failed to load timer `{id}`")]
    LoadTimer {
        /// Timer id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Deleting a timer aggregate failed.
    #[error("failed to delete timer `{id}`")]
    DeleteTimer {
        /// Timer id.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
}
