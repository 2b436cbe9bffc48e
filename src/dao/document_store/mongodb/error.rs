use mongodb::error::Error as MongoError;
use thiserror::Error;

/// Result alias for MongoDB operations.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures raised by the MongoDB backend.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// Required environment variable is missing.
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the variable.
        var: &'static str,
    },
    /// The connection string could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// Connection string that failed to parse.
        uri: String,
        /// Underlying error.
        #[source]
        source: MongoError,
    },
    /// The client could not be built from its options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Underlying error.
        #[source]
        source: MongoError,
    },
    /// The server never answered the first ping.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Attempts made.
        attempts: u32,
        /// Underlying error.
        #[source]
        source: MongoError,
    },
    /// A health-check ping failed.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Underlying error.
        #[source]
        source: MongoError,
    },
    /// Reading the league document failed.
    #[error("failed to load document `{key}`")]
    LoadDocument {
        /// Document key.
        key: String,
        /// Underlying error.
        #[source]
        source: MongoError,
    },
    /// Writing the league document failed.
    #[error("failed to save document `{key}`")]
    SaveDocument {
        /// Document key.
        key: String,
        /// Underlying error.
        #[source]
        source: MongoError,
    },
    /// The change stream could not be opened.
    #[error("failed to open change stream for `{key}`")]
    OpenChangeStream {
        /// Document key.
        key: String,
        /// Underlying error.
        #[source]
        source: MongoError,
    },
    /// The change stream reported an error.
    #[error("change stream for `{key}` failed")]
    ChangeStream {
        /// Document key.
        key: String,
        /// Underlying error.
        #[source]
        source: MongoError,
    },
}
