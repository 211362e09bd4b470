pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid request: {message}")]
	InvalidRequest { message: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
	#[error("Qdrant error: {message}")]
	Qdrant { message: String },
}
impl From<feed_domain::Error> for Error {
	fn from(err: feed_domain::Error) -> Self {
		Self::InvalidRequest { message: err.to_string() }
	}
}

impl From<feed_storage::Error> for Error {
	fn from(err: feed_storage::Error) -> Self {
		match err {
			feed_storage::Error::Sqlx(inner) => Self::Storage { message: inner.to_string() },
			feed_storage::Error::InvalidArgument(message) => Self::InvalidRequest { message },
			feed_storage::Error::Qdrant(inner) => Self::Qdrant { message: inner.to_string() },
		}
	}
}

impl From<feed_providers::Error> for Error {
	fn from(err: feed_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<qdrant_client::QdrantError> for Error {
	fn from(err: qdrant_client::QdrantError) -> Self {
		Self::Qdrant { message: err.to_string() }
	}
}
