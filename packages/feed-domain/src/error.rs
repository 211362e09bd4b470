pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid filter {field}: {message}")]
	InvalidFilter { field: String, message: String },
	#[error("Invalid sort {field}: {message}")]
	InvalidSort { field: String, message: String },
	#[error("Invalid cursor: {message}")]
	InvalidCursor { message: String },
}
