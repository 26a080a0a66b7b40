use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VfsError {
    #[error("'{0}' already exists in this directory")]
    NameTaken(String),

    #[error("Invalid name: '{0}'")]
    InvalidName(String),

    #[error("'{0}' is not a directory")]
    NotADirectory(String),

    #[error("'{0}' is not a file")]
    NotAFile(String),

    #[error("The workspace root cannot be modified")]
    RootLocked,

    #[error("No such node")]
    Missing,
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file type {0}")]
    Unsupported(String),

    #[error("Invalid command: {0}")]
    BadCommand(String),

    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
pub enum AiError {
    #[error("Gemini AI not available (set {0})")]
    NotConfigured(String),

    #[error("HTTP error: {0}")]
    Http(#[from] minreq::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API returned status {status}: {body}")]
    Status { status: i32, body: String },

    #[error("No response text received from Gemini")]
    Empty,

    #[error("Failed to start request: {0}")]
    Worker(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vfs_error_display() {
        let err = VfsError::NameTaken("main.py".to_string());
        assert_eq!(err.to_string(), "'main.py' already exists in this directory");
        assert_eq!(
            VfsError::RootLocked.to_string(),
            "The workspace root cannot be modified"
        );
    }

    #[test]
    fn run_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: RunError = io_err.into();
        assert!(matches!(err, RunError::Io(_)));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn ai_error_names_the_key_variable() {
        let err = AiError::NotConfigured("GEMINI_API_KEY".to_string());
        assert_eq!(err.to_string(), "Gemini AI not available (set GEMINI_API_KEY)");
    }
}
