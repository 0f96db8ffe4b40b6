use thiserror::Error;

#[derive(Error, Debug)]
pub enum LensError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Language not supported: {0}")]
    UnsupportedLanguage(String),

    #[error("Module not found: {0}")]
    NotFound(String),

    #[error("Watcher error: {0}")]
    Watcher(String),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, LensError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panicked_task_is_task_error() {
        let join_error = tokio::task::spawn_blocking(|| panic!("glob worker died"))
            .await
            .unwrap_err();
        let error = LensError::from(join_error);

        assert!(matches!(error, LensError::Task(_)));
        assert!(error.to_string().starts_with("Background task failed"));
    }
}
