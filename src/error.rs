pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum AnalyzeError {
    #[error("must set search options: pod name, namespace or node name")]
    InvalidInput,

    #[error("{context}: {source}")]
    Upstream {
        context: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to render table: {0}")]
    Render(#[from] std::io::Error),

    #[error("failed to load cluster configuration: {0}")]
    Config(#[source] BoxError),

    #[error("metrics task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AnalyzeError {
    pub fn upstream(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Upstream {
            context: context.into(),
            source: source.into(),
        }
    }

    pub fn config(source: impl Into<BoxError>) -> Self {
        Self::Config(source.into())
    }
}
