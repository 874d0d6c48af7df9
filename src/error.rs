use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A data source call failed; no partial result is produced.
    #[error("failed to fetch {dataset}")]
    Fetch {
        dataset: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid reference time: {0}")]
    InvalidNow(String),
}

impl EngineError {
    pub fn fetch(dataset: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| EngineError::Fetch { dataset, source }
    }
}
