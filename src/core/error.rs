use thiserror::Error;

/// Fatal and non-fatal failure classes of the search pipeline.
///
/// `StatePersistence` is the only non-fatal variant: the orchestrator logs it
/// and still returns its primary result. `NavigationTimeout` and a detected
/// challenge may trigger a single automated → assisted escalation before the
/// pipeline gives up; everything else surfaces to the caller as-is.
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("browser launch failed: {0}")]
    LaunchFailure(String),

    #[error("navigation timed out: {0}")]
    NavigationTimeout(String),

    #[error("challenge page was not cleared within the allotted wait")]
    ChallengeUnresolved,

    #[error("no query input matched any candidate selector")]
    InputNotFound,

    #[error("no result container appeared after challenge recovery")]
    ResultContainerNotFound,

    #[error("state persistence failed: {0}")]
    StatePersistence(String),
}
