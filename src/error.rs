use thiserror::Error;

pub type ConsoleResult<T> = Result<T, ConsoleError>;

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("Malformed request: {0}")]
    Malformed(String),

    #[error("Timed out waiting for client")]
    Timeout,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Refusing to delete {0}")]
    Protected(String),

    #[error("{0}")]
    Execution(String),

    #[error("{0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),
}

impl ConsoleError {
    /// Transport-level failures: the connection is answered with 400 and closed.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ConsoleError::Malformed(_) | ConsoleError::Timeout | ConsoleError::Io(_)
        )
    }
}
