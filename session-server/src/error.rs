use session_types::SessionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("only the session authority may do that")]
    NotAuthority,
    #[error(transparent)]
    Session(#[from] SessionError),
}
