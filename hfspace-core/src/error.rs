use thiserror::Error;

use crate::favorites::FavoritesError;
use crate::hub::HubError;
use crate::results::ResultsError;
use crate::runner::RunnerError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Hub error: {0}")]
    Hub(#[from] HubError),
    #[error("Favorites error: {0}")]
    Favorites(#[from] FavoritesError),
    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),
    #[error("Results error: {0}")]
    Results(#[from] ResultsError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type InternalResult<T> = Result<T, Error>;

impl Error {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Error::Internal(message.into())
    }
}
