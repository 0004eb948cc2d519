//! Get compendium query
//!
//! Status lookup by id; this is how callers observe the asynchronous
//! `loading -> success | failed` transition.

use mediator::Request;
use serde::{Deserialize, Serialize};

use crate::db::{Compendium, CompendiumStore, StoreError};
use crate::error::ApiError;

/// Query to get a compendium by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetCompendiumQuery {
    pub compendium_id: String,
}

/// Error type for the get compendium query
#[derive(Debug, thiserror::Error)]
pub enum GetCompendiumError {
    #[error("compendium {0} not found")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<GetCompendiumError> for ApiError {
    fn from(err: GetCompendiumError) -> Self {
        match err {
            GetCompendiumError::NotFound(id) => {
                ApiError::NotFound(format!("compendium {id} not found"))
            },
            GetCompendiumError::Store(e) => ApiError::Store(e),
        }
    }
}

impl Request<Result<Compendium, GetCompendiumError>> for GetCompendiumQuery {}

pub async fn handle(
    store: CompendiumStore,
    query: GetCompendiumQuery,
) -> Result<Compendium, GetCompendiumError> {
    store
        .get(&query.compendium_id)
        .await?
        .ok_or(GetCompendiumError::NotFound(query.compendium_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_404_error() {
        let err: ApiError = GetCompendiumError::NotFound("abc".to_string()).into();
        assert!(matches!(err, ApiError::NotFound(ref msg) if msg.contains("abc")));
    }
}
