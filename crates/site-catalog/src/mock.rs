//! A catalog client that serves canned responses, for tests of consumers.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::client::ClientTrait;
use crate::error::CatalogClientError;
use crate::types::{Entity, Index, Issue};

/// A canned response, consumed by the next matching request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Response {
    Index(Index),
    Issues(Vec<Issue>),
    /// `null` stands for an entity request that did not succeed.
    Entity(Option<Entity>),
}

#[derive(Debug, Error)]
pub enum MockDataError {
    /// Failed to read the file holding mock responses
    #[error("failed to read mock response file")]
    ReadMockFile(#[source] std::io::Error),
    /// Failed to parse the contents of the mock data file as JSON
    #[error("failed to parse mock data as JSON")]
    ParseJson(#[source] serde_json::Error),
}

/// Reads a list of mock responses from disk.
fn read_mock_responses(path: impl AsRef<Path>) -> Result<VecDeque<Response>, MockDataError> {
    let contents = std::fs::read_to_string(path).map_err(MockDataError::ReadMockFile)?;
    let deserialized: Vec<Response> =
        serde_json::from_str(&contents).map_err(MockDataError::ParseJson)?;
    Ok(deserialized.into())
}

/// A catalog client that can be seeded with mock responses.
///
/// Responses are handed out in the order they were pushed, regardless of
/// which operation asks. Asking for a response of the wrong kind panics.
#[derive(Debug, Default, Clone)]
pub struct MockClient {
    pub mock_responses: Arc<Mutex<VecDeque<Response>>>,
}

impl MockClient {
    /// Create a new mock client, optionally reading mock responses from disk.
    pub fn new(mock_data_path: Option<impl AsRef<Path>>) -> Result<Self, MockDataError> {
        let mock_responses = match mock_data_path {
            Some(path) => read_mock_responses(path)?,
            None => VecDeque::new(),
        };
        Ok(Self {
            mock_responses: Arc::new(Mutex::new(mock_responses)),
        })
    }

    pub fn push_index_response(&mut self, index: Index) {
        self.push(Response::Index(index));
    }

    pub fn push_issues_response(&mut self, issues: Vec<Issue>) {
        self.push(Response::Issues(issues));
    }

    pub fn push_entity_response(&mut self, entity: Option<Entity>) {
        self.push(Response::Entity(entity));
    }

    /// Number of responses not yet consumed.
    pub fn remaining(&self) -> usize {
        self.mock_responses
            .lock()
            .expect("couldn't acquire mock lock")
            .len()
    }

    fn push(&mut self, response: Response) {
        self.mock_responses
            .lock()
            .expect("couldn't acquire mock lock")
            .push_back(response);
    }

    fn pop(&self) -> Option<Response> {
        let response = self
            .mock_responses
            .lock()
            .expect("couldn't acquire mock lock")
            .pop_front();
        debug!(?response, "serving mock response");
        response
    }
}

impl ClientTrait for MockClient {
    async fn fetch_index(&self) -> Result<Index, CatalogClientError> {
        match self.pop() {
            Some(Response::Index(index)) => Ok(index),
            other => panic!("expected index response, found {other:?}"),
        }
    }

    async fn get_issues(&self) -> Result<Vec<Issue>, CatalogClientError> {
        match self.pop() {
            Some(Response::Issues(issues)) => Ok(issues),
            other => panic!("expected issues response, found {other:?}"),
        }
    }

    async fn get_entity_by_id(
        &self,
        _id: impl AsRef<str> + Send + Sync,
    ) -> Result<Option<Entity>, CatalogClientError> {
        match self.pop() {
            Some(Response::Entity(entity)) => Ok(entity),
            other => panic!("expected entity response, found {other:?}"),
        }
    }
}
