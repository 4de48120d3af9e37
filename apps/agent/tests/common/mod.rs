//! Common test utilities for agent integration tests
//!
//! Provides a scripted chat model, a recording URL opener and builders that
//! wire a conversation service over the in-memory store and the hashing
//! embedder.

#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::*;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use url::Url;

use cadence_agent::models::{CatalogItem, Turn};
use cadence_agent::repositories::{ConversationStore, MemoryConversationStore};
use cadence_agent::services::tools::{DEFAULT_PLAYLIST_URL, DEFAULT_VIDEO_SEARCH_URL};
use cadence_agent::services::{
    AgentGraph, ChatModel, ConversationService, EmbeddingIndex, HashingEmbedder, ModelError,
    ModelReply, ModelToolCall, OpenError, ToolRegistry, ToolSpec, UrlOpener,
};

/// One scripted model step
pub enum Step {
    Reply(ModelReply),
    Fail(String),
    Stall(Duration),
}

/// Chat model that replays a fixed script and records every context it saw
#[derive(Default)]
pub struct ScriptedModel {
    steps: Mutex<VecDeque<Step>>,
    contexts: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedModel {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            contexts: Mutex::new(Vec::new()),
        })
    }

    /// Number of inference calls made
    pub fn calls(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }

    pub fn contexts(&self) -> Vec<Vec<Turn>> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        context: &[Turn],
        _tools: &[ToolSpec],
    ) -> Result<ModelReply, ModelError> {
        self.contexts.lock().unwrap().push(context.to_vec());
        let step = self.steps.lock().unwrap().pop_front();

        match step {
            Some(Step::Reply(reply)) => Ok(reply),
            Some(Step::Fail(message)) => Err(ModelError::Incomplete(message)),
            Some(Step::Stall(duration)) => {
                tokio::time::sleep(duration).await;
                Ok(ModelReply::text("too late"))
            }
            None => Ok(ModelReply::text("script exhausted")),
        }
    }
}

pub fn text(content: &str) -> Step {
    Step::Reply(ModelReply::text(content))
}

/// A reply requesting one tool call per `(name, arguments)` pair
pub fn calls(requests: &[(&str, Value)]) -> Step {
    Step::Reply(ModelReply {
        content: String::new(),
        tool_calls: requests
            .iter()
            .map(|(name, arguments)| ModelToolCall {
                id: None,
                name: name.to_string(),
                arguments: object(arguments.clone()),
            })
            .collect(),
    })
}

pub fn call(name: &str, arguments: Value) -> Step {
    calls(&[(name, arguments)])
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Opener that records URLs instead of launching anything
#[derive(Default)]
pub struct RecordingOpener {
    opened: Mutex<Vec<String>>,
}

impl RecordingOpener {
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl UrlOpener for RecordingOpener {
    async fn open(&self, url: &Url) -> Result<(), OpenError> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Everything a test needs to drive and inspect a conversation service
pub struct Harness {
    pub service: Arc<ConversationService>,
    pub store: Arc<dyn ConversationStore>,
    pub model: Arc<ScriptedModel>,
    pub opener: Arc<RecordingOpener>,
    pub index: Arc<EmbeddingIndex>,
}

pub struct HarnessBuilder {
    catalog: Vec<CatalogItem>,
    steps: Vec<Step>,
    max_rounds: usize,
    model_timeout: Duration,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            catalog: Vec::new(),
            steps: Vec::new(),
            max_rounds: 5,
            model_timeout: Duration::from_secs(5),
        }
    }

    pub fn catalog(mut self, catalog: Vec<CatalogItem>) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn script(mut self, steps: Vec<Step>) -> Self {
        self.steps = steps;
        self
    }

    pub fn max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    pub fn model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = timeout;
        self
    }

    pub async fn build(self) -> Harness {
        let index = Arc::new(
            EmbeddingIndex::build(self.catalog, Arc::new(HashingEmbedder::default()))
                .await
                .unwrap(),
        );
        let opener = Arc::new(RecordingOpener::default());
        let model = ScriptedModel::new(self.steps);

        let tools = Arc::new(ToolRegistry::new(
            index.clone(),
            opener.clone(),
            Url::parse(DEFAULT_VIDEO_SEARCH_URL).unwrap(),
            Url::parse(DEFAULT_PLAYLIST_URL).unwrap(),
            Duration::from_secs(5),
        ));
        let graph = AgentGraph::new(model.clone(), tools, self.max_rounds, self.model_timeout);

        let store: Arc<dyn ConversationStore> = Arc::new(MemoryConversationStore::new());
        let service = Arc::new(ConversationService::new(store.clone(), graph, 20));

        Harness {
            service,
            store,
            model,
            opener,
            index,
        }
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}
