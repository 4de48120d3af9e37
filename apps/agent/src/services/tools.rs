//! Tool registry
//!
//! The model can call three tools:
//! - `open_url` - open an arbitrary http(s) link
//! - `search_video` - open a YouTube search results page
//! - `play_playlist` - resolve a playlist from the catalog and open it
//!
//! Executing a tool never fails: unknown names, bad arguments, launcher
//! errors and timeouts all come back as result text for the model to read.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, instrument, warn};
use url::Url;

use super::browser::UrlOpener;
use super::index::EmbeddingIndex;
use crate::models::ToolRequest;

pub const DEFAULT_VIDEO_SEARCH_URL: &str = "https://www.youtube.com/results";
pub const DEFAULT_PLAYLIST_URL: &str = "https://www.youtube.com/playlist";

/// Whether running a tool is visible outside the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    Pure,
    External,
}

/// What the model is told about a tool
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema of the argument object
    pub parameters: Value,
    pub side_effect: SideEffect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    OpenUrl,
    SearchVideo,
    PlayPlaylist,
}

impl ToolKind {
    pub const ALL: [ToolKind; 3] = [Self::OpenUrl, Self::SearchVideo, Self::PlayPlaylist];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenUrl => "open_url",
            Self::SearchVideo => "search_video",
            Self::PlayPlaylist => "play_playlist",
        }
    }

    pub fn spec(&self) -> ToolSpec {
        match self {
            Self::OpenUrl => ToolSpec {
                name: self.name(),
                description: "Open a web page in the user's browser.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "link": {
                            "type": "string",
                            "description": "Absolute http or https URL to open"
                        }
                    },
                    "required": ["link"]
                }),
                side_effect: SideEffect::External,
            },
            Self::SearchVideo => ToolSpec {
                name: self.name(),
                description:
                    "Search YouTube for videos matching a free-text query and show the results.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "What to search for"
                        }
                    },
                    "required": ["query"]
                }),
                side_effect: SideEffect::External,
            },
            Self::PlayPlaylist => ToolSpec {
                name: self.name(),
                description: "Play the saved playlist whose name best matches the query.",
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "Playlist name or description, e.g. 'lofi beats'"
                        }
                    },
                    "required": ["query"]
                }),
                side_effect: SideEffect::External,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenUrlArgs {
    link: String,
}

#[derive(Debug, Deserialize)]
struct QueryArgs {
    query: String,
}

/// Why a tool run produced a failure message instead of its normal result
enum ToolFailure {
    InvalidArguments(String),
    Failed(String),
}

type ToolOutcome = Result<String, ToolFailure>;

/// Executes tool requests against the catalog index and a URL opener
pub struct ToolRegistry {
    index: Arc<EmbeddingIndex>,
    opener: Arc<dyn UrlOpener>,
    video_search_url: Url,
    playlist_url: Url,
    timeout: Duration,
}

impl ToolRegistry {
    pub fn new(
        index: Arc<EmbeddingIndex>,
        opener: Arc<dyn UrlOpener>,
        video_search_url: Url,
        playlist_url: Url,
        timeout: Duration,
    ) -> Self {
        Self {
            index,
            opener,
            video_search_url,
            playlist_url,
            timeout,
        }
    }

    /// Specs of every tool, in a fixed order
    pub fn specs(&self) -> Vec<ToolSpec> {
        ToolKind::ALL.iter().map(ToolKind::spec).collect()
    }

    /// Run one request and describe the outcome
    #[instrument(skip(self, request), fields(tool = %request.name, request_id = %request.id))]
    pub async fn execute(&self, request: &ToolRequest) -> String {
        let Some(kind) = ToolKind::from_name(&request.name) else {
            warn!("Model requested an unknown tool");
            return format!("unknown tool: {}", request.name);
        };

        let dispatch = self.dispatch(kind, &request.arguments);
        let outcome = match tokio::time::timeout(self.timeout, dispatch).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ToolFailure::Failed(format!(
                "{} timed out after {:?}",
                kind.name(),
                self.timeout
            ))),
        };

        match outcome {
            Ok(text) => {
                debug!(result = %text, "Tool finished");
                text
            }
            Err(ToolFailure::InvalidArguments(reason)) => {
                warn!(%reason, "Invalid tool arguments");
                format!("invalid arguments for {}: {}", kind.name(), reason)
            }
            Err(ToolFailure::Failed(message)) => {
                warn!(%message, "Tool failed");
                message
            }
        }
    }

    async fn dispatch(&self, kind: ToolKind, arguments: &Map<String, Value>) -> ToolOutcome {
        match kind {
            ToolKind::OpenUrl => self.open_url(parse_args(arguments)?).await,
            ToolKind::SearchVideo => self.search_video(parse_args(arguments)?).await,
            ToolKind::PlayPlaylist => self.play_playlist(parse_args(arguments)?).await,
        }
    }

    async fn open_url(&self, args: OpenUrlArgs) -> ToolOutcome {
        let link = args.link.trim();
        let url = Url::parse(link)
            .map_err(|e| ToolFailure::InvalidArguments(format!("link '{}': {}", link, e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ToolFailure::InvalidArguments(format!(
                "link '{}' is not an http(s) URL",
                link
            )));
        }

        self.open(&url).await?;
        Ok(format!("opened {} in the browser", link))
    }

    async fn search_video(&self, args: QueryArgs) -> ToolOutcome {
        let query = non_empty_query(&args)?;
        let url = with_param(&self.video_search_url, "search_query", query);

        self.open(&url).await?;
        Ok(format!("{} opened on YouTube search", query))
    }

    async fn play_playlist(&self, args: QueryArgs) -> ToolOutcome {
        let query = non_empty_query(&args)?;

        let matches = self.index.query(query, 1).await.map_err(|e| {
            ToolFailure::Failed(format!("could not search playlists for {}: {}", query, e))
        })?;

        let Some(best) = matches.into_iter().next() else {
            return Ok(format!("No playlist found for {}", query));
        };

        debug!(playlist = %best.item.id, score = best.score, "Playlist resolved");
        let url = with_param(&self.playlist_url, "list", &best.item.id);

        self.open(&url).await?;
        Ok(format!("playing playlist for {}", query))
    }

    async fn open(&self, url: &Url) -> Result<(), ToolFailure> {
        self.opener
            .open(url)
            .await
            .map_err(|e| ToolFailure::Failed(format!("failed to open {}: {}", url, e)))
    }
}

fn parse_args<T: DeserializeOwned>(arguments: &Map<String, Value>) -> Result<T, ToolFailure> {
    serde_json::from_value(Value::Object(arguments.clone()))
        .map_err(|e| ToolFailure::InvalidArguments(e.to_string()))
}

fn non_empty_query(args: &QueryArgs) -> Result<&str, ToolFailure> {
    let query = args.query.trim();
    if query.is_empty() {
        return Err(ToolFailure::InvalidArguments("query is empty".to_string()));
    }
    Ok(query)
}

/// `base` with one query parameter appended, percent-encoded
fn with_param(base: &Url, key: &str, value: &str) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair(key, value);
    url
}
