//! Tool registry
//!
//! The closed set of operations exposed over MCP. Each [`Tool`] carries its
//! static descriptor; a [`ToolCall`] is a tool plus arguments that already
//! passed schema validation, so dispatch never sees malformed input.

use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use taller_protocol::{ToolAnnotations, ToolDefinition};
use tracing::{debug, info};

use crate::auth::CredentialManager;
use crate::common::{create_http_client, Error};
use crate::config::{Config, Endpoints, DEFAULT_TIMEZONE};
use crate::google::{CalendarApi, GmailApi, GoogleClient, SheetsApi};
use crate::search::SerpApiClient;

/// Upper bound on the `calendar_list_events` window.
pub const MAX_LIST_DAYS: u32 = 36_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tool {
    WebSearch,
    GmailSend,
    GmailListThreads,
    SheetsRead,
    SheetsWrite,
    CalendarCreateEvent,
    CalendarListEvents,
}

impl Tool {
    pub const ALL: [Tool; 7] = [
        Tool::WebSearch,
        Tool::GmailSend,
        Tool::GmailListThreads,
        Tool::SheetsRead,
        Tool::SheetsWrite,
        Tool::CalendarCreateEvent,
        Tool::CalendarListEvents,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tool::WebSearch => "web_search",
            Tool::GmailSend => "gmail_send",
            Tool::GmailListThreads => "gmail_list_threads",
            Tool::SheetsRead => "sheets_read",
            Tool::SheetsWrite => "sheets_write",
            Tool::CalendarCreateEvent => "calendar_create_event",
            Tool::CalendarListEvents => "calendar_list_events",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::ALL.into_iter().find(|tool| tool.name() == name)
    }

    pub fn description(self) -> &'static str {
        match self {
            Tool::WebSearch => "Search the web with Google via SerpAPI and return the top organic results.",
            Tool::GmailSend => "Send a plain-text email from the authenticated Gmail account.",
            Tool::GmailListThreads => "List the most recent Gmail threads under a label.",
            Tool::SheetsRead => "Read the values of a Google Sheets range.",
            Tool::SheetsWrite => "Write values into a Google Sheets range.",
            Tool::CalendarCreateEvent => "Create an event in Google Calendar and return its link.",
            Tool::CalendarListEvents => "List upcoming Google Calendar events for the next few days.",
        }
    }

    pub fn input_schema(self) -> Value {
        match self {
            Tool::WebSearch => json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "Search query"},
                    "num_results": {"type": "integer", "minimum": 0, "default": 10, "description": "Maximum number of results"}
                },
                "required": ["query"]
            }),
            Tool::GmailSend => json!({
                "type": "object",
                "properties": {
                    "to": {"type": "string", "description": "Recipient address"},
                    "subject": {"type": "string"},
                    "body": {"type": "string", "description": "Plain-text body"}
                },
                "required": ["to", "subject", "body"]
            }),
            Tool::GmailListThreads => json!({
                "type": "object",
                "properties": {
                    "label": {"type": "string", "default": "INBOX", "description": "Gmail label id"},
                    "limit": {"type": "integer", "minimum": 0, "default": 10}
                }
            }),
            Tool::SheetsRead => json!({
                "type": "object",
                "properties": {
                    "spreadsheet_id": {"type": "string"},
                    "range": {"type": "string", "description": "A1 notation, e.g. Sheet1!A1:C10"}
                },
                "required": ["spreadsheet_id", "range"]
            }),
            Tool::SheetsWrite => json!({
                "type": "object",
                "properties": {
                    "spreadsheet_id": {"type": "string"},
                    "range": {"type": "string", "description": "A1 notation, e.g. Sheet1!A1"},
                    "values": {
                        "type": "array",
                        "items": {"type": "array", "items": {"type": "string"}},
                        "description": "Rows of cell values"
                    }
                },
                "required": ["spreadsheet_id", "range", "values"]
            }),
            Tool::CalendarCreateEvent => json!({
                "type": "object",
                "properties": {
                    "summary": {"type": "string"},
                    "start": {"type": "string", "description": "RFC 3339 date-time"},
                    "end": {"type": "string", "description": "RFC 3339 date-time"},
                    "calendar_id": {"type": "string", "default": "primary"},
                    "timezone": {"type": "string", "default": DEFAULT_TIMEZONE}
                },
                "required": ["summary", "start", "end"]
            }),
            Tool::CalendarListEvents => json!({
                "type": "object",
                "properties": {
                    "calendar_id": {"type": "string", "default": "primary"},
                    "days": {"type": "integer", "minimum": 0, "maximum": MAX_LIST_DAYS, "default": 7}
                }
            }),
        }
    }

    pub fn annotations(self) -> ToolAnnotations {
        let (read_only, destructive, idempotent) = match self {
            Tool::WebSearch | Tool::GmailListThreads | Tool::SheetsRead | Tool::CalendarListEvents => {
                (true, false, true)
            }
            Tool::GmailSend | Tool::CalendarCreateEvent => (false, false, false),
            Tool::SheetsWrite => (false, true, true),
        };
        ToolAnnotations {
            read_only_hint: Some(read_only),
            destructive_hint: Some(destructive),
            idempotent_hint: Some(idempotent),
            open_world_hint: Some(true),
        }
    }

    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
            annotations: Some(self.annotations()),
        }
    }
}

fn default_num_results() -> u32 {
    10
}

fn default_label() -> String {
    "INBOX".to_string()
}

fn default_limit() -> u32 {
    10
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

fn default_timezone() -> String {
    DEFAULT_TIMEZONE.to_string()
}

fn default_days() -> u32 {
    7
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WebSearchArgs {
    pub query: String,
    #[serde(default = "default_num_results")]
    pub num_results: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GmailSendArgs {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GmailListThreadsArgs {
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SheetsReadArgs {
    pub spreadsheet_id: String,
    #[serde(alias = "range_")]
    pub range: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SheetsWriteArgs {
    pub spreadsheet_id: String,
    #[serde(alias = "range_")]
    pub range: String,
    pub values: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CalendarCreateEventArgs {
    pub summary: String,
    pub start: String,
    pub end: String,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CalendarListEventsArgs {
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    #[serde(default = "default_days")]
    pub days: u32,
}

/// A validated invocation of one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    WebSearch(WebSearchArgs),
    GmailSend(GmailSendArgs),
    GmailListThreads(GmailListThreadsArgs),
    SheetsRead(SheetsReadArgs),
    SheetsWrite(SheetsWriteArgs),
    CalendarCreateEvent(CalendarCreateEventArgs),
    CalendarListEvents(CalendarListEventsArgs),
}

impl ToolCall {
    /// Validate `arguments` against the named tool's schema.
    ///
    /// Missing or null arguments count as an empty object. Unknown fields are
    /// ignored.
    pub fn parse(name: &str, arguments: Value) -> Result<Self, Error> {
        let tool = Tool::from_name(name)
            .ok_or_else(|| Error::Validation(format!("Unknown tool: {}", name)))?;

        let arguments = match arguments {
            Value::Null => json!({}),
            other => other,
        };

        Ok(match tool {
            Tool::WebSearch => ToolCall::WebSearch(args(tool, arguments)?),
            Tool::GmailSend => ToolCall::GmailSend(args(tool, arguments)?),
            Tool::GmailListThreads => ToolCall::GmailListThreads(args(tool, arguments)?),
            Tool::SheetsRead => ToolCall::SheetsRead(args(tool, arguments)?),
            Tool::SheetsWrite => ToolCall::SheetsWrite(args(tool, arguments)?),
            Tool::CalendarCreateEvent => ToolCall::CalendarCreateEvent(args(tool, arguments)?),
            Tool::CalendarListEvents => {
                let a: CalendarListEventsArgs = args(tool, arguments)?;
                if a.days > MAX_LIST_DAYS {
                    return Err(Error::Validation(format!(
                        "{}: days must be at most {}",
                        tool.name(),
                        MAX_LIST_DAYS
                    )));
                }
                ToolCall::CalendarListEvents(a)
            }
        })
    }

    pub fn tool(&self) -> Tool {
        match self {
            ToolCall::WebSearch(_) => Tool::WebSearch,
            ToolCall::GmailSend(_) => Tool::GmailSend,
            ToolCall::GmailListThreads(_) => Tool::GmailListThreads,
            ToolCall::SheetsRead(_) => Tool::SheetsRead,
            ToolCall::SheetsWrite(_) => Tool::SheetsWrite,
            ToolCall::CalendarCreateEvent(_) => Tool::CalendarCreateEvent,
            ToolCall::CalendarListEvents(_) => Tool::CalendarListEvents,
        }
    }
}

fn args<T: DeserializeOwned>(tool: Tool, arguments: Value) -> Result<T, Error> {
    serde_json::from_value(arguments)
        .map_err(|e| Error::Validation(format!("{}: {}", tool.name(), e)))
}

/// Dispatches validated calls to the service clients.
///
/// Built once at startup. Google-backed tools obtain a fresh credential on
/// every call.
pub struct ToolRegistry {
    credentials: Arc<CredentialManager>,
    http: reqwest::Client,
    search: SerpApiClient,
    endpoints: Endpoints,
}

impl ToolRegistry {
    pub fn new(config: &Config, credentials: Arc<CredentialManager>) -> Result<Self, Error> {
        let http = create_http_client()?;
        let search = SerpApiClient::new(
            http.clone(),
            &config.endpoints.serpapi,
            config.serpapi_key.clone(),
        );

        Ok(Self {
            credentials,
            http,
            search,
            endpoints: config.endpoints.clone(),
        })
    }

    pub fn list(&self) -> Vec<ToolDefinition> {
        Tool::ALL.iter().map(|tool| tool.definition()).collect()
    }

    pub async fn call(&self, call: ToolCall) -> Result<Value, Error> {
        let tool = call.tool();
        info!(tool = tool.name(), "Calling tool");

        let result = match call {
            ToolCall::WebSearch(a) => {
                let results = self.search.search(&a.query, a.num_results).await?;
                to_value(results)?
            }
            ToolCall::GmailSend(a) => {
                let gmail = GmailApi::new(self.google().await?, &self.endpoints.gmail);
                Value::String(gmail.send_message(&a.to, &a.subject, &a.body).await?)
            }
            ToolCall::GmailListThreads(a) => {
                let gmail = GmailApi::new(self.google().await?, &self.endpoints.gmail);
                Value::Array(gmail.list_threads(&a.label, a.limit).await?)
            }
            ToolCall::SheetsRead(a) => {
                let sheets = SheetsApi::new(self.google().await?, &self.endpoints.sheets);
                to_value(sheets.read(&a.spreadsheet_id, &a.range).await?)?
            }
            ToolCall::SheetsWrite(a) => {
                let sheets = SheetsApi::new(self.google().await?, &self.endpoints.sheets);
                let updated = sheets.write(&a.spreadsheet_id, &a.range, &a.values).await?;
                Value::String(format!("{} cells updated", updated))
            }
            ToolCall::CalendarCreateEvent(a) => {
                let calendar = CalendarApi::new(self.google().await?, &self.endpoints.calendar);
                let link = calendar
                    .create_event(&a.calendar_id, &a.summary, &a.start, &a.end, &a.timezone)
                    .await?;
                Value::String(link)
            }
            ToolCall::CalendarListEvents(a) => {
                let calendar = CalendarApi::new(self.google().await?, &self.endpoints.calendar);
                Value::Array(calendar.list_events(&a.calendar_id, a.days, Utc::now()).await?)
            }
        };

        debug!(tool = tool.name(), "Tool call finished");
        Ok(result)
    }

    async fn google(&self) -> Result<GoogleClient, Error> {
        let credential = self.credentials.get_credential().await?;
        Ok(GoogleClient::new(self.http.clone(), credential))
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, Error> {
    serde_json::to_value(value)
        .map_err(|e| Error::Upstream(format!("Failed to encode result: {}", e)))
}
