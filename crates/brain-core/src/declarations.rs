//! Validated agent and tool declarations.
//!
//! A `run_request` arrives with loosely typed specs and stringly typed
//! schemas. `RunRequest::into_plan` checks the request once, up front, and
//! resolves every schema into a [`ToolSchema`] so nothing downstream has to
//! re-parse or guess about missing schemas.

use std::collections::HashSet;

use serde_json::{json, Value};

use crate::frames::{AgentSpec, RunRequest, ToolSpec};

/// A tool schema resolved at declaration time.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolSchema {
    /// No usable schema.
    Empty,
    /// A schema kept as the peer sent it.
    Declared(Value),
}

impl ToolSchema {
    /// Parse an input schema string as sent by the peer.
    ///
    /// Only object schemas with at least one property are kept. Anything
    /// else that is valid JSON resolves to [`ToolSchema::Empty`]; model
    /// backends reject bare `{"type":"object"}` as function parameters.
    pub fn parse_input(raw: &str) -> Result<Self, SchemaError> {
        let Some(value) = parse_json(raw)? else {
            return Ok(Self::Empty);
        };

        let has_properties = value
            .get("properties")
            .and_then(Value::as_object)
            .is_some_and(|p| !p.is_empty());
        let is_object = value.get("type").map_or(true, |ty| ty == "object");

        if has_properties && is_object {
            Ok(Self::Declared(value))
        } else {
            Ok(Self::Empty)
        }
    }

    /// Parse an output schema string. Any JSON value is kept verbatim.
    pub fn parse_output(raw: &str) -> Result<Self, SchemaError> {
        Ok(parse_json(raw)?.map_or(Self::Empty, Self::Declared))
    }

    /// The schema as function parameters. Never null.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Empty => json!({"type": "object", "properties": {}}),
            Self::Declared(v) => v.clone(),
        }
    }
}

fn parse_json(raw: &str) -> Result<Option<Value>, SchemaError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(raw)
        .map(Some)
        .map_err(|e| SchemaError::InvalidJson(e.to_string()))
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SchemaError {
    #[error("invalid JSON: {0}")]
    InvalidJson(String),
}

/// Reasons an initiating frame is rejected before any session work starts.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProtocolError {
    #[error("first frame must be a run_request, got {0}")]
    NotARunRequest(&'static str),
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("stream closed before a run_request arrived")]
    NoRunRequest,
    #[error("run_request has no agents")]
    MissingAgents,
    #[error("run_request has no user_message")]
    MissingUserMessage,
    #[error("{0} name must not be empty")]
    EmptyName(&'static str),
    #[error("duplicate agent name: {0}")]
    DuplicateAgent(String),
    #[error("agent {agent} declares tool {tool} more than once")]
    DuplicateTool { agent: String, tool: String },
    #[error("tool {tool}: invalid {which} schema: {source}")]
    InvalidSchema {
        tool: String,
        which: &'static str,
        #[source]
        source: SchemaError,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub input_schema: ToolSchema,
    pub output_schema: ToolSchema,
}

impl ToolDeclaration {
    fn from_spec(spec: &ToolSpec) -> Result<Self, ProtocolError> {
        if spec.name.trim().is_empty() {
            return Err(ProtocolError::EmptyName("tool"));
        }
        let invalid = |which: &'static str| {
            let tool = spec.name.clone();
            move |source| ProtocolError::InvalidSchema { tool, which, source }
        };
        Ok(Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            input_schema: ToolSchema::parse_input(&spec.input_schema)
                .map_err(invalid("input"))?,
            output_schema: ToolSchema::parse_output(&spec.output_schema)
                .map_err(invalid("output"))?,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AgentDeclaration {
    pub name: String,
    pub instruction: String,
    pub tools: Vec<ToolDeclaration>,
    pub sub_agents: Vec<AgentDeclaration>,
}

impl AgentDeclaration {
    fn from_spec(spec: &AgentSpec) -> Result<Self, ProtocolError> {
        if spec.name.trim().is_empty() {
            return Err(ProtocolError::EmptyName("agent"));
        }

        let mut seen = HashSet::new();
        let mut tools = Vec::with_capacity(spec.tools.len());
        for tool in &spec.tools {
            if !seen.insert(tool.name.as_str()) {
                return Err(ProtocolError::DuplicateTool {
                    agent: spec.name.clone(),
                    tool: tool.name.clone(),
                });
            }
            tools.push(ToolDeclaration::from_spec(tool)?);
        }

        Ok(Self {
            name: spec.name.clone(),
            instruction: spec.instruction.clone(),
            tools,
            sub_agents: agents_from_specs(&spec.sub_agents)?,
        })
    }

    /// Number of tools declared by this agent and all of its descendants.
    pub fn tool_count(&self) -> usize {
        self.tools.len() + self.sub_agents.iter().map(Self::tool_count).sum::<usize>()
    }
}

fn agents_from_specs(specs: &[AgentSpec]) -> Result<Vec<AgentDeclaration>, ProtocolError> {
    let mut seen = HashSet::new();
    specs
        .iter()
        .map(|spec| {
            if !seen.insert(spec.name.as_str()) {
                return Err(ProtocolError::DuplicateAgent(spec.name.clone()));
            }
            AgentDeclaration::from_spec(spec)
        })
        .collect()
}

/// A validated run request.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionPlan {
    pub instruction: String,
    pub agents: Vec<AgentDeclaration>,
    pub user_message: String,
}

impl RunRequest {
    pub fn into_plan(self) -> Result<SessionPlan, ProtocolError> {
        let specs = match self.agents {
            Some(specs) if !specs.is_empty() => specs,
            _ => return Err(ProtocolError::MissingAgents),
        };
        let user_message = match self.user_message {
            Some(msg) if !msg.trim().is_empty() => msg,
            _ => return Err(ProtocolError::MissingUserMessage),
        };

        Ok(SessionPlan {
            instruction: self.instruction,
            agents: agents_from_specs(&specs)?,
            user_message,
        })
    }
}
