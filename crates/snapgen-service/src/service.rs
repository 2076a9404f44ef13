//! Operation facade
//!
//! [`SnapService`] owns the generator, the session authority and the bridge
//! and exposes the user-level operations. Each operation reports through an
//! [`Outcome`] instead of an error type; generation always yields a program,
//! even when its delivery fails.

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use snapgen_bridge::{BridgeConfig, BridgeDeps, BridgeError, BridgeServer};
use snapgen_compose::{
    Complexity, GenerationOptions, GenerationPath, HttpBackend, ProgramGenerator,
};
use snapgen_program::{
    truncate_chars, Block, Diagnostic, ErrorKind, GeneratedProgram, KnowledgeBase, DEFAULT_TARGET,
};
use snapgen_session::{ConnectionStatus, SessionAuthority, SessionError, SessionGrant};

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::outcome::Outcome;

/// What `generate_blocks` does with the program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Send to the renderer
    #[default]
    Execute,
    /// Return the program only
    Preview,
    /// Return a plain-language description
    Explain,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "execute" => Ok(Self::Execute),
            "preview" => Ok(Self::Preview),
            "explain" => Ok(Self::Explain),
            other => Err(format!("unknown execution mode '{other}'")),
        }
    }
}

/// Input of [`SnapService::generate_blocks`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub description: String,
    #[serde(default)]
    pub complexity: Complexity,
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default = "default_target")]
    pub target_sprite: String,
    #[serde(default = "default_animate")]
    pub animate: bool,
    /// Most recent live session when unset
    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_target() -> String {
    DEFAULT_TARGET.to_string()
}

const fn default_animate() -> bool {
    true
}

impl GenerateRequest {
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            complexity: Complexity::default(),
            mode: ExecutionMode::default(),
            target_sprite: default_target(),
            animate: true,
            session_id: None,
        }
    }

    /// With execution mode
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// With complexity
    #[inline]
    #[must_use]
    pub fn with_complexity(mut self, complexity: Complexity) -> Self {
        self.complexity = complexity;
        self
    }

    /// With target sprite
    #[inline]
    #[must_use]
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_sprite = target.into();
        self
    }

    /// With session
    #[inline]
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// With creation animation
    #[inline]
    #[must_use]
    pub fn with_animate(mut self, animate: bool) -> Self {
        self.animate = animate;
        self
    }
}

/// Output of [`SnapService::generate_blocks`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateReport {
    pub mode: ExecutionMode,
    /// `cache`, `rule_based`, `generative` or `fallback`
    pub path: String,
    pub explanation: String,
    pub block_count: usize,
    pub program: GeneratedProgram,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Renderer reply to `create_blocks`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub renderer: Option<Value>,
}

/// Output of [`SnapService::start_session`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStarted {
    #[serde(flatten)]
    pub grant: SessionGrant,
    pub expires_in_seconds: i64,
    pub instructions: Vec<String>,
}

/// Output of [`SnapService::check_connection`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionReport {
    #[serde(flatten)]
    pub status: ConnectionStatus,
    pub snap_ready: bool,
    pub status_message: String,
}

/// Output of [`SnapService::inspect_project`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectReport {
    pub session_id: String,
    pub project: Value,
    pub sprite_count: usize,
    pub total_scripts: u64,
    pub custom_blocks: usize,
}

/// One input slot of a custom block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockParameter {
    pub name: String,
    #[serde(rename = "type", default = "default_parameter_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

fn default_parameter_type() -> String {
    "any".to_string()
}

/// Input of [`SnapService::create_custom_block`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomBlockRequest {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<BlockParameter>,
    /// Natural-language description of the block body
    pub definition: String,
    #[serde(default = "default_custom_category")]
    pub category: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

fn default_custom_category() -> String {
    "custom".to_string()
}

impl CustomBlockRequest {
    #[must_use]
    pub fn new(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            definition: definition.into(),
            category: default_custom_category(),
            session_id: None,
        }
    }

    /// Add a parameter slot
    #[must_use]
    pub fn with_parameter(mut self, parameter: BlockParameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// With session
    #[inline]
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

/// Output of [`SnapService::create_custom_block`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomBlockReport {
    pub block_name: String,
    pub category: String,
    /// Body blocks sent as the definition
    pub definition: Vec<Block>,
    pub renderer: Value,
    pub how_to_use: String,
}

/// User-level operations over generator, sessions and bridge
#[derive(Debug)]
pub struct SnapService {
    generator: ProgramGenerator,
    authority: Arc<SessionAuthority>,
    bridge: Arc<BridgeServer>,
}

impl SnapService {
    /// Wire a service from parts; the bridge authenticates against `authority`
    #[must_use]
    pub fn new(
        generator: ProgramGenerator,
        authority: Arc<SessionAuthority>,
        bridge: BridgeConfig,
    ) -> Self {
        let bridge = BridgeServer::new(bridge, BridgeDeps::new(authority.clone()));
        Self {
            generator,
            authority,
            bridge,
        }
    }

    /// Build everything a configuration describes
    ///
    /// # Errors
    /// Returns error if the knowledge base, the HTTP backend, the pattern
    /// tables or the session store cannot be set up.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let knowledge = match &config.knowledge_path {
            Some(path) => KnowledgeBase::load(path)?,
            None => KnowledgeBase::builtin()?,
        };
        let backend = Arc::new(HttpBackend::new(config.generation.clone())?);
        let generator = ProgramGenerator::new(
            Arc::new(knowledge),
            backend,
            config.generation.clone(),
            config.cache,
        )?;
        let authority = Arc::new(SessionAuthority::from_config(config.session.clone())?);
        Ok(Self::new(generator, authority, config.bridge.clone()))
    }

    #[must_use]
    pub fn generator(&self) -> &ProgramGenerator {
        &self.generator
    }

    #[must_use]
    pub fn authority(&self) -> &Arc<SessionAuthority> {
        &self.authority
    }

    #[must_use]
    pub fn bridge(&self) -> &Arc<BridgeServer> {
        &self.bridge
    }

    /// Issue a session and the code to type into the renderer
    pub fn start_session(&self, user_id: &str) -> Outcome<SessionStarted> {
        match self.authority.start_session(user_id) {
            Ok(grant) => {
                tracing::info!(session_id = %grant.session_id, %user_id, "session started");
                let instructions = grant.instructions();
                Outcome::ok(SessionStarted {
                    expires_in_seconds: self.authority.config().validity_minutes * 60,
                    instructions,
                    grant,
                })
            }
            Err(e) => {
                tracing::error!(%user_id, error = %e, "failed to start session");
                Outcome::failed(e.diagnostic())
            }
        }
    }

    /// Whether a renderer is attached to the session and ready for blocks
    pub async fn check_connection(&self, session_id: Option<&str>) -> Outcome<ConnectionReport> {
        let session_id = match self.resolve_session(session_id) {
            Ok(id) => id,
            Err(diagnostic) => return Outcome::failed(diagnostic),
        };
        let mut status = match self.authority.check_connection(&session_id) {
            Ok(status) => status,
            Err(e) => return Outcome::failed(e.diagnostic()),
        };

        status.connected = self.bridge.is_connected(&session_id);
        let snap_ready = status.connected && self.bridge.check_ready(&session_id).await;
        let status_message = if status.expired {
            "Session expired; start a new session"
        } else if snap_ready {
            "Connected and ready"
        } else if status.connected {
            "Connected but Snap! not loaded"
        } else {
            "Waiting for browser connection..."
        };

        Outcome::ok(ConnectionReport {
            status,
            snap_ready,
            status_message: status_message.to_string(),
        })
    }

    /// Turn a description into a program and act on it per the request mode
    ///
    /// A program is always produced. Its delivery failing, or the generator
    /// falling back to an error program, makes the outcome a failure that
    /// still carries the report.
    pub async fn generate_blocks(&self, request: &GenerateRequest) -> Outcome<GenerateReport> {
        let options = GenerationOptions::new(request.target_sprite.clone())
            .with_complexity(request.complexity);
        let generation = self.generator.generate(&request.description, &options).await;
        let program = generation.program;

        let mut report = GenerateReport {
            mode: request.mode,
            path: generation.path.as_str().to_string(),
            explanation: explain(&program),
            block_count: program.block_count(),
            program,
            session_id: None,
            renderer: None,
        };
        let fallback = (generation.path == GenerationPath::Fallback).then(|| {
            Diagnostic::new(
                ErrorKind::GenerativeFailure,
                report.program.payload.error.clone().unwrap_or_default(),
            )
            .suggest("Describe one action at a time, e.g. 'move 10 steps'", 0.7)
            .suggest("Retry later if the generative backend is unavailable", 0.4)
        });

        if request.mode != ExecutionMode::Execute {
            return match fallback {
                Some(diagnostic) => Outcome::failed_with(report, diagnostic),
                None => Outcome::ok(report),
            };
        }

        let session_id = match self.resolve_session(request.session_id.as_deref()) {
            Ok(id) => id,
            Err(diagnostic) => return Outcome::failed_with(report, diagnostic),
        };
        report.session_id = Some(session_id.clone());
        if !self.bridge.is_connected(&session_id) {
            return Outcome::failed_with(report, BridgeError::NotConnected(session_id).diagnostic());
        }

        match self
            .bridge
            .create_blocks(&session_id, &report.program, request.animate)
            .await
        {
            Ok(reply) => {
                tracing::info!(
                    %session_id,
                    blocks = report.block_count,
                    path = %report.path,
                    "program delivered"
                );
                report.renderer = Some(reply);
                match fallback {
                    Some(diagnostic) => Outcome::failed_with(report, diagnostic),
                    None => Outcome::ok(report),
                }
            }
            Err(e) => {
                tracing::warn!(%session_id, error = %e, "program delivery failed");
                Outcome::failed_with(report, e.diagnostic())
            }
        }
    }

    /// Summarize the renderer's current project
    pub async fn inspect_project(
        &self,
        session_id: Option<&str>,
        detail_level: &str,
    ) -> Outcome<ProjectReport> {
        let session_id = match self.resolve_session(session_id) {
            Ok(id) => id,
            Err(diagnostic) => return Outcome::failed(diagnostic),
        };
        match self.bridge.read_project(&session_id, detail_level).await {
            Ok(project) => {
                let sprites = project
                    .get("sprites")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let total_scripts = sprites
                    .iter()
                    .filter_map(|s| s.get("script_count").and_then(Value::as_u64))
                    .sum();
                let custom_blocks = project
                    .get("custom_blocks")
                    .and_then(Value::as_array)
                    .map_or(0, Vec::len);
                Outcome::ok(ProjectReport {
                    sprite_count: sprites.len(),
                    total_scripts,
                    custom_blocks,
                    session_id,
                    project,
                })
            }
            Err(e) => Outcome::failed(e.diagnostic()),
        }
    }

    /// Define a reusable block whose body is built from a description
    ///
    /// The body must be expressible with known patterns; the generative
    /// path is not used for definitions.
    pub async fn create_custom_block(&self, request: &CustomBlockRequest) -> Outcome<CustomBlockReport> {
        let intents = self.generator.parse_intents(&request.definition);
        let options = GenerationOptions::default().with_complexity(Complexity::Intermediate);
        let body = match self
            .generator
            .rule_based(&request.definition, &intents, &options)
        {
            Ok(program) => program,
            Err(e) => return Outcome::failed(e.diagnostic()),
        };
        // the hat only anchors the validated script; a definition has none
        let definition: Vec<Block> = body
            .scripts()
            .iter()
            .flat_map(|script| script.blocks.iter().skip(1).cloned())
            .collect();

        let session_id = match self.resolve_session(request.session_id.as_deref()) {
            Ok(id) => id,
            Err(diagnostic) => return Outcome::failed(diagnostic),
        };
        let spec = json!({
            "name": request.name,
            "category": request.category,
            "parameters": request.parameters,
            "definition": definition,
        });

        match self.bridge.create_custom_block(&session_id, spec).await {
            Ok(renderer) => {
                tracing::info!(%session_id, name = %request.name, "custom block created");
                Outcome::ok(CustomBlockReport {
                    how_to_use: format!(
                        "Look for '{}' in the {} category",
                        request.name, request.category
                    ),
                    block_name: request.name.clone(),
                    category: request.category.clone(),
                    definition,
                    renderer,
                })
            }
            Err(e) => Outcome::failed(e.diagnostic()),
        }
    }

    /// Drop expired sessions from memory and the store
    ///
    /// # Errors
    /// Returns error if the store cannot be rewritten.
    pub fn purge_expired(&self) -> Result<usize, SessionError> {
        self.authority.purge_expired()
    }

    /// Explicit session, or the most recent live one
    fn resolve_session(&self, session_id: Option<&str>) -> Result<String, Diagnostic> {
        match session_id {
            Some(id) if self.authority.get(id).is_some() => Ok(id.to_string()),
            Some(id) => Err(SessionError::UnknownSession(id.to_string()).diagnostic()),
            None => self.authority.most_recent().ok_or_else(|| {
                Diagnostic::new(
                    ErrorKind::SessionFailure,
                    "No active session. Call start_session first.",
                )
                .suggest("Start a session and enter its code in Snap!", 0.9)
            }),
        }
    }
}

/// Plain-language summary of a program
fn explain(program: &GeneratedProgram) -> String {
    if let Some(error) = &program.payload.error {
        return format!("The program only reports an error: {}", truncate_chars(error, 80));
    }
    let scripts: Vec<String> = program
        .scripts()
        .iter()
        .map(|script| {
            let chain = script.chain();
            let Some((head, body)) = chain.split_first() else {
                return String::new();
            };
            let steps: Vec<String> = body.iter().map(|b| describe(b)).collect();
            if steps.is_empty() {
                format!("{} nothing happens yet", trigger_phrase(head))
            } else {
                format!(
                    "{} {} will {}",
                    trigger_phrase(head),
                    program.target_sprite(),
                    steps.join(", then ")
                )
            }
        })
        .filter(|s| !s.is_empty())
        .collect();
    format!("{}.", scripts.join(". "))
}

fn trigger_phrase(hat: &Block) -> String {
    match hat.opcode.as_str() {
        "whenGreenFlag" => "When the green flag is clicked,".to_string(),
        "whenKeyPressed" => format!(
            "When the {} key is pressed,",
            hat.inputs
                .get("KEY_OPTION")
                .and_then(Value::as_str)
                .unwrap_or("chosen")
        ),
        "whenClicked" => "When the sprite is clicked,".to_string(),
        other => format!("When {other} fires,"),
    }
}

fn describe(block: &Block) -> String {
    let values: Vec<String> = block
        .inputs
        .values()
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    if values.is_empty() {
        block.opcode.clone()
    } else {
        format!("{} {}", block.opcode, values.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapgen_program::{Inputs, ScriptBuilder};

    #[test]
    fn explains_key_scripts() {
        let mut key = Inputs::new();
        key.insert("KEY_OPTION".into(), json!("space"));
        let mut steps = Inputs::new();
        steps.insert("STEPS".into(), json!(10));
        let script = ScriptBuilder::new("script_001")
            .hat("whenKeyPressed", "control", key)
            .push("forward", "motion", steps)
            .push("show", "looks", Inputs::new())
            .build();
        let program = GeneratedProgram::new("Cat", vec![script]);
        assert_eq!(
            explain(&program),
            "When the space key is pressed, Cat will forward 10, then show."
        );
    }

    #[test]
    fn explains_error_programs() {
        let program = GeneratedProgram::error_fallback("backend unavailable", "do a flip");
        assert!(explain(&program).contains("backend unavailable"));
    }

    #[test]
    fn mode_parses() {
        assert_eq!("Preview".parse::<ExecutionMode>(), Ok(ExecutionMode::Preview));
        assert!("run".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn request_defaults_from_json() {
        let request: GenerateRequest =
            serde_json::from_value(json!({"description": "spin"})).unwrap();
        assert_eq!(request, GenerateRequest::new("spin"));
        assert!(request.animate);
        assert_eq!(request.mode, ExecutionMode::Execute);
    }
}
