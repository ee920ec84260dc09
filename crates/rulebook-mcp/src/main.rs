use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use rulebook_core::{
    FileSystemRuleRepository, RuleMatchCriteria, RuleMatcher, RuleMetadata, RuleRepository,
    RuleSource,
};
use serde::Deserialize;
use tracing::{error, info};

const NO_MATCHES_TEXT: &str = "No applicable rules found for the given file paths.";

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GetRuleRequest {
    /// Rule id: the rule file's path relative to the rules directory, e.g. "typescript/react.md"
    id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
struct SetRuleRequest {
    /// Rule id: path relative to the rules directory, ending in .md. Subfolders are created as needed.
    id: String,
    /// Rule text in markdown, without frontmatter
    content: String,
    /// File-type patterns such as "*.ts". Only the "*.<ext>" form is supported.
    file_types: Vec<String>,
    /// Folder scopes such as "src/components". Use [""] to apply everywhere.
    folders: Vec<String>,
    /// Optional intent tag, e.g. "style" or "refactor"
    intent: Option<String>,
    /// Optional priority; higher sorts first, missing counts as 0
    priority: Option<i64>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DeleteRuleRequest {
    /// Id of the rule to delete. Deleting a missing rule succeeds.
    id: String,
}

// --- Server ---

#[derive(Clone)]
pub struct RulebookServer {
    matcher: RuleMatcher<FileSystemRuleRepository>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl RulebookServer {
    pub fn new(repository: FileSystemRuleRepository) -> Self {
        Self {
            matcher: RuleMatcher::new(repository),
            tool_router: Self::tool_router(),
        }
    }

    fn repository(&self) -> &FileSystemRuleRepository {
        self.matcher.source()
    }

    #[tool(
        description = "Returns applicable coding rules for the given file paths. Use when refactoring or applying project rules to specific files."
    )]
    fn get_applicable_rules(
        &self,
        Parameters(criteria): Parameters<RuleMatchCriteria>,
    ) -> Result<CallToolResult, McpError> {
        match self.matcher.match_rules(&criteria) {
            Ok(rules) => {
                info!(
                    paths = criteria.file_paths.len(),
                    matched = rules.len(),
                    "get_applicable_rules"
                );
                let payload = to_json(&rules)?;
                let text = if rules.is_empty() {
                    NO_MATCHES_TEXT.to_string()
                } else {
                    to_pretty_json(&payload)?
                };
                let mut result = CallToolResult::success(vec![Content::text(text)]);
                result.structured_content = Some(serde_json::json!({ "rules": payload }));
                Ok(result)
            }
            Err(e) => {
                error!(error = %e, "failed to match rules");
                Ok(error_result(&e))
            }
        }
    }

    #[tool(description = "List every rule in the rules directory with its metadata")]
    fn list_rules(&self) -> Result<CallToolResult, McpError> {
        match self.repository().list_all_rules() {
            Ok(rules) if rules.is_empty() => Ok(CallToolResult::success(vec![Content::text(
                "No rules found. Use set_rule to create one.",
            )])),
            Ok(rules) => {
                let json = to_pretty_json(&to_json(&rules)?)?;
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Err(e) => {
                error!(error = %e, "failed to list rules");
                Ok(error_result(&e))
            }
        }
    }

    #[tool(description = "Get a single rule by id")]
    fn get_rule(
        &self,
        Parameters(req): Parameters<GetRuleRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.repository().get_rule_by_id(&req.id) {
            Ok(Some(rule)) => {
                let json = to_pretty_json(&to_json(&rule)?)?;
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Ok(None) => Ok(CallToolResult::error(vec![Content::text(format!(
                "Rule '{}' not found",
                req.id
            ))])),
            Err(e) => {
                error!(id = %req.id, error = %e, "failed to read rule");
                Ok(error_result(&e))
            }
        }
    }

    #[tool(
        description = "Create or overwrite a rule. The rule is stored as a markdown file at the given id below the rules directory."
    )]
    fn set_rule(
        &self,
        Parameters(req): Parameters<SetRuleRequest>,
    ) -> Result<CallToolResult, McpError> {
        let metadata = RuleMetadata {
            file_types: req.file_types,
            folders: req.folders,
            intent: req.intent,
            priority: req.priority,
        };
        match self.repository().update_rule(&req.id, &req.content, metadata) {
            Ok(rule) => {
                info!(id = %rule.id, "set_rule");
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Saved rule '{}'",
                    rule.id
                ))]))
            }
            Err(e) => {
                error!(id = %req.id, error = %e, "failed to save rule");
                Ok(error_result(&e))
            }
        }
    }

    #[tool(description = "Delete a rule by id")]
    fn delete_rule(
        &self,
        Parameters(req): Parameters<DeleteRuleRequest>,
    ) -> Result<CallToolResult, McpError> {
        match self.repository().delete_rule(&req.id) {
            Ok(()) => {
                info!(id = %req.id, "delete_rule");
                Ok(CallToolResult::success(vec![Content::text(format!(
                    "Deleted rule '{}'",
                    req.id
                ))]))
            }
            Err(e) => {
                error!(id = %req.id, error = %e, "failed to delete rule");
                Ok(error_result(&e))
            }
        }
    }
}

#[tool_handler]
impl ServerHandler for RulebookServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<serde_json::Value, McpError> {
    serde_json::to_value(value).map_err(|e| McpError::internal_error(e.to_string(), None))
}

fn to_pretty_json(value: &serde_json::Value) -> Result<String, McpError> {
    serde_json::to_string_pretty(value).map_err(|e| McpError::internal_error(e.to_string(), None))
}

/// Storage failures are reported as tool errors so a client never mistakes them for "no rules".
fn error_result(err: &rulebook_core::Error) -> CallToolResult {
    CallToolResult::error(vec![Content::text(format!("Error: {}", err))])
}

const INSTRUCTIONS: &str = r#"Rulebook serves project coding rules. Each rule applies to files by extension and folder, optionally narrowed by an intent such as "style" or "refactor".

## Workflow
1. Before editing, refactoring or reviewing files, call `get_applicable_rules` with the paths you are about to touch (and an `intent` if the task has one).
2. Follow the returned rules. They are ordered by priority, highest first; when two rules disagree, prefer the earlier one.
3. Use `list_rules`, `get_rule`, `set_rule` and `delete_rule` only when the user asks you to inspect or change the rules themselves."#;

// --- CLI ---

#[derive(Parser)]
#[command(name = "rulebook-mcp", version)]
#[command(about = "MCP server that returns the coding rules applying to a set of files")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Directory holding the rule files (*.md, nested folders allowed)
    #[arg(long, env = "RULES_DIRECTORY", default_value = "./rules", global = true)]
    rules_dir: PathBuf,

    /// Log at debug level (RUST_LOG overrides this)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Register this server with Claude Code and/or Codex for the current project
    Init,
}

/// Logs go to stderr: stdout carries the MCP protocol.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("rulebook={level}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .with_target(false),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Some(Command::Init) = cli.command {
        return init_project(&cli.rules_dir);
    }

    let repository = FileSystemRuleRepository::new(&cli.rules_dir);
    info!(rules_dir = %repository.root().display(), "starting rulebook MCP server");

    let service = RulebookServer::new(repository)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| error!(error = %e, "MCP server error"))?;
    service.waiting().await?;
    Ok(())
}

// --- init ---

/// Write project-scoped MCP config files in the current directory so that
/// Claude Code and/or Codex start rulebook-mcp when working in this project.
/// Only writes config for tools that are actually installed.
fn init_project(rules_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let binary_path = std::env::current_exe()?
        .canonicalize()?
        .to_string_lossy()
        .to_string();

    let cwd = std::env::current_dir()?;
    let rules_dir = absolute_rules_dir(&cwd, rules_dir);

    let has_claude = which::which("claude").is_ok();
    let has_codex = which::which("codex").is_ok();

    if !has_claude && !has_codex {
        error!("neither `claude` nor `codex` found in PATH");
        eprintln!("Install Claude Code or OpenAI Codex first, then re-run `rulebook-mcp init`.");
        std::process::exit(1);
    }

    let args = vec!["--rules-dir".to_string(), rules_dir];

    if has_claude {
        let path = init_claude_code(&cwd, &binary_path, &args)?;
        info!(path = %path.display(), "wrote Claude Code config");
    }
    if has_codex {
        let path = init_codex(&cwd, &binary_path, &args)?;
        info!(path = %path.display(), "wrote Codex config");
    }

    Ok(())
}

/// Relative rules directories are resolved against `cwd`; the directory need not exist yet.
fn absolute_rules_dir(cwd: &Path, rules_dir: &Path) -> String {
    let dir = if rules_dir.is_absolute() {
        rules_dir.to_path_buf()
    } else {
        cwd.join(rules_dir.strip_prefix(".").unwrap_or(rules_dir))
    };
    dir.to_string_lossy().to_string()
}

/// Merge a `rulebook` entry into `.mcp.json` for Claude Code.
fn init_claude_code(
    cwd: &Path,
    binary_path: &str,
    args: &[String],
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let mcp_json_path = cwd.join(".mcp.json");
    let mut root: serde_json::Value = if mcp_json_path.exists() {
        let contents = std::fs::read_to_string(&mcp_json_path)?;
        serde_json::from_str(&contents).unwrap_or_else(|_| serde_json::json!({}))
    } else {
        serde_json::json!({})
    };

    merge_claude_entry(&mut root, binary_path, args);

    std::fs::write(&mcp_json_path, serde_json::to_string_pretty(&root)?)?;
    Ok(mcp_json_path)
}

fn merge_claude_entry(root: &mut serde_json::Value, binary_path: &str, args: &[String]) {
    if !root.is_object() {
        *root = serde_json::json!({});
    }
    if !root.get("mcpServers").is_some_and(|v| v.is_object()) {
        root["mcpServers"] = serde_json::json!({});
    }
    root["mcpServers"]["rulebook"] = serde_json::json!({
        "type": "stdio",
        "command": binary_path,
        "args": args,
    });
}

/// Merge a `rulebook` table into `.codex/config.toml` for OpenAI Codex.
fn init_codex(
    cwd: &Path,
    binary_path: &str,
    args: &[String],
) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let codex_dir = cwd.join(".codex");
    let config_toml_path = codex_dir.join("config.toml");

    let mut doc: toml_edit::DocumentMut = if config_toml_path.exists() {
        std::fs::read_to_string(&config_toml_path)?
            .parse()
            .unwrap_or_default()
    } else {
        toml_edit::DocumentMut::new()
    };

    merge_codex_entry(&mut doc, binary_path, args);

    std::fs::create_dir_all(&codex_dir)?;
    std::fs::write(&config_toml_path, doc.to_string())?;
    Ok(config_toml_path)
}

fn merge_codex_entry(doc: &mut toml_edit::DocumentMut, binary_path: &str, args: &[String]) {
    if !doc.contains_table("mcp_servers") {
        doc["mcp_servers"] = toml_edit::Item::Table(toml_edit::Table::new());
    }

    let mut server = toml_edit::Table::new();
    server.insert("command", toml_edit::value(binary_path));
    server.insert(
        "args",
        toml_edit::value(args.iter().map(String::as_str).collect::<toml_edit::Array>()),
    );
    doc["mcp_servers"]["rulebook"] = toml_edit::Item::Table(server);
}
