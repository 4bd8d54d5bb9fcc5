use std::fmt;
use std::sync::Arc;

use fira_models::AgentsConfig;
use serde_json::{json, Value};

use crate::prompts::compose_instructions;
use crate::runtime::ToolSpec;

/// The fixed set of roles that take part in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleKind {
    Coordinator,
    Fundamental,
    Macro,
    Quant,
    Editor,
}

impl RoleKind {
    pub const ALL: [RoleKind; 5] = [
        RoleKind::Coordinator,
        RoleKind::Fundamental,
        RoleKind::Macro,
        RoleKind::Quant,
        RoleKind::Editor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RoleKind::Coordinator => "Head Portfolio Manager",
            RoleKind::Fundamental => "Fundamental Analysis Agent",
            RoleKind::Macro => "Macro Analysis Agent",
            RoleKind::Quant => "Quantitative Analysis Agent",
            RoleKind::Editor => "Memo Editor Agent",
        }
    }

    /// Name under which the coordinator calls this role, if it is callable.
    pub fn tool_name(self) -> Option<&'static str> {
        match self {
            RoleKind::Fundamental => Some("fundamental_analysis"),
            RoleKind::Macro => Some("macro_analysis"),
            RoleKind::Quant => Some("quant_analysis"),
            RoleKind::Editor => Some("report_editor"),
            RoleKind::Coordinator => None,
        }
    }
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Long-lived out-of-process services a role may depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    MarketData,
}

/// Every in-process tool a role can be granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ListOutputFiles,
    ReadFile,
    WriteMarkdown,
    GeneratePdf,
    FredSeries,
    CodeInterpreter,
    /// A specialist role exposed to the coordinator as a tool.
    Delegate(RoleKind),
    /// The stitching sub-workflow exposed to the coordinator.
    ReportEditor,
}

impl ToolKind {
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::ListOutputFiles => "list_output_files",
            ToolKind::ReadFile => "read_file",
            ToolKind::WriteMarkdown => "write_markdown",
            ToolKind::GeneratePdf => "generate_pdf",
            ToolKind::FredSeries => "get_fred_series",
            ToolKind::CodeInterpreter => "run_code_interpreter",
            ToolKind::Delegate(kind) => kind.tool_name().unwrap_or("coordinator"),
            ToolKind::ReportEditor => "report_editor",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "list_output_files" => ToolKind::ListOutputFiles,
            "read_file" => ToolKind::ReadFile,
            "write_markdown" => ToolKind::WriteMarkdown,
            "generate_pdf" => ToolKind::GeneratePdf,
            "get_fred_series" => ToolKind::FredSeries,
            "run_code_interpreter" => ToolKind::CodeInterpreter,
            "fundamental_analysis" => ToolKind::Delegate(RoleKind::Fundamental),
            "macro_analysis" => ToolKind::Delegate(RoleKind::Macro),
            "quant_analysis" => ToolKind::Delegate(RoleKind::Quant),
            "report_editor" => ToolKind::ReportEditor,
            _ => return None,
        };
        Some(kind)
    }

    pub fn spec(self) -> ToolSpec {
        let (description, parameters) = match self {
            ToolKind::ListOutputFiles => (
                "List the files in the shared output directory, optionally filtered by extension.",
                json!({
                    "type": "object",
                    "properties": {
                        "extension": {"type": "string", "description": "e.g. \"csv\" or \".png\""}
                    }
                }),
            ),
            ToolKind::ReadFile => (
                "Preview a file from the output directory. CSV files return the last n_rows \
                 as a Markdown table; .md and .txt files return their content.",
                json!({
                    "type": "object",
                    "properties": {
                        "filename": {"type": "string"},
                        "n_rows": {"type": "integer", "default": 10}
                    },
                    "required": ["filename"]
                }),
            ),
            ToolKind::WriteMarkdown => (
                "Write a Markdown file to the output directory.",
                json!({
                    "type": "object",
                    "properties": {
                        "filename": {"type": "string"},
                        "content": {"type": "string"}
                    },
                    "required": ["filename", "content"]
                }),
            ),
            ToolKind::GeneratePdf => (
                "Render a Markdown file from the output directory to PDF.",
                json!({
                    "type": "object",
                    "properties": {
                        "markdown_filename": {"type": "string"}
                    },
                    "required": ["markdown_filename"]
                }),
            ),
            ToolKind::FredSeries => (
                "Fetch a FRED economic time series and summarise it. Optionally save it as CSV.",
                json!({
                    "type": "object",
                    "properties": {
                        "series_id": {"type": "string"},
                        "start_date": {"type": "string", "description": "YYYY-MM-DD, empty for unbounded"},
                        "end_date": {"type": "string", "description": "YYYY-MM-DD, empty for unbounded"},
                        "download_csv": {"type": "boolean", "default": false}
                    },
                    "required": ["series_id"]
                }),
            ),
            ToolKind::CodeInterpreter => (
                "Run a quantitative analysis in a Python sandbox on files from the output \
                 directory. Generated charts and tables are saved back to the output directory.",
                json!({
                    "type": "object",
                    "properties": {
                        "request": {"type": "string"},
                        "input_files": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["request", "input_files"]
                }),
            ),
            ToolKind::Delegate(kind) => (
                match kind {
                    RoleKind::Fundamental => {
                        "Delegate a fundamental analysis task (financials, valuation, news)."
                    }
                    RoleKind::Macro => {
                        "Delegate a macroeconomic analysis task (rates, inflation, growth)."
                    }
                    RoleKind::Quant => {
                        "Delegate a quantitative analysis task (returns, risk, charts)."
                    }
                    RoleKind::Coordinator | RoleKind::Editor => "Delegate a task.",
                },
                json!({
                    "type": "object",
                    "properties": {"input": {"type": "string"}},
                    "required": ["input"]
                }),
            ),
            ToolKind::ReportEditor => (
                "Stitch the specialist sections and your recommendation into the final report.",
                json!({
                    "type": "object",
                    "properties": {
                        "fundamental": {"type": "string"},
                        "macro": {"type": "string"},
                        "quant": {"type": "string"},
                        "pm": {"type": "string"},
                        "files": {"type": "array", "items": {"type": "string"}}
                    },
                    "required": ["fundamental", "macro", "quant", "pm"]
                }),
            ),
        };
        ToolSpec {
            name: self.name().to_string(),
            description: description.to_string(),
            parameters,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelPolicy {
    pub model: String,
    pub temperature: f32,
}

/// Immutable configuration of one agent role.
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub kind: RoleKind,
    pub name: String,
    pub instructions: String,
    /// Ordered allow-list of in-process tools.
    pub tools: Vec<ToolKind>,
    pub sessions: Vec<SessionKind>,
    pub model: ModelPolicy,
    pub parallel_tool_calls: bool,
}

impl Role {
    pub fn allows(&self, tool: ToolKind) -> bool {
        self.tools.contains(&tool)
    }

    pub fn uses_session(&self, kind: SessionKind) -> bool {
        self.sessions.contains(&kind)
    }
}

/// The roles of one run.
#[derive(Debug, Clone)]
pub struct CapabilityBundle {
    pub coordinator: Arc<Role>,
    pub fundamental: Arc<Role>,
    pub macro_: Arc<Role>,
    pub quant: Arc<Role>,
    pub editor: Arc<Role>,
}

impl CapabilityBundle {
    /// Build the bundle. Roles only reference sessions listed in
    /// `available_sessions`; a disabled market-data process leaves the
    /// fundamental and quant roles without session tools.
    pub fn build(config: &AgentsConfig, available_sessions: &[SessionKind]) -> Self {
        let market = available_sessions
            .iter()
            .copied()
            .filter(|s| *s == SessionKind::MarketData)
            .collect::<Vec<_>>();

        let policy = |model: &str| ModelPolicy {
            model: model.to_string(),
            temperature: config.temperature,
        };

        let role = |kind: RoleKind,
                    tools: Vec<ToolKind>,
                    sessions: Vec<SessionKind>,
                    model: ModelPolicy,
                    parallel: bool| {
            Arc::new(Role {
                kind,
                name: kind.name().to_string(),
                instructions: compose_instructions(kind),
                tools,
                sessions,
                model,
                parallel_tool_calls: parallel,
            })
        };

        Self {
            coordinator: role(
                RoleKind::Coordinator,
                vec![
                    ToolKind::Delegate(RoleKind::Fundamental),
                    ToolKind::Delegate(RoleKind::Macro),
                    ToolKind::Delegate(RoleKind::Quant),
                    ToolKind::ReportEditor,
                ],
                Vec::new(),
                policy(&config.coordinator_model),
                false,
            ),
            fundamental: role(
                RoleKind::Fundamental,
                Vec::new(),
                market.clone(),
                policy(&config.specialist_model),
                true,
            ),
            macro_: role(
                RoleKind::Macro,
                vec![ToolKind::FredSeries],
                Vec::new(),
                policy(&config.specialist_model),
                true,
            ),
            quant: role(
                RoleKind::Quant,
                vec![
                    ToolKind::CodeInterpreter,
                    ToolKind::FredSeries,
                    ToolKind::ReadFile,
                    ToolKind::ListOutputFiles,
                ],
                market,
                policy(&config.specialist_model),
                true,
            ),
            editor: role(
                RoleKind::Editor,
                vec![
                    ToolKind::WriteMarkdown,
                    ToolKind::ReadFile,
                    ToolKind::ListOutputFiles,
                    ToolKind::GeneratePdf,
                ],
                Vec::new(),
                policy(&config.editor_model),
                false,
            ),
        }
    }

    pub fn role(&self, kind: RoleKind) -> &Arc<Role> {
        match kind {
            RoleKind::Coordinator => &self.coordinator,
            RoleKind::Fundamental => &self.fundamental,
            RoleKind::Macro => &self.macro_,
            RoleKind::Quant => &self.quant,
            RoleKind::Editor => &self.editor,
        }
    }

    /// Distinct sessions referenced by any role, in first-reference order.
    pub fn session_kinds(&self) -> Vec<SessionKind> {
        let mut kinds = Vec::new();
        for kind in RoleKind::ALL {
            for session in &self.role(kind).sessions {
                if !kinds.contains(session) {
                    kinds.push(*session);
                }
            }
        }
        kinds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> CapabilityBundle {
        CapabilityBundle::build(&AgentsConfig::default(), &[SessionKind::MarketData])
    }

    #[test]
    fn coordinator_finalises_only_through_report_editor() {
        let bundle = bundle();
        let coordinator = bundle.role(RoleKind::Coordinator);
        assert!(coordinator.allows(ToolKind::ReportEditor));
        assert!(!coordinator.allows(ToolKind::WriteMarkdown));
        assert!(!coordinator.allows(ToolKind::GeneratePdf));
        assert!(!coordinator.parallel_tool_calls);
        assert!(coordinator.sessions.is_empty());
    }

    #[test]
    fn allow_lists_match_roles() {
        let bundle = bundle();
        assert!(bundle.fundamental.tools.is_empty());
        assert!(bundle.fundamental.uses_session(SessionKind::MarketData));
        assert_eq!(bundle.macro_.tools, vec![ToolKind::FredSeries]);
        assert!(bundle.quant.allows(ToolKind::CodeInterpreter));
        assert!(!bundle.quant.allows(ToolKind::WriteMarkdown));
        assert!(bundle.editor.allows(ToolKind::GeneratePdf));
        assert!(!bundle.editor.allows(ToolKind::CodeInterpreter));
        assert!(!bundle.editor.parallel_tool_calls);
    }

    #[test]
    fn models_follow_config() {
        let config = AgentsConfig {
            coordinator_model: "pm-model".to_string(),
            specialist_model: "spec-model".to_string(),
            editor_model: "edit-model".to_string(),
            temperature: 0.3,
            ..AgentsConfig::default()
        };
        let bundle = CapabilityBundle::build(&config, &[]);
        assert_eq!(bundle.coordinator.model.model, "pm-model");
        assert_eq!(bundle.quant.model.model, "spec-model");
        assert_eq!(bundle.editor.model.model, "edit-model");
        assert_eq!(bundle.macro_.model.temperature, 0.3);
    }

    #[test]
    fn session_kinds_are_distinct() {
        assert_eq!(bundle().session_kinds(), vec![SessionKind::MarketData]);
        let without = CapabilityBundle::build(&AgentsConfig::default(), &[]);
        assert!(without.session_kinds().is_empty());
        assert!(without.quant.sessions.is_empty());
    }

    #[test]
    fn tool_names_round_trip() {
        let all = [
            ToolKind::ListOutputFiles,
            ToolKind::ReadFile,
            ToolKind::WriteMarkdown,
            ToolKind::GeneratePdf,
            ToolKind::FredSeries,
            ToolKind::CodeInterpreter,
            ToolKind::Delegate(RoleKind::Fundamental),
            ToolKind::Delegate(RoleKind::Macro),
            ToolKind::Delegate(RoleKind::Quant),
            ToolKind::ReportEditor,
        ];
        for tool in all {
            assert_eq!(ToolKind::from_name(tool.name()), Some(tool));
            assert_eq!(tool.spec().name, tool.name());
        }
        assert_eq!(ToolKind::from_name("web_search"), None);
    }
}
