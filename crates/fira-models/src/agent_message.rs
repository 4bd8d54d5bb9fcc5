use serde::{Deserialize, Serialize};

/// Arguments the coordinator passes when it calls a specialist as a tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DelegationRequest {
    /// The sub-task, in natural language.
    pub input: String,
}

/// Structured input for the report-stitching sub-workflow.
///
/// One text section per specialist domain plus the coordinator's own
/// summary, and the output files the report references.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StitchRequest {
    pub fundamental: String,
    #[serde(rename = "macro")]
    pub macro_: String,
    pub quant: String,
    pub pm: String,
    /// Filenames relative to the shared output directory.
    #[serde(default)]
    pub files: Vec<String>,
}

/// Final answer of the report editor, verbatim, plus the file it names when
/// the answer parses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StitchReply {
    pub output: String,
    pub file: Option<String>,
}

/// A single tool invocation requested by a model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stitch_request_uses_macro_key() {
        let request: StitchRequest = serde_json::from_value(serde_json::json!({
            "fundamental": "Margins expanding",
            "macro": "Rates on hold",
            "quant": "Sharpe 1.2",
            "pm": "Overweight",
            "files": ["returns.png", "outputs/GDP_20200101_20240101.csv"]
        }))
        .unwrap();

        assert_eq!(request.macro_, "Rates on hold");
        assert_eq!(request.files.len(), 2);

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["macro"], "Rates on hold");
        assert!(value.get("macro_").is_none());
    }

    #[test]
    fn stitch_request_files_default_empty() {
        let request: StitchRequest = serde_json::from_value(serde_json::json!({
            "fundamental": "", "macro": "", "quant": "", "pm": ""
        }))
        .unwrap();
        assert!(request.files.is_empty());
    }

    #[test]
    fn stitch_request_rejects_missing_section() {
        let result: Result<StitchRequest, _> = serde_json::from_value(serde_json::json!({
            "fundamental": "x", "quant": "y", "pm": "z"
        }));
        assert!(result.is_err());
    }
}
