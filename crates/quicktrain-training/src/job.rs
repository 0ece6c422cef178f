use crate::artifacts::sha256_bytes;
use crate::invocation::{ArgValue, RequestField};
use serde::{Deserialize, Serialize};

/// Identifier for a training job. Caller-supplied and otherwise opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingJobId(pub String);

impl TrainingJobId {
    /// Filesystem-safe form of the id, unique per raw id.
    ///
    /// Anything outside `[A-Za-z0-9._-]` becomes `_`, and a short digest of the raw
    /// id is appended so ids that clean up to the same text still get their own
    /// directory. Object keys keep the raw id; only local working directories use
    /// this form.
    #[must_use]
    pub fn path_component(&self) -> String {
        let cleaned: String = self
            .0
            .chars()
            .take(64)
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
            .collect();
        let digest = sha256_bytes(self.0.as_bytes());
        let stem = if cleaned.is_empty() { "job" } else { cleaned.as_str() };
        format!("{stem}-{}", &digest[..12])
    }
}

impl std::fmt::Display for TrainingJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Inbound training request as received from the front door.
///
/// Every field is optional on the wire; the dispatcher decides what is required.
/// Blank strings count as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRequest {
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub model_type: Option<String>,
    #[serde(default, alias = "trainFile", alias = "file1")]
    pub train_file1: Option<String>,
    #[serde(default, alias = "file2")]
    pub train_file2: Option<String>,
    #[serde(default)]
    pub test_file1: Option<String>,
    #[serde(default)]
    pub test_file2: Option<String>,
    #[serde(default)]
    pub use_auto_split: Option<bool>,
}

fn non_blank(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl TrainingRequest {
    /// Caller's job id exactly as sent. Whitespace-only ids count as absent.
    #[must_use]
    pub fn job_id(&self) -> Option<&str> {
        self.job_id.as_deref().filter(|s| !s.trim().is_empty())
    }

    /// Model type token, trimmed and lower-cased.
    #[must_use]
    pub fn model_type(&self) -> Option<String> {
        non_blank(self.model_type.as_ref()).map(str::to_lowercase)
    }

    /// Present file references in wire order (train1, train2, test1, test2).
    #[must_use]
    pub fn file_refs(&self) -> Vec<&str> {
        [&self.train_file1, &self.train_file2, &self.test_file1, &self.test_file2]
            .into_iter()
            .filter_map(|f| non_blank(f.as_ref()))
            .collect()
    }

    /// Raw value of one request field, `None` when absent.
    #[must_use]
    pub fn field(&self, field: RequestField) -> Option<ArgValue> {
        let text = |v: &Option<String>| non_blank(v.as_ref()).map(|s| ArgValue::Text(s.to_string()));
        match field {
            RequestField::JobId => self.job_id().map(|s| ArgValue::Text(s.to_string())),
            RequestField::TrainFile1 => text(&self.train_file1),
            RequestField::TrainFile2 => text(&self.train_file2),
            RequestField::TestFile1 => text(&self.test_file1),
            RequestField::TestFile2 => text(&self.test_file2),
            RequestField::UseAutoSplit => self.use_auto_split.map(ArgValue::Flag),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_deserializes_camel_case() {
        let request: TrainingRequest = serde_json::from_str(
            r#"{"jobId":"j2","modelType":"ResNet","trainFile1":"a.zip","trainFile2":"b.zip","useAutoSplit":true}"#,
        )
        .unwrap();
        assert_eq!(request.job_id(), Some("j2"));
        assert_eq!(request.model_type().as_deref(), Some("resnet"));
        assert_eq!(request.file_refs(), vec!["a.zip", "b.zip"]);
        assert_eq!(request.use_auto_split, Some(true));
    }

    #[test]
    fn test_request_accepts_tabular_alias_and_nulls() {
        let request: TrainingRequest = serde_json::from_str(
            r#"{"jobId":"j1","modelType":"ebm","trainFile":"data.csv","trainFile2":null,"testFile1":null}"#,
        )
        .unwrap();
        assert_eq!(request.train_file1.as_deref(), Some("data.csv"));
        assert_eq!(request.train_file2, None);
        assert_eq!(request.field(RequestField::TrainFile1), Some(ArgValue::Text("data.csv".to_string())));
    }

    #[test]
    fn test_blank_fields_are_absent() {
        let request = TrainingRequest {
            job_id: Some("  ".to_string()),
            train_file1: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(request.job_id(), None);
        assert!(request.file_refs().is_empty());
        assert_eq!(request.field(RequestField::UseAutoSplit), None);
    }

    #[test]
    fn test_job_id_keeps_surrounding_whitespace() {
        let request = TrainingRequest { job_id: Some(" j1 ".to_string()), ..Default::default() };
        assert_eq!(request.job_id(), Some(" j1 "));
        assert_eq!(request.field(RequestField::JobId), Some(ArgValue::Text(" j1 ".to_string())));
    }

    #[test]
    fn test_path_component_sanitizes() {
        let component = |id: &str| TrainingJobId(id.to_string()).path_component();

        assert!(component("abc-123_x.y").starts_with("abc-123_x.y-"));
        assert!(component("a/b c").starts_with("a_b_c-"));
        assert!(component("").starts_with("job-"));
        for id in ["../etc", "..", ".", "a/b"] {
            let c = component(id);
            assert!(!c.contains('/'), "{c}");
            assert!(c != "." && c != "..");
        }
    }

    #[test]
    fn test_path_component_is_distinct_per_id() {
        let ids = ["team/42", "team 42", "team_42", "team?42"];
        let components: std::collections::HashSet<String> =
            ids.iter().map(|id| TrainingJobId((*id).to_string()).path_component()).collect();
        assert_eq!(components.len(), ids.len());
        assert_eq!(
            TrainingJobId("team_42".to_string()).path_component(),
            TrainingJobId("team_42".to_string()).path_component()
        );
    }
}
