//! Backend registry mapping model-type tokens to backend descriptors.
//!
//! A descriptor fixes a backend's positional parameter contract once, at
//! registration, so the dispatcher binds arguments from the schema instead of
//! inferring them at call time.

use crate::error::{DispatchError, RegistryError};
use quicktrain_training::{
    ArgValue, BoundArg, ComputeClass, ExecutionEnvironment, RequestField, TrainingRequest,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// One positional parameter of a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Name the backend reads the argument under.
    pub name: String,
    /// Request field the value comes from.
    pub source: RequestField,
    pub required: bool,
    /// Value bound when the request omits the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ArgValue>,
}

impl ParamSpec {
    #[must_use]
    pub fn required(source: RequestField) -> Self {
        Self { name: source.wire_name().to_string(), source, required: true, default: None }
    }

    #[must_use]
    pub fn optional(source: RequestField) -> Self {
        Self { required: false, ..Self::required(source) }
    }

    #[must_use]
    pub fn with_default(source: RequestField, default: ArgValue) -> Self {
        Self { default: Some(default), ..Self::optional(source) }
    }
}

/// Everything the dispatcher needs to launch one model type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendDescriptor {
    /// Canonical token, lower-case.
    pub model_type: String,
    /// Additional tokens resolving to this backend.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Remote capability identifier.
    pub capability: String,
    /// Ordered parameter contract.
    pub params: Vec<ParamSpec>,
    pub environment: ExecutionEnvironment,
    /// Extension of the published model file.
    pub artifact_extension: String,
}

impl BackendDescriptor {
    #[must_use]
    pub fn parameter_names(&self) -> Vec<&str> {
        self.params.iter().map(|p| p.name.as_str()).collect()
    }

    fn tokens(&self) -> impl Iterator<Item = &String> {
        std::iter::once(&self.model_type).chain(self.aliases.iter())
    }

    /// Checks the parameter schema for internal consistency.
    ///
    /// # Errors
    /// Returns `RegistryError::InvalidSchema` describing the first problem found.
    pub fn validate(&self) -> Result<(), RegistryError> {
        let invalid = |reason: String| {
            Err(RegistryError::InvalidSchema { model_type: self.model_type.clone(), reason })
        };

        if self.model_type.trim().is_empty() {
            return invalid("model type token is empty".to_string());
        }
        if self.capability.trim().is_empty() {
            return invalid("capability is empty".to_string());
        }
        if self.environment.timeout.is_zero() {
            return invalid("timeout must be positive".to_string());
        }

        let mut names = HashSet::new();
        let mut sources = HashSet::new();
        for param in &self.params {
            if !names.insert(param.name.as_str()) {
                return invalid(format!("duplicate parameter name '{}'", param.name));
            }
            if !sources.insert(param.source) {
                return invalid(format!("field '{}' bound twice", param.source.wire_name()));
            }
            if let Some(default) = &param.default {
                if param.required {
                    return invalid(format!("required parameter '{}' has a default", param.name));
                }
                if default.kind() != Some(param.source.kind()) {
                    return invalid(format!(
                        "default for '{}' does not match its {:?} type",
                        param.name,
                        param.source.kind()
                    ));
                }
            }
        }

        if !self.params.iter().any(|p| p.source == RequestField::JobId && p.required) {
            return invalid("a required 'jobId' parameter is missing".to_string());
        }
        if !self.params.iter().any(|p| p.source == RequestField::TrainFile1 && p.required) {
            return invalid("a required 'trainFile1' parameter is missing".to_string());
        }
        Ok(())
    }

    /// Binds request fields to the positional contract.
    ///
    /// # Errors
    /// Returns `DispatchError::InvalidBackendInput` when a required field is absent.
    pub fn bind(&self, request: &TrainingRequest) -> Result<Vec<BoundArg>, DispatchError> {
        self.params
            .iter()
            .map(|param| {
                let value = match (request.field(param.source), &param.default) {
                    (Some(value), _) => value,
                    (None, _) if param.required => {
                        return Err(DispatchError::InvalidBackendInput {
                            model_type: self.model_type.clone(),
                            reason: format!("missing required field '{}'", param.source.wire_name()),
                        });
                    }
                    (None, Some(default)) => default.clone(),
                    (None, None) => ArgValue::Absent,
                };
                Ok(BoundArg { name: param.name.clone(), value })
            })
            .collect()
    }
}

/// Registry for backend descriptors.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    descriptors: Vec<Arc<BackendDescriptor>>,
    /// Token or alias to index in `descriptors`.
    tokens: HashMap<String, usize>,
}

impl BackendRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor under its token and aliases.
    ///
    /// Tokens are stored lower-cased.
    ///
    /// # Errors
    /// Returns an error if the schema is invalid or any token is already taken.
    pub fn register(&mut self, mut descriptor: BackendDescriptor) -> Result<(), RegistryError> {
        descriptor.model_type = descriptor.model_type.trim().to_lowercase();
        for alias in &mut descriptor.aliases {
            *alias = alias.trim().to_lowercase();
        }
        descriptor.validate()?;

        let mut seen = HashSet::new();
        for token in descriptor.tokens() {
            if self.tokens.contains_key(token) || !seen.insert(token.as_str()) {
                return Err(RegistryError::DuplicateToken(token.clone()));
            }
        }

        debug!(
            model_type = %descriptor.model_type,
            capability = %descriptor.capability,
            params = ?descriptor.parameter_names(),
            "Registering backend descriptor"
        );

        let index = self.descriptors.len();
        for token in descriptor.tokens() {
            self.tokens.insert(token.clone(), index);
        }
        self.descriptors.push(Arc::new(descriptor));
        Ok(())
    }

    /// Looks up a token case-insensitively.
    #[must_use]
    pub fn resolve(&self, model_type: &str) -> Option<Arc<BackendDescriptor>> {
        let token = model_type.trim().to_lowercase();
        self.tokens.get(&token).map(|&i| Arc::clone(&self.descriptors[i]))
    }

    /// Finds the descriptor that declares `capability`.
    #[must_use]
    pub fn by_capability(&self, capability: &str) -> Option<Arc<BackendDescriptor>> {
        self.descriptors.iter().find(|d| d.capability == capability).cloned()
    }

    /// All descriptors in registration order.
    #[must_use]
    pub fn descriptors(&self) -> &[Arc<BackendDescriptor>] {
        &self.descriptors
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// The image, text and tabular backends shipped with QuickTrain.
    ///
    /// # Errors
    /// Only fails if the built-in descriptors are inconsistent.
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for descriptor in builtin_descriptors() {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }
}

fn t4(timeout_secs: u64) -> ExecutionEnvironment {
    ExecutionEnvironment {
        compute: ComputeClass::Gpu { model: "T4".to_string() },
        timeout: Duration::from_secs(timeout_secs),
    }
}

fn paired_class_params(second_required: bool) -> Vec<ParamSpec> {
    vec![
        ParamSpec::required(RequestField::TrainFile1),
        if second_required {
            ParamSpec::required(RequestField::TrainFile2)
        } else {
            ParamSpec::optional(RequestField::TrainFile2)
        },
        ParamSpec::optional(RequestField::TestFile1),
        ParamSpec::optional(RequestField::TestFile2),
        ParamSpec::with_default(RequestField::UseAutoSplit, ArgValue::Flag(true)),
        ParamSpec::required(RequestField::JobId),
    ]
}

/// Descriptors for the built-in backends.
#[must_use]
pub fn builtin_descriptors() -> Vec<BackendDescriptor> {
    vec![
        BackendDescriptor {
            model_type: "resnet".to_string(),
            aliases: vec!["resnet18".to_string()],
            capability: "resnet-training-service/train_resnet".to_string(),
            params: paired_class_params(true),
            environment: t4(1200),
            artifact_extension: "pth".to_string(),
        },
        BackendDescriptor {
            model_type: "tinybert".to_string(),
            aliases: vec!["tiny-bert".to_string()],
            capability: "tinybert-training-service/train_tinybert".to_string(),
            params: paired_class_params(false),
            environment: t4(1800),
            artifact_extension: "zip".to_string(),
        },
        BackendDescriptor {
            model_type: "ebm".to_string(),
            aliases: Vec::new(),
            capability: "ebm-training-service/train_ebm".to_string(),
            params: vec![
                ParamSpec::required(RequestField::TrainFile1),
                ParamSpec::required(RequestField::JobId),
            ],
            environment: ExecutionEnvironment {
                compute: ComputeClass::Cpu { cores: 2.0 },
                timeout: Duration::from_secs(1200),
            },
            artifact_extension: "pkl".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(model_type: &str, params: Vec<ParamSpec>) -> BackendDescriptor {
        BackendDescriptor {
            model_type: model_type.to_string(),
            aliases: Vec::new(),
            capability: format!("{model_type}-service/train"),
            params,
            environment: t4(60),
            artifact_extension: "bin".to_string(),
        }
    }

    fn minimal() -> Vec<ParamSpec> {
        vec![ParamSpec::required(RequestField::TrainFile1), ParamSpec::required(RequestField::JobId)]
    }

    #[test]
    fn test_builtin_resolves_aliases_case_insensitively() {
        let registry = BackendRegistry::builtin().unwrap();
        assert_eq!(registry.len(), 3);

        let tiny = registry.resolve("TinyBERT").unwrap();
        let dashed = registry.resolve("tiny-bert").unwrap();
        assert!(Arc::ptr_eq(&tiny, &dashed));
        assert_eq!(registry.resolve("ResNet18").unwrap().model_type, "resnet");
        assert_eq!(registry.resolve(" EBM ").unwrap().environment.timeout, Duration::from_secs(1200));
        assert!(registry.resolve("svm").is_none());
    }

    #[test]
    fn test_builtin_contracts() {
        let registry = BackendRegistry::builtin().unwrap();
        assert_eq!(
            registry.resolve("resnet").unwrap().parameter_names(),
            vec!["trainFile1", "trainFile2", "testFile1", "testFile2", "useAutoSplit", "jobId"]
        );
        assert_eq!(registry.resolve("ebm").unwrap().parameter_names(), vec!["trainFile1", "jobId"]);
        assert!(registry.by_capability("tinybert-training-service/train_tinybert").is_some());
    }

    #[test]
    fn test_register_rejects_duplicate_tokens() {
        let mut registry = BackendRegistry::new();
        registry.register(descriptor("svm", minimal())).unwrap();

        let err = registry.register(descriptor("SVM", minimal())).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateToken("svm".to_string()));

        let mut aliased = descriptor("lr", minimal());
        aliased.aliases = vec!["svm".to_string()];
        assert!(matches!(registry.register(aliased), Err(RegistryError::DuplicateToken(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_validate_rejects_bad_schemas() {
        let no_job_id = descriptor("a", vec![ParamSpec::required(RequestField::TrainFile1)]);
        assert!(no_job_id.validate().is_err());

        let mut dup = minimal();
        dup.push(ParamSpec::optional(RequestField::TrainFile1));
        assert!(descriptor("a", dup).validate().is_err());

        let mut required_default = minimal();
        required_default.push(ParamSpec {
            default: Some(ArgValue::Flag(true)),
            ..ParamSpec::required(RequestField::UseAutoSplit)
        });
        assert!(descriptor("a", required_default).validate().is_err());

        let mut wrong_kind = minimal();
        wrong_kind.push(ParamSpec::with_default(RequestField::UseAutoSplit, ArgValue::Text("yes".to_string())));
        assert!(descriptor("a", wrong_kind).validate().is_err());

        assert!(descriptor("a", minimal()).validate().is_ok());
    }

    #[test]
    fn test_bind_applies_defaults_and_absents() {
        let registry = BackendRegistry::builtin().unwrap();
        let request = TrainingRequest {
            job_id: Some("j2".to_string()),
            train_file1: Some("a.zip".to_string()),
            train_file2: Some("b.zip".to_string()),
            ..Default::default()
        };

        let args = registry.resolve("resnet").unwrap().bind(&request).unwrap();
        let values: Vec<&ArgValue> = args.iter().map(|a| &a.value).collect();
        assert_eq!(
            values,
            vec![
                &ArgValue::Text("a.zip".to_string()),
                &ArgValue::Text("b.zip".to_string()),
                &ArgValue::Absent,
                &ArgValue::Absent,
                &ArgValue::Flag(true),
                &ArgValue::Text("j2".to_string()),
            ]
        );
    }

    #[test]
    fn test_bind_reports_missing_required_field() {
        let registry = BackendRegistry::builtin().unwrap();
        let request = TrainingRequest {
            job_id: Some("j2".to_string()),
            train_file1: Some("a.zip".to_string()),
            ..Default::default()
        };

        let err = registry.resolve("resnet").unwrap().bind(&request).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidBackendInput { .. }));
        assert!(err.to_string().contains("trainFile2"));
    }
}
