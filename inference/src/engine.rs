//! The inference engine.
//!
//! Owns the verified artifact bundle and exposes two pure evaluators:
//! the risk head (capacity and runtime interruption scores) and the
//! policy head (Q-values over the closed action vocabulary). The engine
//! is read-concurrency-safe; all mutation happens at open time.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{info, warn};

use crate::errors::InferenceError;
use crate::manifest::{CloudId, ModelManifest};

/// Risk-head output, both components in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskScores {
    /// Likelihood of near-term capacity reclamation.
    pub capacity: f64,
    /// Likelihood of runtime disruption already in progress.
    pub runtime: f64,
}

/// A loaded model head. Implementations must be cheap to call and safe
/// to share across tick workers.
pub trait ModelRuntime: Send + Sync {
    fn infer(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError>;
}

/// Materializes a [`ModelRuntime`] from an artifact file. This is the
/// seam to the external inference runtime.
pub trait RuntimeLoader {
    fn load(&self, path: &Path) -> Result<Box<dyn ModelRuntime>, InferenceError>;
}

const RISK_HEAD: &str = "risk";
const POLICY_HEAD: &str = "policy";

pub struct InferenceEngine {
    manifest: ModelManifest,
    families: BTreeSet<String>,
    risk: Box<dyn ModelRuntime>,
    policy: Option<Box<dyn ModelRuntime>>,
}

impl std::fmt::Debug for InferenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceEngine")
            .field("manifest", &self.manifest)
            .field("families", &self.families)
            .field("policy_loaded", &self.policy.is_some())
            .finish()
    }
}

impl InferenceEngine {
    /// Load, verify and open an artifact bundle.
    ///
    /// Refuses to start when artifact digests mismatch, when the
    /// manifest targets a different cloud than the agent is configured
    /// for, or when the policy head is absent outside dry-run. The risk
    /// head is mandatory in every mode.
    pub fn open(
        manifest_path: &Path,
        configured_cloud: CloudId,
        dry_run: bool,
        loader: &dyn RuntimeLoader,
    ) -> Result<Self, InferenceError> {
        let manifest = ModelManifest::load(manifest_path)?;
        let base_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));

        if manifest.cloud != configured_cloud {
            return Err(InferenceError::CloudMismatch {
                manifest: manifest.cloud.to_string(),
                configured: configured_cloud.to_string(),
            });
        }

        manifest.verify_artifacts(base_dir)?;

        let risk_ref = manifest
            .artifacts
            .get(RISK_HEAD)
            .ok_or_else(|| InferenceError::MissingArtifact(RISK_HEAD.into()))?;
        let risk = loader.load(&base_dir.join(&risk_ref.path))?;

        let policy = match manifest.artifacts.get(POLICY_HEAD) {
            Some(policy_ref) => Some(loader.load(&base_dir.join(&policy_ref.path))?),
            None if dry_run => {
                warn!("policy head absent; dry-run continues on the rule-based selector");
                None
            }
            None => return Err(InferenceError::MissingArtifact(POLICY_HEAD.into())),
        };

        info!(
            cloud = %manifest.cloud,
            families = manifest.supported_instance_families.len(),
            artifacts = manifest.artifacts.len(),
            "model bundle verified"
        );

        Ok(Self::from_parts(manifest, risk, policy))
    }

    /// Assemble an engine from already-verified parts. Used by embedded
    /// runtimes and by the scenario suite, which stubs the heads.
    pub fn from_parts(
        manifest: ModelManifest,
        risk: Box<dyn ModelRuntime>,
        policy: Option<Box<dyn ModelRuntime>>,
    ) -> Self {
        let families = manifest.family_set();
        Self {
            manifest,
            families,
            risk,
            policy,
        }
    }

    /// Evaluate the risk head. Outputs are clamped to `[0, 1]`.
    pub fn score(&self, features: &[f64]) -> Result<RiskScores, InferenceError> {
        let out = self.risk.infer(features)?;
        if out.len() < 2 {
            return Err(InferenceError::OutputShape {
                expected: 2,
                got: out.len(),
            });
        }
        Ok(RiskScores {
            capacity: out[0].clamp(0.0, 1.0),
            runtime: out[1].clamp(0.0, 1.0),
        })
    }

    /// Evaluate the policy head: one Q-value per vocabulary entry, in
    /// manifest order.
    pub fn act(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError> {
        let head = self
            .policy
            .as_ref()
            .ok_or_else(|| InferenceError::MissingArtifact(POLICY_HEAD.into()))?;
        let out = head.infer(features)?;
        let expected = self.manifest.action_vocabulary.len();
        if out.len() != expected {
            return Err(InferenceError::OutputShape {
                expected,
                got: out.len(),
            });
        }
        Ok(out)
    }

    pub fn has_policy_head(&self) -> bool {
        self.policy.is_some()
    }

    /// Whether the instance family (the type prefix up to the first `.`)
    /// is covered by the bundle.
    pub fn is_supported(&self, instance_type: &str) -> bool {
        let family = instance_type.split('.').next().unwrap_or(instance_type);
        self.families.contains(family)
    }

    pub fn action_vocabulary(&self) -> &[String] {
        &self.manifest.action_vocabulary
    }

    pub fn manifest(&self) -> &ModelManifest {
        &self.manifest
    }

    /// Release the underlying runtimes.
    pub fn close(self) {
        drop(self.risk);
        drop(self.policy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    struct FixedRuntime(Vec<f64>);

    impl ModelRuntime for FixedRuntime {
        fn infer(&self, _features: &[f64]) -> Result<Vec<f64>, InferenceError> {
            Ok(self.0.clone())
        }
    }

    fn manifest() -> ModelManifest {
        ModelManifest {
            generated_at: Utc::now(),
            cloud: CloudId::Aws,
            supported_instance_families: vec!["m5".into(), "c5".into()],
            artifacts: BTreeMap::new(),
            action_vocabulary: vec![
                "HOLD".into(),
                "DECREASE_10".into(),
                "DECREASE_30".into(),
                "INCREASE_10".into(),
                "INCREASE_30".into(),
                "EMERGENCY_EXIT".into(),
            ],
        }
    }

    #[test]
    fn family_membership_uses_the_type_prefix() {
        let engine =
            InferenceEngine::from_parts(manifest(), Box::new(FixedRuntime(vec![0.1, 0.1])), None);
        assert!(engine.is_supported("m5.large"));
        assert!(engine.is_supported("c5.2xlarge"));
        assert!(!engine.is_supported("t2.small"));
        assert!(!engine.is_supported("m5large"));
    }

    #[test]
    fn risk_scores_are_clamped() {
        let engine =
            InferenceEngine::from_parts(manifest(), Box::new(FixedRuntime(vec![1.7, -0.3])), None);
        let scores = engine.score(&[0.0]).unwrap();
        assert_eq!(scores.capacity, 1.0);
        assert_eq!(scores.runtime, 0.0);
    }

    #[test]
    fn act_requires_the_policy_head_and_full_width_output() {
        let no_policy =
            InferenceEngine::from_parts(manifest(), Box::new(FixedRuntime(vec![0.1, 0.1])), None);
        assert!(matches!(
            no_policy.act(&[0.0]),
            Err(InferenceError::MissingArtifact(_))
        ));

        let narrow = InferenceEngine::from_parts(
            manifest(),
            Box::new(FixedRuntime(vec![0.1, 0.1])),
            Some(Box::new(FixedRuntime(vec![0.5, 0.1]))),
        );
        assert!(matches!(
            narrow.act(&[0.0]),
            Err(InferenceError::OutputShape { expected: 6, got: 2 })
        ));
    }
}
