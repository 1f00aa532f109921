//! Fitted models and objective post-processing

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::error::ArtifactError;

/// How a raw model score maps to a finishing order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    /// Score is an expected finishing position; lower is better
    FinishPosition,
    /// Score is a logit of winning
    WinProbability,
    /// Score is a ranking score; higher is better
    Score,
}

impl Objective {
    pub fn as_str(&self) -> &'static str {
        match self {
            Objective::FinishPosition => "finish_position",
            Objective::WinProbability => "win_probability",
            Objective::Score => "score",
        }
    }
}

/// Linear model: `bias + Σ wᵢxᵢ`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub weights: Vec<f64>,
    #[serde(default)]
    pub bias: f64,
}

impl LinearModel {
    fn check(&self, width: usize) -> Result<(), String> {
        if self.weights.len() != width {
            return Err(format!(
                "linear model has {} weights, transform produces {} columns",
                self.weights.len(),
                width
            ));
        }
        if !self.bias.is_finite() || self.weights.iter().any(|w| !w.is_finite()) {
            return Err("linear model has non-finite coefficients".to_string());
        }
        Ok(())
    }

    pub fn score(&self, row: &[f64]) -> f64 {
        self.bias + self.weights.iter().zip(row).map(|(w, x)| w * x).sum::<f64>()
    }
}

/// Tree node: a split or a leaf
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        leaf: f64,
    },
}

/// Single regression tree; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    fn check(&self, width: usize) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= width {
                        return Err(format!(
                            "node {} splits on column {} but only {} columns exist",
                            i, feature, width
                        ));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {} has a non-finite threshold", i));
                    }
                    // children after parents guarantees every walk terminates
                    for child in [left, right] {
                        if *child <= i || *child >= self.nodes.len() {
                            return Err(format!("node {} has invalid child index {}", i, child));
                        }
                    }
                }
                TreeNode::Leaf { leaf } => {
                    if !leaf.is_finite() {
                        return Err(format!("node {} has a non-finite leaf value", i));
                    }
                }
            }
        }
        Ok(())
    }

    /// `row` must be at least as wide as the transform the tree was checked against
    pub(crate) fn predict(&self, row: &[f64]) -> f64 {
        let mut index = 0;
        loop {
            match &self.nodes[index] {
                TreeNode::Leaf { leaf } => return *leaf,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    index = if row[*feature] < *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// Additive tree ensemble (gradient boosted trees exported from XGBoost/CatBoost)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    fn check(&self, width: usize) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("tree ensemble has no trees".to_string());
        }
        if !self.base_score.is_finite() {
            return Err("tree ensemble has a non-finite base score".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.check(width).map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }

    pub(crate) fn score(&self, row: &[f64]) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

/// ONNX model stored next to the artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnnxSpec {
    /// Path relative to the artifact file
    pub path: String,
    #[serde(default = "default_input_name")]
    pub input_name: String,
    pub num_features: usize,
}

fn default_input_name() -> String {
    "input".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    Linear(LinearModel),
    TreeEnsemble(TreeEnsemble),
    Onnx(OnnxSpec),
}

/// Model section of an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    pub objective: Objective,
    /// Column names the model was trained on, checked against the transform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_names: Option<Vec<String>>,
    #[serde(flatten)]
    pub spec: ModelSpec,
}

impl ModelSection {
    pub fn kind(&self) -> &'static str {
        match self.spec {
            ModelSpec::Linear(_) => "linear",
            ModelSpec::TreeEnsemble(_) => "tree_ensemble",
            ModelSpec::Onnx(_) => "onnx",
        }
    }

    /// Check against the transform output and build the runtime model
    pub fn build(
        self,
        columns: &[String],
        artifact_dir: &Path,
    ) -> Result<FittedModel, ArtifactError> {
        let width = columns.len();
        if let Some(names) = &self.feature_names {
            if names.as_slice() != columns {
                return Err(ArtifactError::Inconsistent(format!(
                    "model feature names {:?} do not match transform output {:?}",
                    names, columns
                )));
            }
        }

        let kind = self.kind();
        let model = match self.spec {
            ModelSpec::Linear(linear) => {
                linear.check(width).map_err(ArtifactError::Inconsistent)?;
                Model::Linear(linear)
            }
            ModelSpec::TreeEnsemble(trees) => {
                trees.check(width).map_err(ArtifactError::Inconsistent)?;
                Model::Trees(trees)
            }
            ModelSpec::Onnx(spec) => build_onnx(spec, width, artifact_dir)?,
        };

        Ok(FittedModel {
            model,
            kind,
            objective: self.objective,
        })
    }
}

#[cfg(feature = "onnx")]
fn build_onnx(spec: OnnxSpec, width: usize, artifact_dir: &Path) -> Result<Model, ArtifactError> {
    if spec.num_features != width {
        return Err(ArtifactError::Inconsistent(format!(
            "onnx model expects {} features, transform produces {}",
            spec.num_features, width
        )));
    }
    let path = artifact_dir.join(&spec.path);
    let model = super::onnx::OnnxModel::open(&path, spec.input_name, spec.num_features)
        .map_err(|e| ArtifactError::Model(format!("{}: {}", path.display(), e)))?;
    Ok(Model::Onnx(model))
}

#[cfg(not(feature = "onnx"))]
fn build_onnx(_spec: OnnxSpec, _width: usize, _artifact_dir: &Path) -> Result<Model, ArtifactError> {
    Err(ArtifactError::Model(
        "artifact uses an onnx model but this build lacks the `onnx` feature".to_string(),
    ))
}

enum Model {
    Linear(LinearModel),
    Trees(TreeEnsemble),
    #[cfg(feature = "onnx")]
    Onnx(super::onnx::OnnxModel),
}

/// Runtime model, validated against the transform it is paired with
pub struct FittedModel {
    model: Model,
    kind: &'static str,
    objective: Objective,
}

impl FittedModel {
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    /// Raw score per row
    pub fn score(&self, matrix: &[Vec<f64>]) -> Result<Vec<f64>, String> {
        let scores: Vec<f64> = match &self.model {
            Model::Linear(linear) => matrix.iter().map(|row| linear.score(row)).collect(),
            Model::Trees(trees) => matrix.iter().map(|row| trees.score(row)).collect(),
            #[cfg(feature = "onnx")]
            Model::Onnx(onnx) => onnx.run(matrix)?,
        };

        if let Some(i) = scores.iter().position(|s| !s.is_finite()) {
            return Err(format!("model produced a non-finite score for entrant {}", i));
        }
        Ok(scores)
    }
}

/// Predicted rank (1-based, unique) and optional probability per entrant
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub ranks: Vec<u32>,
    pub probabilities: Option<Vec<f64>>,
}

/// Turn raw scores into a finishing order
///
/// Ties keep input order, so the same scores always give the same ranking.
pub fn rank_scores(scores: &[f64], objective: Objective) -> Outcome {
    let probabilities = match objective {
        Objective::FinishPosition => None,
        Objective::WinProbability => Some(scores.iter().map(|&s| sigmoid(s)).collect::<Vec<_>>()),
        Objective::Score => Some(softmax(scores)),
    };

    let mut order: Vec<usize> = (0..scores.len()).collect();
    match (objective, &probabilities) {
        (Objective::FinishPosition, _) => {
            order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));
        }
        // saturated probabilities tie, and ties keep input order
        (Objective::WinProbability, Some(probs)) => {
            order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));
        }
        _ => {
            order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
        }
    }

    let mut ranks = vec![0u32; scores.len()];
    for (position, &index) in order.iter().enumerate() {
        ranks[index] = (position + 1) as u32;
    }

    Outcome {
        ranks,
        probabilities,
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max_score = scores.iter().cloned().fold(f64::MIN, f64::max);
    let exp: Vec<f64> = scores.iter().map(|&s| (s - max_score).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.iter().map(|e| e / sum).collect()
}
