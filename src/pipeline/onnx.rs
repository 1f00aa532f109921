//! ONNX Runtime backend (feature `onnx`)

use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// ONNX session producing one score per input row
pub struct OnnxModel {
    // `Session::run` takes `&mut self`
    session: Mutex<Session>,
    input_name: String,
    num_features: usize,
}

impl OnnxModel {
    pub fn open(
        path: &Path,
        input_name: String,
        num_features: usize,
    ) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        info!(path = %path.display(), "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(path)?;

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            num_features,
        })
    }

    pub fn run(&self, matrix: &[Vec<f64>]) -> Result<Vec<f64>, String> {
        let rows = matrix.len();
        let input: Vec<f32> = matrix.iter().flatten().map(|&x| x as f32).collect();
        let tensor = Tensor::from_array(([rows, self.num_features], input))
            .map_err(|e| e.to_string())?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| "onnx session lock poisoned".to_string())?;
        let outputs = session
            .run(ort::inputs![self.input_name.clone() => tensor])
            .map_err(|e| e.to_string())?;

        let (_, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| e.to_string())?;

        if data.len() != rows {
            return Err(format!(
                "onnx model returned {} values for {} rows",
                data.len(),
                rows
            ));
        }
        Ok(data.iter().map(|&v| v as f64).collect())
    }
}
