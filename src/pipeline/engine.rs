use std::path::{Path, PathBuf};

use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::tensor::TensorElementType;
use ort::value::{Tensor, ValueType};

use super::{
    decoder::KeypointDecoder,
    encoder::{InputDtype, InputSpec, InputTensor},
};
use crate::{
    error::{PoseError, PoseResult},
    types::NUM_KEYPOINTS,
};

pub const MOVENET_INPUT_SIZE: u32 = 192;
pub const POSENET_INPUT_SIZE: u32 = 257;
pub const POSENET_GRID_SIZE: usize = 9;

/// A model output copied out of the engine as `f32`.
#[derive(Clone, Debug, PartialEq)]
pub struct OutputTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl OutputTensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }
}

/// Input and output layout a model variant must declare, plus the decoder
/// that reads its outputs.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelContract {
    pub name: &'static str,
    pub input: InputSpec,
    /// Expected output shapes. `None` dimensions accept any size.
    pub outputs: Vec<Vec<Option<usize>>>,
    pub decoder: KeypointDecoder,
}

impl ModelContract {
    /// Single-pose MoveNet: `(1, 1, 17, 3)` of `(y, x, score)`.
    pub fn movenet(dtype: InputDtype) -> Self {
        Self {
            name: "movenet",
            input: InputSpec {
                height: MOVENET_INPUT_SIZE,
                width: MOVENET_INPUT_SIZE,
                channels: 3,
                dtype,
            },
            outputs: vec![vec![Some(1), Some(1), Some(NUM_KEYPOINTS), Some(3)]],
            decoder: KeypointDecoder::DirectRegression,
        }
    }

    /// Single-pose PoseNet: heatmap `(1, g, g, 17)` and offsets `(1, g, g, 34)`.
    pub fn posenet(grid: usize) -> Self {
        Self {
            name: "posenet",
            input: InputSpec {
                height: POSENET_INPUT_SIZE,
                width: POSENET_INPUT_SIZE,
                channels: 3,
                dtype: InputDtype::F32Normalized,
            },
            outputs: vec![
                vec![Some(1), Some(grid), Some(grid), Some(NUM_KEYPOINTS)],
                vec![Some(1), Some(grid), Some(grid), Some(NUM_KEYPOINTS * 2)],
            ],
            decoder: KeypointDecoder::HeatmapOffset {
                grid_height: grid,
                grid_width: grid,
            },
        }
    }

    /// Checks what a loaded model declares against this contract. Negative
    /// (dynamic) model dimensions match anything.
    pub fn check(&self, inputs: &[DeclaredTensor], outputs: &[DeclaredTensor]) -> PoseResult<()> {
        let input = inputs
            .first()
            .ok_or_else(|| PoseError::Contract(format!("{}: model has no inputs", self.name)))?;
        let want_input: Vec<Option<usize>> =
            self.input.shape().iter().map(|&d| Some(d)).collect();
        if !shape_matches(&want_input, &input.shape) {
            return Err(PoseError::Contract(format!(
                "{}: input shape {:?} does not match {:?}",
                self.name,
                input.shape,
                self.input.shape()
            )));
        }
        let want_dtype = match self.input.dtype {
            InputDtype::U8 => ElementKind::U8,
            InputDtype::F32Normalized => ElementKind::F32,
        };
        if input.element != want_dtype {
            return Err(PoseError::Contract(format!(
                "{}: input element type {:?}, expected {:?}",
                self.name, input.element, want_dtype
            )));
        }

        if outputs.len() < self.outputs.len() {
            return Err(PoseError::Contract(format!(
                "{}: model has {} outputs, expected {}",
                self.name,
                outputs.len(),
                self.outputs.len()
            )));
        }
        for (idx, (want, got)) in self.outputs.iter().zip(outputs).enumerate() {
            if !shape_matches(want, &got.shape) || got.element != ElementKind::F32 {
                return Err(PoseError::Contract(format!(
                    "{}: output {idx} is {:?} {:?}, expected f32 {:?}",
                    self.name, got.element, got.shape, want
                )));
            }
        }
        Ok(())
    }
}

fn shape_matches(want: &[Option<usize>], got: &[i64]) -> bool {
    // Some exports squeeze the leading batch axes; compare element counts
    // when ranks differ, counting dynamic model dimensions as 1.
    if want.len() != got.len() {
        let want_count = element_count(want.iter().copied());
        let got_count = element_count(got.iter().map(|&d| usize::try_from(d.max(1)).ok()));
        return matches!((want_count, got_count), (Some(a), Some(b)) if a == b);
    }
    want.iter().zip(got).all(|(w, &g)| match (w, g) {
        (_, g) if g < 0 => true,
        (None, _) => true,
        (Some(w), g) => *w as i64 == g,
    })
}

fn element_count(dims: impl Iterator<Item = Option<usize>>) -> Option<usize> {
    let mut dims = dims;
    dims.try_fold(1usize, |acc, d| d.map(|d| acc * d))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    U8,
    F32,
    Other,
}

/// Shape and element type a model declares for one input or output.
#[derive(Clone, Debug, PartialEq)]
pub struct DeclaredTensor {
    pub name: String,
    pub shape: Vec<i64>,
    pub element: ElementKind,
}

/// Runs one forward pass. Implementations hold the model for the session.
pub trait PoseEngine: Send + 'static {
    fn infer(&mut self, input: &InputTensor) -> PoseResult<Vec<OutputTensor>>;

    fn close(&mut self) {}
}

pub struct OrtEngine {
    session: Option<Session>,
    model_path: PathBuf,
}

impl OrtEngine {
    /// Loads the model and validates it against `contract`. Shape problems
    /// are reported here, once, not per frame.
    pub fn new(model_path: &Path, contract: &ModelContract) -> PoseResult<Self> {
        let session = Session::builder()
            .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|builder| builder.with_intra_threads(2))
            .and_then(|builder| builder.commit_from_file(model_path))
            .map_err(|err| {
                PoseError::InferenceUnavailable(format!(
                    "failed to load ORT session from {}: {err}",
                    model_path.display()
                ))
            })?;

        let inputs: Vec<DeclaredTensor> = session
            .inputs
            .iter()
            .map(|input| declared(&input.name, &input.input_type))
            .collect();
        let outputs: Vec<DeclaredTensor> = session
            .outputs
            .iter()
            .map(|output| declared(&output.name, &output.output_type))
            .collect();
        for tensor in inputs.iter().chain(outputs.iter()) {
            log::debug!(
                "model tensor {}: {:?} {:?}",
                tensor.name,
                tensor.element,
                tensor.shape
            );
        }
        contract.check(&inputs, &outputs)?;

        log::info!(
            "{} ORT backend ready using {}",
            contract.name,
            model_path.display()
        );
        Ok(Self {
            session: Some(session),
            model_path: model_path.to_path_buf(),
        })
    }
}

fn declared(name: &str, value_type: &ValueType) -> DeclaredTensor {
    match value_type {
        ValueType::Tensor { ty, shape, .. } => DeclaredTensor {
            name: name.to_string(),
            shape: shape.iter().copied().collect(),
            element: match ty {
                TensorElementType::Uint8 => ElementKind::U8,
                TensorElementType::Float32 => ElementKind::F32,
                _ => ElementKind::Other,
            },
        },
        _ => DeclaredTensor {
            name: name.to_string(),
            shape: Vec::new(),
            element: ElementKind::Other,
        },
    }
}

impl PoseEngine for OrtEngine {
    fn infer(&mut self, input: &InputTensor) -> PoseResult<Vec<OutputTensor>> {
        let Some(session) = self.session.as_mut() else {
            return Err(PoseError::InferenceUnavailable(format!(
                "session for {} is closed",
                self.model_path.display()
            )));
        };

        let run_failed = |err: ort::Error| PoseError::Inference(format!("ORT run failed: {err}"));
        let outputs = match input {
            InputTensor::U8(array) => {
                let tensor = Tensor::from_array(array.clone()).map_err(run_failed)?;
                session.run(ort::inputs![tensor]).map_err(run_failed)?
            }
            InputTensor::F32(array) => {
                let tensor = Tensor::from_array(array.clone()).map_err(run_failed)?;
                session.run(ort::inputs![tensor]).map_err(run_failed)?
            }
        };

        if outputs.len() < 1 {
            return Err(PoseError::Decode("model returned no outputs".to_string()));
        }

        let mut collected = Vec::with_capacity(outputs.len());
        for idx in 0..outputs.len() {
            let array = outputs[idx]
                .try_extract_array::<f32>()
                .map_err(|err| PoseError::Decode(format!("output {idx} is not f32: {err}")))?;
            collected.push(OutputTensor::new(
                array.shape().to_vec(),
                array.iter().copied().collect(),
            ));
        }
        Ok(collected)
    }

    fn close(&mut self) {
        if self.session.take().is_some() {
            log::info!("closed ORT session for {}", self.model_path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(shape: &[i64], element: ElementKind) -> DeclaredTensor {
        DeclaredTensor {
            name: "t".to_string(),
            shape: shape.to_vec(),
            element,
        }
    }

    #[test]
    fn movenet_contract_accepts_declared_model() {
        let contract = ModelContract::movenet(InputDtype::F32Normalized);
        let inputs = [tensor(&[1, 192, 192, 3], ElementKind::F32)];
        let outputs = [tensor(&[1, 1, 17, 3], ElementKind::F32)];
        assert!(contract.check(&inputs, &outputs).is_ok());
    }

    #[test]
    fn dynamic_batch_matches() {
        let contract = ModelContract::movenet(InputDtype::U8);
        let inputs = [tensor(&[-1, 192, 192, 3], ElementKind::U8)];
        let outputs = [tensor(&[-1, 1, 17, 3], ElementKind::F32)];
        assert!(contract.check(&inputs, &outputs).is_ok());
    }

    #[test]
    fn squeezed_output_rank_is_accepted() {
        let contract = ModelContract::movenet(InputDtype::F32Normalized);
        let inputs = [tensor(&[1, 192, 192, 3], ElementKind::F32)];
        let outputs = [tensor(&[1, 17, 3], ElementKind::F32)];
        assert!(contract.check(&inputs, &outputs).is_ok());
    }

    #[test]
    fn wrong_input_size_is_a_contract_error() {
        let contract = ModelContract::movenet(InputDtype::F32Normalized);
        let inputs = [tensor(&[1, 256, 256, 3], ElementKind::F32)];
        let outputs = [tensor(&[1, 1, 17, 3], ElementKind::F32)];
        assert!(matches!(
            contract.check(&inputs, &outputs),
            Err(PoseError::Contract(_))
        ));
    }

    #[test]
    fn wrong_dtype_is_a_contract_error() {
        let contract = ModelContract::movenet(InputDtype::U8);
        let inputs = [tensor(&[1, 192, 192, 3], ElementKind::F32)];
        let outputs = [tensor(&[1, 1, 17, 3], ElementKind::F32)];
        assert!(matches!(
            contract.check(&inputs, &outputs),
            Err(PoseError::Contract(_))
        ));
    }

    #[test]
    fn posenet_contract_requires_both_maps() {
        let contract = ModelContract::posenet(POSENET_GRID_SIZE);
        let inputs = [tensor(&[1, 257, 257, 3], ElementKind::F32)];
        let heatmap = tensor(&[1, 9, 9, 17], ElementKind::F32);
        let offsets = tensor(&[1, 9, 9, 34], ElementKind::F32);

        assert!(matches!(
            contract.check(&inputs, std::slice::from_ref(&heatmap)),
            Err(PoseError::Contract(_))
        ));
        assert!(contract.check(&inputs, &[heatmap, offsets]).is_ok());
    }

    #[test]
    fn missing_model_is_unavailable() {
        let contract = ModelContract::movenet(InputDtype::F32Normalized);
        let result = OrtEngine::new(Path::new("does/not/exist.onnx"), &contract);
        assert!(matches!(result, Err(PoseError::InferenceUnavailable(_))));
    }
}
