use async_trait::async_trait;
use image::DynamicImage;
use image::imageops::FilterType;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tch::nn::ModuleT;
use tch::{CModule, Device, Kind, Tensor};

use super::{BackendError, ClassifierBackend, RawPrediction, rank_top_k};

const INPUT_SIZE: u32 = 224;
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// ImageNet-style TorchScript module evaluated in-process.
#[derive(Clone)]
pub struct TorchScriptClassifier {
    id: String,
    model: Arc<Mutex<CModule>>,
    labels: Arc<Vec<String>>,
    device: Device,
}

impl TorchScriptClassifier {
    pub fn load(id: String, model_path: &Path, labels_path: &Path) -> Result<Self, BackendError> {
        let device = Device::cuda_if_available();
        let model = CModule::load_on_device(model_path, device).map_err(|e| {
            BackendError::Unavailable(format!("failed to load {}: {}", model_path.display(), e))
        })?;
        let labels = std::fs::read_to_string(labels_path)
            .map_err(|e| {
                BackendError::Unavailable(format!(
                    "failed to read labels {}: {}",
                    labels_path.display(),
                    e
                ))
            })?
            .lines()
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .collect();
        Ok(Self {
            id,
            model: Arc::new(Mutex::new(model)),
            labels: Arc::new(labels),
            device,
        })
    }

    fn preprocess(&self, image: &DynamicImage) -> Tensor {
        let resized = image
            .resize_exact(INPUT_SIZE, INPUT_SIZE, FilterType::Triangle)
            .to_rgb8();
        let size = INPUT_SIZE as usize;
        let mut data = vec![0f32; 3 * size * size];
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel[c] as f32 / 255.0;
                data[c * size * size + y as usize * size + x as usize] = (value - MEAN[c]) / STD[c];
            }
        }
        Tensor::from_slice(&data)
            .view([1, 3, INPUT_SIZE as i64, INPUT_SIZE as i64])
            .to_device(self.device)
    }

    fn inference(&self, image: &DynamicImage) -> Result<Vec<(String, f64)>, BackendError> {
        let tensor = self.preprocess(image);
        let output = {
            let model = self
                .model
                .lock()
                .map_err(|_| BackendError::Unavailable(format!("{} model lock poisoned", self.id)))?;
            model.forward_t(&tensor, false)
        };
        let probabilities = output.softmax(-1, Kind::Float).view([-1]).to_device(Device::Cpu);
        let num_elements = probabilities.size()[0] as usize;
        if num_elements != self.labels.len() {
            return Err(BackendError::Decode(format!(
                "{} produced {} classes but has {} labels",
                self.id,
                num_elements,
                self.labels.len()
            )));
        }
        let mut output_vec = vec![0.0f32; num_elements];
        probabilities.copy_data(&mut output_vec, num_elements);
        Ok(self
            .labels
            .iter()
            .cloned()
            .zip(output_vec.into_iter().map(f64::from))
            .collect())
    }
}

#[async_trait]
impl ClassifierBackend for TorchScriptClassifier {
    fn id(&self) -> &str {
        &self.id
    }

    async fn classify(
        &self,
        image: Arc<DynamicImage>,
        top_k: usize,
    ) -> Result<Vec<RawPrediction>, BackendError> {
        let this = self.clone();
        let scores = tokio::task::spawn_blocking(move || this.inference(&image))
            .await
            .map_err(|e| BackendError::Unavailable(format!("inference task failed: {}", e)))??;
        Ok(rank_top_k(scores, top_k, &self.id))
    }
}
