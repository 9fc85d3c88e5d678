use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub model: ModelConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
}

fn default_log_level() -> String {
    "info".to_string()
}

pub trait Validatable {
    fn get_path(&self) -> PathBuf;

    fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("Model file not found: {:?}", self.get_path()));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    Nhwc,
    Nchw,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub model_dir: PathBuf,
    pub onnx_file: String,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_input_size")]
    pub input_size: u32,
    #[serde(default = "default_layout")]
    pub layout: TensorLayout,
    #[serde(default = "default_pixel_scale")]
    pub pixel_scale: f32,
    #[serde(default = "default_min_probability")]
    pub min_probability: f32,
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_input_size() -> u32 {
    256
}

fn default_layout() -> TensorLayout {
    TensorLayout::Nhwc
}

fn default_pixel_scale() -> f32 {
    1.0
}

fn default_min_probability() -> f32 {
    0.30
}

impl ModelConfig {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let model_dir = path
            .parent()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let onnx_file = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            model_dir,
            onnx_file,
            num_instances: default_model_instances(),
            input_size: default_input_size(),
            layout: default_layout(),
            pixel_scale: default_pixel_scale(),
            min_probability: default_min_probability(),
        }
    }
}

impl Validatable for ModelConfig {
    fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }
}

/// Thresholds of the plant-presence heuristic.
///
/// Hue is on the 0..180 scale, saturation and value on 0..255. Fractions are
/// in 0..1 and compared strictly.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AdmissionConfig {
    pub hue_min: u8,
    pub hue_max: u8,
    pub saturation_min: u8,
    pub value_min: u8,
    pub min_green_fraction: f32,
    pub canny_low: f32,
    pub canny_high: f32,
    /// `imageproc`'s Canny blurs (sigma 1.4) before an L2 gradient, so fine
    /// texture yields fewer edge pixels than an unblurred L1 detector at the
    /// same thresholds. Lower this if real leaves start failing the check.
    pub min_edge_fraction: f32,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            hue_min: 35,
            hue_max: 85,
            saturation_min: 40,
            value_min: 40,
            min_green_fraction: 0.15,
            canny_low: 50.0,
            canny_high: 150.0,
            min_edge_fraction: 0.02,
        }
    }
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let base_path = std::env::current_dir().map_err(|e| {
        config::ConfigError::Message(format!("Failed to determine the current directory: {e}"))
    })?;
    let configuration_directory = base_path.join("configuration");

    let environment: Environment = std::env::var("APP_ENVIRONMENT")
        .unwrap_or_else(|_| "local".into())
        .try_into()
        .map_err(config::ConfigError::Message)?;

    let settings = config::Config::builder()
        .add_source(config::File::from(
            configuration_directory.join("base.yaml"),
        ))
        .add_source(
            config::File::from(
                configuration_directory.join(format!("{}.yaml", environment.as_str())),
            )
            .required(false),
        )
        .add_source(
            config::Environment::with_prefix("TOMATO")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    let settings = settings.try_deserialize::<Settings>()?;
    tracing::debug!("Loaded configuration: {:?}", settings);

    Ok(settings)
}

pub enum Environment {
    Local,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Local => "local",
            Environment::Production => "production",
        }
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            other => Err(format!(
                "{} is not a supported environment. Use either `local` or `production`.",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_from_path() {
        let config = ModelConfig::from_path("models/tomato.onnx");

        assert_eq!(config.get_path(), PathBuf::from("models/tomato.onnx"));
        assert_eq!(config.input_size, 256);
        assert_eq!(config.layout, TensorLayout::Nhwc);
        assert!((config.min_probability - 0.30).abs() < f32::EPSILON);
    }

    #[test]
    fn test_missing_model_fails_validation() {
        let config = ModelConfig::from_path("does/not/exist.onnx");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_admission_section_keeps_defaults() {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                "model:\n  model_dir: models\n  onnx_file: tomato.onnx\n  layout: nchw\nadmission:\n  min_green_fraction: 0.25\n",
                config::FileFormat::Yaml,
            ))
            .build()
            .unwrap()
            .try_deserialize::<Settings>()
            .unwrap();

        assert_eq!(settings.model.layout, TensorLayout::Nchw);
        assert!((settings.admission.min_green_fraction - 0.25).abs() < f32::EPSILON);
        assert!((settings.admission.min_edge_fraction - 0.02).abs() < f32::EPSILON);
        assert_eq!(settings.admission.hue_min, 35);
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn test_environment_parsing() {
        let env: Environment = "Production".to_string().try_into().unwrap();
        assert_eq!(env.as_str(), "production");
        assert!(Environment::try_from("staging".to_string()).is_err());
    }
}
