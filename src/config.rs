// config.rs
//
// Viewer configuration:
// - File: panorama.json, searched in
//   1) <exe_dir>/panorama.json
//   2) ./panorama.json  (dev working dir)
//   or given explicitly with --config <path>
// - CLI overrides: --image <path> --video <path> --mesh sphere|cube --precision auto|high|medium
// - Env overrides: PANORAMA_IMAGE, PANORAMA_VIDEO
// - CLI beats env, env beats file, file beats defaults

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::camera::{DEFAULT_FOV, FAR, NEAR};
use crate::mesh::MeshShape;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecisionPreference {
    /// High on WebGPU-compliant adapters, medium on downlevel backends.
    #[default]
    Auto,
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub image: Option<PathBuf>,
    pub video: Option<PathBuf>,
    pub mesh: MeshShape,
    pub radius: f32,
    pub fov: f32,
    pub sensitivity: f32,
    pub precision: PrecisionPreference,
    pub vsync: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            image: None,
            video: None,
            mesh: MeshShape::Sphere,
            radius: 10.0,
            fov: DEFAULT_FOV,
            sensitivity: 1.0,
            precision: PrecisionPreference::Auto,
            vsync: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("invalid value {value:?} for {flag}")]
    InvalidValue { flag: String, value: String },
    #[error("radius {radius} puts the {mesh:?} outside the clip range ({near}..{far})")]
    RadiusOutOfRange {
        radius: f32,
        mesh: MeshShape,
        near: f32,
        far: f32,
    },
}

pub fn load_file(path: &Path) -> Result<ViewerConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn find_config_file() -> Option<PathBuf> {
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let p = dir.join("panorama.json");
            if p.exists() {
                return Some(p);
            }
        }
    }

    let p = PathBuf::from("panorama.json");
    if p.exists() {
        return Some(p);
    }

    None
}

fn parse_enum<T: for<'de> Deserialize<'de>>(flag: &str, value: &str) -> Result<T, ConfigError> {
    serde_json::from_value(serde_json::Value::String(value.to_lowercase())).map_err(|_| {
        ConfigError::InvalidValue {
            flag: flag.to_string(),
            value: value.to_string(),
        }
    })
}

/// Applies `--flag value` pairs on top of `config`. Unknown arguments are
/// ignored (winit / platform launchers may add their own).
pub fn apply_args<I>(config: &mut ViewerConfig, args: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = String>,
{
    let mut it = args.into_iter();
    while let Some(a) = it.next() {
        let flag = a.as_str();
        if !matches!(flag, "--image" | "--video" | "--mesh" | "--precision" | "--config") {
            continue;
        }
        let value = it
            .next()
            .ok_or_else(|| ConfigError::MissingValue(flag.to_string()))?;
        match flag {
            "--image" => config.image = Some(PathBuf::from(value)),
            "--video" => config.video = Some(PathBuf::from(value)),
            "--mesh" => config.mesh = parse_enum(flag, &value)?,
            "--precision" => config.precision = parse_enum(flag, &value)?,
            // 已在 resolve() 中处理
            _ => {}
        }
    }
    Ok(())
}

fn apply_env(config: &mut ViewerConfig) {
    if let Ok(v) = std::env::var("PANORAMA_IMAGE") {
        if !v.trim().is_empty() {
            config.image = Some(PathBuf::from(v));
        }
    }
    if let Ok(v) = std::env::var("PANORAMA_VIDEO") {
        if !v.trim().is_empty() {
            config.video = Some(PathBuf::from(v));
        }
    }
}

fn explicit_config_path(args: &[String]) -> Option<PathBuf> {
    args.windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| PathBuf::from(&w[1]))
}

/// The whole mesh has to sit between the camera's near and far planes.
pub fn validate(config: &ViewerConfig) -> Result<(), ConfigError> {
    let radius = config.radius;
    if !radius.is_finite() || radius <= NEAR || config.mesh.extent(radius) >= FAR {
        return Err(ConfigError::RadiusOutOfRange {
            radius,
            mesh: config.mesh,
            near: NEAR,
            far: FAR,
        });
    }
    Ok(())
}

/// Builds the viewer configuration from file, environment and CLI.
pub fn resolve() -> Result<ViewerConfig, ConfigError> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut config = match explicit_config_path(&args).or_else(find_config_file) {
        Some(path) => {
            log::info!("loading config from {}", path.display());
            load_file(&path)?
        }
        None => ViewerConfig::default(),
    };

    apply_env(&mut config);
    apply_args(&mut config, args)?;
    validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config: ViewerConfig =
            serde_json::from_str(r#"{ "video": "clips/pano.gif", "mesh": "cube" }"#).unwrap();
        assert_eq!(config.video, Some(PathBuf::from("clips/pano.gif")));
        assert_eq!(config.mesh, MeshShape::Cube);
        assert_eq!(config.fov, DEFAULT_FOV);
        assert!(config.vsync);
        assert_eq!(config.precision, PrecisionPreference::Auto);
    }

    #[test]
    fn cli_overrides_file() {
        let mut config = ViewerConfig {
            image: Some(PathBuf::from("a.jpg")),
            ..Default::default()
        };
        apply_args(
            &mut config,
            args(&["--image", "b.jpg", "--mesh", "Cube", "--precision", "medium", "--verbose"]),
        )
        .unwrap();
        assert_eq!(config.image, Some(PathBuf::from("b.jpg")));
        assert_eq!(config.mesh, MeshShape::Cube);
        assert_eq!(config.precision, PrecisionPreference::Medium);
    }

    #[test]
    fn bad_values_are_reported() {
        let mut config = ViewerConfig::default();
        let err = apply_args(&mut config, args(&["--mesh", "torus"])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = apply_args(&mut config, args(&["--video"])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingValue(_)));
    }

    #[test]
    fn radius_must_fit_the_clip_range() {
        assert!(validate(&ViewerConfig::default()).is_ok());

        for radius in [0.0, -10.0, NEAR, f32::NAN, FAR, 2000.0] {
            let config = ViewerConfig { radius, ..Default::default() };
            let err = validate(&config).unwrap_err();
            assert!(matches!(err, ConfigError::RadiusOutOfRange { .. }), "radius {}", radius);
        }
    }

    #[test]
    fn cube_corners_count_towards_the_far_plane() {
        let sphere = ViewerConfig { radius: 600.0, ..Default::default() };
        assert!(validate(&sphere).is_ok());

        let cube = ViewerConfig { mesh: MeshShape::Cube, ..sphere };
        assert!(validate(&cube).is_err());
    }

    #[test]
    fn radius_is_read_from_file() {
        let config: ViewerConfig = serde_json::from_str(r#"{ "radius": 0 }"#).unwrap();
        assert_eq!(config.radius, 0.0);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn config_flag_is_found() {
        let a = args(&["--mesh", "cube", "--config", "custom.json"]);
        assert_eq!(explicit_config_path(&a), Some(PathBuf::from("custom.json")));
        assert_eq!(explicit_config_path(&args(&["--config"])), None);
    }
}
