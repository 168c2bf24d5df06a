// Configuration module
//
// Two layers live here: `Options`, the install options payload that can be
// replaced at runtime through `set_options`, and `InstallConfig`, the YAML file
// the binary boots from (options plus timing, renderer and logging settings).

pub mod store;

pub use store::{ConfigStore, Snapshot};

use crate::error::ConfigError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

fn default_text() -> String {
    "Copyright".to_string()
}

fn default_text_size() -> u32 {
    24
}

fn default_text_color() -> String {
    "#FFFFFF".to_string()
}

fn default_opacity() -> f32 {
    50.0
}

fn default_min_width() -> u32 {
    100
}

fn default_min_height() -> u32 {
    100
}

fn default_location() -> String {
    "body".to_string()
}

fn default_render_timeout_ms() -> u64 {
    5000
}

fn default_reconfigure_delay_ms() -> u64 {
    2000
}

fn default_frame_interval_ms() -> u64 {
    16
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Where the watermark text is drawn on the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Position {
    #[serde(alias = "upper-left", alias = "top-left")]
    UpperLeft,
    #[serde(alias = "upper-right", alias = "top-right")]
    UpperRight,
    #[serde(alias = "lower-left", alias = "bottom-left")]
    LowerLeft,
    #[serde(alias = "lower-right", alias = "bottom-right")]
    LowerRight,
    Center,
}

impl Position {
    /// Upper placements anchor the text baseline at a vertical offset.
    pub fn is_upper(&self) -> bool {
        matches!(self, Position::UpperLeft | Position::UpperRight)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Position::UpperLeft => "upperLeft",
            Position::UpperRight => "upperRight",
            Position::LowerLeft => "lowerLeft",
            Position::LowerRight => "lowerRight",
            Position::Center => "center",
        }
    }
}

/// Settings that scope which images are managed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Advanced {
    /// Images narrower than this are left alone
    #[serde(default = "default_min_width")]
    pub min_width: u32,

    /// Images shorter than this are left alone
    #[serde(default = "default_min_height")]
    pub min_height: u32,

    /// Selector identifying the managed container
    #[serde(default = "default_location")]
    pub location: String,
}

impl Default for Advanced {
    fn default() -> Self {
        Self {
            min_width: default_min_width(),
            min_height: default_min_height(),
            location: default_location(),
        }
    }
}

/// Watermark options, replaceable as a unit at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Options {
    #[serde(default = "default_text")]
    pub text: String,

    #[serde(default = "Options::default_position")]
    pub position: Position,

    /// Text size in pixels
    #[serde(default = "default_text_size")]
    pub text_size: u32,

    /// CSS-style color string, `#RGB` or `#RRGGBB`
    #[serde(default = "default_text_color")]
    pub text_color: String,

    /// Opacity in percent (0-100); fractional values are accepted
    #[serde(default = "default_opacity")]
    pub opacity: f32,

    #[serde(default)]
    pub advanced: Advanced,
}

impl Options {
    fn default_position() -> Position {
        Position::LowerRight
    }

    /// Reject option sets that can never produce a watermark.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=100.0).contains(&self.opacity) {
            return Err(ConfigError::Invalid(format!(
                "opacity must be between 0 and 100, got {}",
                self.opacity
            )));
        }

        if self.text_size == 0 {
            return Err(ConfigError::Invalid(
                "textSize must be greater than 0".to_string(),
            ));
        }

        if self.advanced.location.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "advanced.location cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            text: default_text(),
            position: Self::default_position(),
            text_size: default_text_size(),
            text_color: default_text_color(),
            opacity: default_opacity(),
            advanced: Advanced::default(),
        }
    }
}

/// Whether the installation runs in a preview pane or on the live site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    Preview,
    Live,
}

impl InstallMode {
    /// Only the literal install id `preview` selects preview mode.
    pub fn from_install_id(install_id: &str) -> Self {
        if install_id == "preview" {
            InstallMode::Preview
        } else {
            InstallMode::Live
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallMode::Preview => "preview",
            InstallMode::Live => "live",
        }
    }
}

/// Timer budgets for the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    /// Advisory render budget; past it the image is flagged `timeout`
    #[serde(default = "default_render_timeout_ms")]
    pub render_timeout_ms: u64,

    /// Debounce window for bulk reprocessing after `set_options`
    #[serde(default = "default_reconfigure_delay_ms")]
    pub reconfigure_delay_ms: u64,

    /// Spacing between frame-aligned reprocess dispatches
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

impl Timing {
    pub fn render_timeout(&self) -> Duration {
        Duration::from_millis(self.render_timeout_ms)
    }

    pub fn reconfigure_delay(&self) -> Duration {
        Duration::from_millis(self.reconfigure_delay_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            render_timeout_ms: default_render_timeout_ms(),
            reconfigure_delay_ms: default_reconfigure_delay_ms(),
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

/// Cross-origin capability handed to the renderer at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrossOrigin {
    /// Remote sources are fetched for pixel access regardless of origin
    #[default]
    Anonymous,
    /// Only sources sharing the document origin may be read
    SameOrigin,
}

/// Settings for the built-in compositing renderer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    #[serde(default)]
    pub cross_origin: CrossOrigin,

    /// TrueType/OpenType font used to draw the text
    #[serde(default)]
    pub font_path: Option<PathBuf>,

    /// Directory relative file sources are resolved against
    #[serde(default)]
    pub base_dir: Option<PathBuf>,

    /// Origin of the document (scheme://host[:port]), used for same-origin checks
    #[serde(default)]
    pub document_origin: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Root of the install configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallConfig {
    #[serde(default)]
    pub install_id: String,

    #[serde(default)]
    pub options: Options,

    #[serde(default)]
    pub timing: Timing,

    #[serde(default)]
    pub renderer: RendererConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl InstallConfig {
    pub fn mode(&self) -> InstallMode {
        InstallMode::from_install_id(&self.install_id)
    }

    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, ConfigError> {
        // Replace ${VAR_NAME} with environment variable values
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| ConfigError::Parse(e.to_string()))?;

        let mut substituted = String::with_capacity(yaml.len());
        let mut last = 0;
        for caps in re.captures_iter(yaml) {
            let whole = caps.get(0).ok_or_else(|| ConfigError::Parse("empty match".into()))?;
            let var_name = &caps[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::MissingEnv(var_name.to_string()))?;
            substituted.push_str(&yaml[last..whole.start()]);
            substituted.push_str(&value);
            last = whole.end();
        }
        substituted.push_str(&yaml[last..]);

        let config: InstallConfig = serde_yaml::from_str(&substituted)?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_with_env(&yaml)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.options.validate()?;

        if self.timing.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "timing.frame_interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.renderer.cross_origin == CrossOrigin::SameOrigin
            && self.renderer.document_origin.is_none()
        {
            return Err(ConfigError::Invalid(
                "renderer.document_origin is required for same-origin mode".to_string(),
            ));
        }

        Ok(())
    }
}
