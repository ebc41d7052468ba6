use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// 默认配置文件名（存在时自动加载）
pub const DEFAULT_CONFIG_FILE: &str = "eink.toml";

/// 图片转换方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConverterKind {
    /// 进程内转换（image + png）
    Native,
    /// 调用外部工具（默认 ImageMagick `convert`）
    External,
}

impl std::str::FromStr for ConverterKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "native" => Ok(ConverterKind::Native),
            "external" => Ok(ConverterKind::External),
            _ => Err(()),
        }
    }
}

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP 监听地址
    pub bind: String,
    /// 被截图应用的基础地址，目标 URL 为 `{base_url}/{name}/`
    pub base_url: String,
    /// 应用静态文件目录，每个子目录是一个渲染目标
    pub public_dir: PathBuf,
    /// 截图输出目录
    pub screenshots_dir: PathBuf,
    /// 尚无截图时返回的兜底图片
    pub fallback_image: PathBuf,
    /// 两次成功渲染之间的最小间隔（秒）
    pub min_render_interval_secs: u64,
    /// 等待他人渲染的上限（秒）
    pub wait_ceiling_secs: u64,
    /// 导航与截图超时（秒）
    pub capture_timeout_secs: u64,
    /// 图片转换超时（秒）
    pub convert_timeout_secs: u64,
    /// 导航完成后额外等待页面稳定的时间（毫秒）
    pub settle_delay_ms: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub converter: ConverterKind,
    /// 外部转换程序
    pub convert_program: String,
    /// 是否使用 Floyd–Steinberg 抖动（否则按阈值二值化）
    pub dither: bool,
    /// Chrome 可执行文件路径，为空时由 chromiumoxide 自动查找
    pub chrome_executable: Option<PathBuf>,
    /// 是否启用 `/render.png` 旧接口
    pub legacy_enabled: bool,
    /// 旧接口渲染的页面地址
    pub legacy_render_url: String,
    /// 后台定时刷新间隔（秒），0 表示关闭
    pub refresh_interval_secs: u64,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:5000".to_string(),
            base_url: "http://localhost:5000".to_string(),
            public_dir: PathBuf::from("public"),
            screenshots_dir: PathBuf::from("screenshots"),
            fallback_image: PathBuf::from("static/muse.bmp"),
            min_render_interval_secs: 60,
            wait_ceiling_secs: 35,
            capture_timeout_secs: 30,
            convert_timeout_secs: 30,
            settle_delay_ms: 500,
            viewport_width: 800,
            viewport_height: 480,
            converter: ConverterKind::Native,
            convert_program: "convert".to_string(),
            dither: true,
            chrome_executable: None,
            legacy_enabled: true,
            legacy_render_url: "http://localhost:4173/".to_string(),
            refresh_interval_secs: 0,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 按 默认值 → 配置文件 → 环境变量 的顺序加载配置
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("EINK_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            Err(_) => Self::default(),
        };
        let config = base.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文件读取配置，缺省字段使用默认值
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileInvalid {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            ConfigError::FileInvalid { message, .. } => ConfigError::FileInvalid {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::FileInvalid {
            path: String::new(),
            message: e.to_string(),
        })
    }

    /// 仅使用默认值和环境变量
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    fn with_env_overrides(self) -> Result<Self, ConfigError> {
        Ok(Self {
            bind: env_string("EINK_BIND").unwrap_or(self.bind),
            base_url: env_string("EINK_BASE_URL").unwrap_or(self.base_url),
            public_dir: env_string("EINK_PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or(self.public_dir),
            screenshots_dir: env_string("EINK_SCREENSHOTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(self.screenshots_dir),
            fallback_image: env_string("EINK_FALLBACK_IMAGE")
                .map(PathBuf::from)
                .unwrap_or(self.fallback_image),
            min_render_interval_secs: env_parse("EINK_MIN_RENDER_INTERVAL_SECS", "u64")?
                .unwrap_or(self.min_render_interval_secs),
            wait_ceiling_secs: env_parse("EINK_WAIT_CEILING_SECS", "u64")?
                .unwrap_or(self.wait_ceiling_secs),
            capture_timeout_secs: env_parse("EINK_CAPTURE_TIMEOUT_SECS", "u64")?
                .unwrap_or(self.capture_timeout_secs),
            convert_timeout_secs: env_parse("EINK_CONVERT_TIMEOUT_SECS", "u64")?
                .unwrap_or(self.convert_timeout_secs),
            settle_delay_ms: env_parse("EINK_SETTLE_DELAY_MS", "u64")?
                .unwrap_or(self.settle_delay_ms),
            viewport_width: env_parse("EINK_VIEWPORT_WIDTH", "u32")?
                .unwrap_or(self.viewport_width),
            viewport_height: env_parse("EINK_VIEWPORT_HEIGHT", "u32")?
                .unwrap_or(self.viewport_height),
            converter: env_parse("EINK_CONVERTER", "native|external")?
                .unwrap_or(self.converter),
            convert_program: env_string("EINK_CONVERT_PROGRAM").unwrap_or(self.convert_program),
            dither: env_parse("EINK_DITHER", "bool")?.unwrap_or(self.dither),
            chrome_executable: env_string("EINK_CHROME_EXECUTABLE")
                .map(PathBuf::from)
                .or(self.chrome_executable),
            legacy_enabled: env_parse("EINK_LEGACY_ENABLED", "bool")?
                .unwrap_or(self.legacy_enabled),
            legacy_render_url: env_string("RENDER_URL").unwrap_or(self.legacy_render_url),
            refresh_interval_secs: env_parse("EINK_REFRESH_INTERVAL_SECS", "u64")?
                .unwrap_or(self.refresh_interval_secs),
            verbose_logging: env_parse("VERBOSE_LOGGING", "bool")?
                .unwrap_or(self.verbose_logging),
        })
    }

    /// 检查配置取值
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.viewport_width == 0 || self.viewport_height == 0 {
            return Err(ConfigError::Invalid {
                field: "viewport",
                reason: format!(
                    "尺寸不能为 0 ({}x{})",
                    self.viewport_width, self.viewport_height
                ),
            });
        }
        if self.wait_ceiling_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "wait_ceiling_secs",
                reason: "必须大于 0".to_string(),
            });
        }
        if self.capture_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "capture_timeout_secs",
                reason: "必须大于 0".to_string(),
            });
        }
        if self.converter == ConverterKind::External && self.convert_program.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "convert_program",
                reason: "使用外部转换时不能为空".to_string(),
            });
        }
        Ok(())
    }

    pub fn min_render_interval(&self) -> Duration {
        Duration::from_secs(self.min_render_interval_secs)
    }

    pub fn wait_ceiling(&self) -> Duration {
        Duration::from_secs(self.wait_ceiling_secs)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_secs(self.capture_timeout_secs)
    }

    pub fn convert_timeout(&self) -> Duration {
        Duration::from_secs(self.convert_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// 后台刷新间隔，未开启时为 `None`
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }
}

fn env_string(var_name: &str) -> Option<String> {
    std::env::var(var_name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(
    var_name: &str,
    expected_type: &str,
) -> Result<Option<T>, ConfigError> {
    match env_string(var_name) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            }),
    }
}
