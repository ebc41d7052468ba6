//! 图片转换 - 基础设施层
//!
//! 把浏览器截图转换为 e-ink 屏幕可用的 1 位黑白 PNG

use std::future::Future;
use std::path::{Path, PathBuf};

use image::imageops::{self, BiLevel};
use image::GrayImage;
use tokio::process::Command;
use tokio::task::spawn_blocking;
use tracing::debug;

use crate::config::{Config, ConverterKind};
use crate::error::RenderError;

/// 转换能力
pub trait ImageConverter: Send + Sync {
    fn convert(&self, raw: &[u8]) -> impl Future<Output = Result<Vec<u8>, RenderError>> + Send;
}

/// 进程内转换：灰度 → 抖动/阈值 → 1 位 PNG
#[derive(Debug, Clone, Copy)]
pub struct MonochromeConverter {
    dither: bool,
}

impl MonochromeConverter {
    pub fn new(dither: bool) -> Self {
        Self { dither }
    }

    /// 同步转换（放在阻塞线程池中执行）
    pub fn convert_blocking(&self, raw: &[u8]) -> Result<Vec<u8>, RenderError> {
        let mut gray = image::load_from_memory(raw)?.to_luma8();
        if self.dither {
            imageops::dither(&mut gray, &BiLevel);
        } else {
            for pixel in gray.pixels_mut() {
                pixel.0[0] = if pixel.0[0] >= 128 { 255 } else { 0 };
            }
        }
        encode_1bit_png(&gray)
    }
}

impl Default for MonochromeConverter {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ImageConverter for MonochromeConverter {
    async fn convert(&self, raw: &[u8]) -> Result<Vec<u8>, RenderError> {
        let converter = *self;
        let raw = raw.to_vec();
        spawn_blocking(move || converter.convert_blocking(&raw))
            .await
            .map_err(|e| RenderError::conversion(format!("转换任务异常退出: {}", e)))?
    }
}

/// 按行打包像素（高位在前，1 = 白）
fn encode_1bit_png(gray: &GrayImage) -> Result<Vec<u8>, RenderError> {
    let (width, height) = gray.dimensions();
    let row_bytes = (width as usize).div_ceil(8);
    let mut packed = vec![0u8; row_bytes * height as usize];

    for (x, y, pixel) in gray.enumerate_pixels() {
        if pixel.0[0] >= 128 {
            packed[y as usize * row_bytes + x as usize / 8] |= 0x80 >> (x % 8);
        }
    }

    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::One);
        let mut writer = encoder.write_header()?;
        writer.write_image_data(&packed)?;
        writer.finish()?;
    }
    Ok(out)
}

/// 外部工具转换
///
/// 原始截图写入临时目录，调用 `{program} input -dither FloydSteinberg -monochrome
/// -depth 1 png:output`，读取结果后临时目录随之删除
#[derive(Debug, Clone)]
pub struct ExternalConverter {
    program: PathBuf,
    dither: bool,
}

impl ExternalConverter {
    pub fn new(program: impl Into<PathBuf>, dither: bool) -> Self {
        Self {
            program: program.into(),
            dither,
        }
    }

    fn args(&self, input: &Path, output: &Path) -> Vec<String> {
        let mut args = vec![input.display().to_string()];
        if self.dither {
            args.push("-dither".to_string());
            args.push("FloydSteinberg".to_string());
        } else {
            args.push("+dither".to_string());
        }
        args.extend(["-monochrome", "-depth", "1"].map(String::from));
        args.push(format!("png:{}", output.display()));
        args
    }
}

impl ExternalConverter {
    /// 在 `workdir` 中写入截图、调用外部程序并读回结果
    async fn convert_in(&self, workdir: &Path, raw: &[u8]) -> Result<Vec<u8>, RenderError> {
        let input = workdir.join("capture.png");
        let output = workdir.join("converted.png");

        tokio::fs::write(&input, raw)
            .await
            .map_err(|e| RenderError::conversion(format!("无法写入原始截图: {}", e)))?;

        debug!("调用外部转换: {}", self.program.display());
        let result = Command::new(&self.program)
            .args(self.args(&input, &output))
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                RenderError::conversion(format!("无法启动 {}: {}", self.program.display(), e))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(RenderError::conversion(format!(
                "{} 退出状态 {}: {}",
                self.program.display(),
                result.status,
                stderr.trim()
            )));
        }

        tokio::fs::read(&output)
            .await
            .map_err(|e| RenderError::conversion(format!("无法读取转换结果: {}", e)))
    }
}

impl ImageConverter for ExternalConverter {
    async fn convert(&self, raw: &[u8]) -> Result<Vec<u8>, RenderError> {
        // 临时目录的创建和删除都是同步 IO，放到阻塞线程池
        let workdir = spawn_blocking(|| tempfile::Builder::new().prefix("eink-convert-").tempdir())
            .await
            .map_err(|e| RenderError::conversion(format!("临时目录任务异常退出: {}", e)))?
            .map_err(|e| RenderError::conversion(format!("无法创建临时目录: {}", e)))?;

        let result = self.convert_in(workdir.path(), raw).await;

        match spawn_blocking(move || workdir.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("删除临时目录失败: {}", e),
            Err(e) => debug!("删除临时目录任务异常退出: {}", e),
        }
        result
    }
}

/// 按配置选择的转换器
#[derive(Debug, Clone)]
pub enum Converter {
    Native(MonochromeConverter),
    External(ExternalConverter),
}

impl Converter {
    pub fn from_config(config: &Config) -> Self {
        match config.converter {
            ConverterKind::Native => Converter::Native(MonochromeConverter::new(config.dither)),
            ConverterKind::External => Converter::External(ExternalConverter::new(
                &config.convert_program,
                config.dither,
            )),
        }
    }
}

impl ImageConverter for Converter {
    async fn convert(&self, raw: &[u8]) -> Result<Vec<u8>, RenderError> {
        match self {
            Converter::Native(c) => c.convert(raw).await,
            Converter::External(c) => c.convert(raw).await,
        }
    }
}
