//! 图片发布
//!
//! 先写同目录下的临时文件再改名覆盖，读者永远看不到写了一半的图片

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::RenderError;

/// 临时文件路径：`dash.png` → `.dash.png.tmp`
fn temp_path_for(output: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(output.file_name().unwrap_or_default());
    name.push(".tmp");
    output.with_file_name(name)
}

/// 原子替换 `output` 的内容
pub async fn publish(output: &Path, bytes: &[u8]) -> Result<(), RenderError> {
    let publish_err = |source| RenderError::Publish {
        path: output.to_path_buf(),
        source,
    };

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(publish_err)?;
    }

    let temp = temp_path_for(output);
    let written = async {
        let mut file = fs::File::create(&temp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        fs::rename(&temp, output).await
    }
    .await;

    if let Err(e) = written {
        if let Err(cleanup) = fs::remove_file(&temp).await {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                warn!("清理临时文件 {} 失败: {}", temp.display(), cleanup);
            }
        }
        return Err(publish_err(e));
    }

    debug!("已发布 {} ({} 字节)", output.display(), bytes.len());
    Ok(())
}
