// 该文件是 Swachhta （清洁看板） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::path::Path;

use image::RgbImage;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 保存图像，格式由扩展名决定，父目录不存在时自动创建
pub fn save_image<P: AsRef<Path>>(path: P, image: &RgbImage) -> Result<(), SaveImageFileError> {
  let path = path.as_ref();
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }

  image.save(path)?;
  debug!("保存图像到文件: {}", path.display());

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn saves_jpeg_into_missing_directory() {
    let dir = std::env::temp_dir().join(format!("swachhta-save-{}", std::process::id()));
    let path = dir.join("nested").join("frame.jpg");
    let image = RgbImage::from_pixel(32, 16, image::Rgb([200, 10, 10]));

    save_image(&path, &image).unwrap();
    let reopened = image::open(&path).unwrap();
    std::fs::remove_dir_all(&dir).unwrap();

    assert_eq!((reopened.width(), reopened.height()), (32, 16));
  }

  #[test]
  fn unknown_extension_is_an_image_error() {
    let path = std::env::temp_dir().join(format!("swachhta-save-{}.nope", std::process::id()));
    let image = RgbImage::new(4, 4);

    assert!(matches!(
      save_image(&path, &image),
      Err(SaveImageFileError::ImageError(_))
    ));
  }
}
