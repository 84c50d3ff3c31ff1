// 该文件是 Swachhta （清洁看板） 项目的一部分。
// src/input.rs - 上传数据/图像输入
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

use base64::{Engine, engine::general_purpose::STANDARD};
use image::RgbImage;
use thiserror::Error;

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[error("data URL 格式错误")]
  MalformedDataUrl,
  #[error("Base64 解码错误: {0}")]
  Base64(#[from] base64::DecodeError),
  #[error("图像解码错误: {0}")]
  Image(#[from] image::ImageError),
}

/// 解析 `data:<mime>;base64,<data>`，头部不做校验，只取第一个逗号之后的内容
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, InputError> {
  let (_header, encoded) = data_url
    .split_once(',')
    .ok_or(InputError::MalformedDataUrl)?;

  let encoded: String = encoded
    .chars()
    .filter(|c| !c.is_ascii_whitespace())
    .collect();
  Ok(STANDARD.decode(encoded)?)
}

/// 解码任意受支持格式的图像字节为 RGB 图像
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, InputError> {
  Ok(image::load_from_memory(bytes)?.to_rgb8())
}
