// 该文件是 Swachhta （清洁看板） 项目的一部分。
// src/bin/oneshot.rs - 单张图像检测
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use swachhta::{
  FromUrl,
  detector::Detector,
  input::ImageFileInput,
  model::{Labels, ModelConfig, Yolo26Builder},
  output::save_image,
};

/// 对单张图像运行检测并保存绘制结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// RKNN 模型地址
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像，例如 image:///data/frame.jpg
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出图像路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: PathBuf,
  /// 类别名称文件
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,
  /// 置信度阈值
  #[arg(long, default_value = "0.25", value_name = "THRESHOLD")]
  pub confidence: f32,
  /// NMS IOU 阈值
  #[arg(long, default_value = "0.45", value_name = "THRESHOLD")]
  pub iou: f32,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output.display());

  let image = ImageFileInput::from_url(&args.input)?.into_image();
  let model = Yolo26Builder::from_url(&args.model)?
    .config(ModelConfig {
      confidence: args.confidence,
      iou: args.iou,
    })
    .build()?;
  let labels = match &args.labels {
    Some(path) => Labels::from_file(path)?,
    None => Labels::default(),
  };
  let detector = Detector::new(model, labels)?;

  let annotated = detector.detect(&image);
  save_image(&args.output, &annotated.image)?;

  for detection in &annotated.detections {
    info!(
      "  - {} ({:.2}) at {:?}",
      detection.class_name, detection.confidence, detection.bbox
    );
  }
  info!("检测到的类别: {:?}", annotated.classes);
  info!("各类别最高置信度: {:?}", annotated.confidences);

  Ok(())
}
