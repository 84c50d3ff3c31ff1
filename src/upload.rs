// 该文件是 Swachhta （清洁看板） 项目的一部分。
// src/upload.rs - 上传处理
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

use std::{
  collections::HashSet,
  fmt::Display,
  path::{Path, PathBuf},
};

use chrono::Local;
use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
  alert::{ALERT_TIMESTAMP_FORMAT, AlertRecord, AlertStore},
  args::Args,
  detector::{Confidences, Detector},
  input::{InputError, decode_image},
  model::{DetectResult, Labels, Model},
  output::{SaveImageFileError, save_image},
};

#[derive(Error, Debug)]
pub enum UploadError {
  #[error("图像解码失败: {0}")]
  DecodeError(#[from] InputError),
  #[error("图像保存失败: {0}")]
  PersistError(#[from] SaveImageFileError),
}

/// 触发告警的类别集合
#[derive(Debug, Clone, Default)]
pub struct WatchList {
  classes: HashSet<String>,
}

impl<S: Into<String>> FromIterator<S> for WatchList {
  fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
    WatchList {
      classes: iter.into_iter().map(Into::into).collect(),
    }
  }
}

impl WatchList {
  pub fn contains(&self, class: &str) -> bool {
    self.classes.contains(class)
  }

  /// 保持检测顺序，筛出需要告警的类别
  pub fn relevant(&self, detected: &[String]) -> Vec<String> {
    detected
      .iter()
      .filter(|class| self.contains(class))
      .cloned()
      .collect()
  }
}

/// 上传结果
#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
  pub processed_image: String,
  pub detected_classes: Vec<String>,
  pub confidences: Confidences,
  pub timestamp: String,
}

/// 服务对象：检测器、告警日志和目录配置都从这里注入
pub struct Swachhta<M> {
  detector: Detector<M>,
  alerts: AlertStore,
  upload_dir: PathBuf,
  watch_list: WatchList,
}

impl<M> Swachhta<M> {
  pub fn new<P: Into<PathBuf>>(
    detector: Detector<M>,
    alerts: AlertStore,
    upload_dir: P,
    watch_list: WatchList,
  ) -> Self {
    Swachhta {
      detector,
      alerts,
      upload_dir: upload_dir.into(),
      watch_list,
    }
  }

  pub fn alerts(&self) -> &AlertStore {
    &self.alerts
  }

  pub fn upload_dir(&self) -> &Path {
    &self.upload_dir
  }
}

impl<M> Swachhta<M>
where
  M: Model<Input = RgbImage, Output = DetectResult>,
  M::Error: Display,
{
  /// 按命令行参数装配服务：类别表、检测器、上传目录、告警日志
  pub fn from_args(model: M, args: &Args) -> anyhow::Result<Self> {
    let labels = match &args.labels {
      Some(path) => Labels::from_file(path)?,
      None => Labels::default(),
    };
    let detector = Detector::new(model, labels)?;

    std::fs::create_dir_all(&args.upload_dir)?;
    let alerts = AlertStore::open(&args.alert_log, &args.upload_dir)?;
    info!(
      "告警日志: {}，上传目录: {}，监控类别: {:?}",
      alerts.path().display(),
      args.upload_dir.display(),
      args.watch_list
    );

    Ok(Swachhta::new(
      detector,
      alerts,
      &args.upload_dir,
      args.watch_list.iter().cloned().collect(),
    ))
  }

  /// 解码、保存原图、检测、保存结果图，命中垃圾类别时记录告警
  pub fn handle_upload(&self, image_bytes: &[u8]) -> Result<UploadSummary, UploadError> {
    let image = decode_image(image_bytes).inspect_err(|e| warn!("无效的图像数据: {}", e))?;

    let original_filename = format!("original_{}.jpg", Local::now().format("%Y%m%d%H%M%S"));
    save_image(self.upload_dir.join(&original_filename), &image)
      .inspect_err(|e| error!("保存原图 {} 失败: {}", original_filename, e))?;
    info!(
      "收到图像 {}x{}，保存为 {}",
      image.width(),
      image.height(),
      original_filename
    );

    let annotated = self.detector.detect(&image);

    let processed_filename = format!("processed_{}", original_filename);
    save_image(self.upload_dir.join(&processed_filename), &annotated.image)
      .inspect_err(|e| error!("保存结果图 {} 失败: {}", processed_filename, e))?;

    let relevant = self.watch_list.relevant(&annotated.classes);
    if !relevant.is_empty() {
      let record = AlertRecord::new(
        Local::now().format(ALERT_TIMESTAMP_FORMAT).to_string(),
        &relevant,
        processed_filename.clone(),
        &annotated.confidences,
      );
      // 告警写入失败不影响本次上传
      if let Err(e) = self.alerts.append(record) {
        error!("记录告警失败: {}", e);
      }
    }

    Ok(UploadSummary {
      processed_image: processed_filename,
      detected_classes: annotated.classes,
      confidences: annotated.confidences,
      timestamp: Local::now().format(ALERT_TIMESTAMP_FORMAT).to_string(),
    })
  }
}
