// 该文件是 Swachhta （清洁看板） 项目的一部分。
// src/model.rs - 模型
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

/// 检测模型。对调用者而言是黑盒：图像进，检测结果出。
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // 归一化坐标 [x_min, y_min, x_max, y_max]
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    DetectResult {
      items: items.into_boxed_slice(),
    }
  }
}

/// 推理配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelConfig {
  /// 置信度阈值
  pub confidence: f32,
  /// NMS IOU 阈值
  pub iou: f32,
}

impl Default for ModelConfig {
  fn default() -> Self {
    ModelConfig {
      confidence: 0.25,
      iou: 0.45,
    }
  }
}

/// 置信度过滤后按类别做非极大值抑制，结果按置信度降序
pub fn non_max_suppression(items: Vec<DetectItem>, config: &ModelConfig) -> Vec<DetectItem> {
  let mut candidates: Vec<DetectItem> = items
    .into_iter()
    .filter(|item| item.score >= config.confidence)
    .collect();
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut kept: Vec<DetectItem> = Vec::with_capacity(candidates.len());
  for item in candidates {
    let suppressed = kept
      .iter()
      .any(|best| best.class_id == item.class_id && iou(&best.bbox, &item.bbox) >= config.iou);
    if !suppressed {
      kept.push(item);
    }
  }
  kept
}

/// 计算两个边界框的 IoU
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
  let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

mod labels;
pub use self::labels::{COCO_CLASSES, Labels, LabelsError};

#[cfg(feature = "model_yolo26")]
mod yolo26;
#[cfg(feature = "model_yolo26")]
pub use self::yolo26::{Yolo26, Yolo26Builder, Yolo26Error};

/// 测试用模型：返回固定结果，或在 `fail` 时返回错误
#[cfg(test)]
pub(crate) struct FixedModel {
  pub items: Vec<DetectItem>,
  pub fail: bool,
}

#[cfg(test)]
impl Model for FixedModel {
  type Input = image::RgbImage;
  type Output = DetectResult;
  type Error = std::io::Error;

  fn infer(&self, _input: &Self::Input) -> Result<Self::Output, Self::Error> {
    if self.fail {
      return Err(std::io::Error::other("模型运行失败"));
    }
    Ok(DetectResult::from(self.items.clone()))
  }
}
