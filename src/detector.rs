// 该文件是 Swachhta （清洁看板） 项目的一部分。
// src/detector.rs - 检测适配层
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

use std::{collections::BTreeMap, fmt::Display};

use image::RgbImage;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
  model::{DetectResult, Labels, Model},
  output::draw::Draw,
};

/// 类别名称到该类别最高置信度。按 f64 保存，告警日志里的数值不会被截断。
pub type Confidences = BTreeMap<String, f64>;

/// 单个检测目标，bbox 为像素坐标 [x1, y1, x2, y2]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub class_name: String,
  pub confidence: f32,
  pub bbox: [i32; 4],
}

/// 一次检测的完整结果
#[derive(Debug, Clone)]
pub struct Annotated {
  /// 绘制了检测框的图像
  pub image: RgbImage,
  pub detections: Vec<Detection>,
  /// 去重后的类别，按首次出现顺序
  pub classes: Vec<String>,
  pub confidences: Confidences,
}

impl Annotated {
  /// 模型失败时的结果：原图，无类别
  fn fallback(image: &RgbImage) -> Self {
    Annotated {
      image: image.clone(),
      detections: Vec::new(),
      classes: Vec::new(),
      confidences: Confidences::new(),
    }
  }
}

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("字体加载错误: {0}")]
  FontError(#[from] ab_glyph::InvalidFont),
}

pub struct Detector<M> {
  model: M,
  labels: Labels,
  draw: Draw,
}

impl<M> Detector<M>
where
  M: Model<Input = RgbImage, Output = DetectResult>,
  M::Error: Display,
{
  pub fn new(model: M, labels: Labels) -> Result<Self, DetectorError> {
    Ok(Detector {
      model,
      labels,
      draw: Draw::new()?,
    })
  }

  /// 运行检测并绘制结果。模型出错时不向上传播，退化为原图和空结果。
  pub fn detect(&self, image: &RgbImage) -> Annotated {
    let now = std::time::Instant::now();
    match self.model.infer(image) {
      Ok(result) => {
        info!(
          "推理完成，耗时: {:.2?}，检测到 {} 个对象",
          now.elapsed(),
          result.len()
        );
        self.annotate(image, &result)
      }
      Err(e) => {
        error!("模型推理失败，返回空结果: {}", e);
        Annotated::fallback(image)
      }
    }
  }

  fn annotate(&self, image: &RgbImage, result: &DetectResult) -> Annotated {
    let (w, h) = (image.width() as f32, image.height() as f32);
    let mut canvas = image.clone();
    let mut detections = Vec::with_capacity(result.len());
    let mut classes: Vec<String> = Vec::new();
    let mut confidences = Confidences::new();

    for item in result.items.iter() {
      let class_name = self.labels.name(item.class_id).to_string();
      let confidence = item.score;
      debug!("发现: {} ({:.2})", class_name, confidence);

      let widened = f64::from(confidence);
      confidences
        .entry(class_name.clone())
        .and_modify(|best| *best = best.max(widened))
        .or_insert(widened);

      let bbox = [
        (item.bbox[0] * w) as i32,
        (item.bbox[1] * h) as i32,
        (item.bbox[2] * w) as i32,
        (item.bbox[3] * h) as i32,
      ];
      let label = format!("{} ({:.2})", class_name, confidence);
      self.draw.draw_bbox_with_label(&mut canvas, bbox, &label);

      if !classes.contains(&class_name) {
        classes.push(class_name.clone());
      }
      detections.push(Detection {
        class_name,
        confidence,
        bbox,
      });
    }

    Annotated {
      image: canvas,
      detections,
      classes,
      confidences,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{DetectItem, FixedModel};

  fn detector(items: Vec<DetectItem>, fail: bool) -> Detector<FixedModel> {
    let labels = Labels::new(["bottle", "tree"]);
    Detector::new(FixedModel { items, fail }, labels).unwrap()
  }

  fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
    DetectItem {
      class_id,
      score,
      bbox,
    }
  }

  #[test]
  fn keeps_max_confidence_per_class_in_first_seen_order() {
    let detector = detector(
      vec![
        item(0, 0.81, [0.1, 0.5, 0.3, 0.9]),
        item(0, 0.40, [0.6, 0.5, 0.8, 0.9]),
        item(1, 0.90, [0.4, 0.1, 0.6, 0.4]),
      ],
      false,
    );
    let image = RgbImage::new(100, 100);

    let annotated = detector.detect(&image);

    assert_eq!(annotated.classes, vec!["bottle", "tree"]);
    assert_eq!(annotated.confidences.len(), 2);
    assert_eq!(annotated.confidences["bottle"], f64::from(0.81f32));
    assert_eq!(annotated.confidences["tree"], f64::from(0.90f32));
    assert_eq!(annotated.detections.len(), 3);
    assert_eq!(annotated.detections[0].bbox, [10, 50, 30, 90]);
    assert_ne!(annotated.image, image);
  }

  #[test]
  fn lower_confidence_first_is_raised_by_later_detection() {
    let detector = detector(
      vec![
        item(0, 0.40, [0.1, 0.1, 0.2, 0.2]),
        item(0, 0.81, [0.5, 0.5, 0.7, 0.7]),
      ],
      false,
    );

    let annotated = detector.detect(&RgbImage::new(64, 64));

    assert_eq!(annotated.classes, vec!["bottle"]);
    assert_eq!(annotated.confidences["bottle"], f64::from(0.81f32));
  }

  #[test]
  fn model_failure_degrades_to_original_image() {
    let detector = detector(vec![item(0, 0.9, [0.1, 0.1, 0.9, 0.9])], true);
    let image = RgbImage::from_pixel(40, 30, image::Rgb([7, 7, 7]));

    let annotated = detector.detect(&image);

    assert_eq!(annotated.image, image);
    assert!(annotated.classes.is_empty());
    assert!(annotated.confidences.is_empty());
    assert!(annotated.detections.is_empty());
  }

  #[test]
  fn no_detections_leaves_image_untouched() {
    let detector = detector(Vec::new(), false);
    let image = RgbImage::from_pixel(40, 30, image::Rgb([7, 7, 7]));

    let annotated = detector.detect(&image);

    assert_eq!(annotated.image, image);
    assert!(annotated.classes.is_empty());
  }

  #[test]
  fn unknown_class_id_resolves_to_unknown() {
    let detector = detector(vec![item(42, 0.5, [0.1, 0.1, 0.5, 0.5])], false);

    let annotated = detector.detect(&RgbImage::new(32, 32));

    assert_eq!(annotated.classes, vec!["unknown"]);
  }
}
