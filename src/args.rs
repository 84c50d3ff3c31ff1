// 该文件是 Swachhta （清洁看板） 项目的一部分。
// src/args.rs - 项目参数配置
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

use std::{net::SocketAddr, path::PathBuf};

use clap::Parser;
use url::Url;

use crate::model::ModelConfig;

/// 默认的垃圾类别
pub const DEFAULT_WATCH_LIST: [&str; 8] = [
  "plastic",
  "metal",
  "glass",
  "cardboard",
  "paper",
  "trash",
  "bottle",
  "cup",
];

/// 默认请求体上限 16 MiB
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

fn default_watch_list() -> Vec<String> {
  DEFAULT_WATCH_LIST.iter().map(|s| s.to_string()).collect()
}

/// Swachhta 服务参数配置
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监听地址
  #[arg(long, default_value = "0.0.0.0", value_name = "HOST")]
  pub host: String,

  /// 监听端口
  #[arg(long, default_value = "5000", value_name = "PORT")]
  pub port: u16,

  /// 上传图像保存目录
  #[arg(long, default_value = "uploads", value_name = "DIR")]
  pub upload_dir: PathBuf,

  /// 告警日志文件
  #[arg(long, default_value = "alerts.json", value_name = "FILE")]
  pub alert_log: PathBuf,

  /// 模型地址，例如 yolo26:///opt/models/yolo26n.rknn
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 类别名称文件（每行一个），缺省使用 COCO 类别
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 触发告警的类别，逗号分隔
  #[arg(long, value_delimiter = ',', default_values_t = default_watch_list(), value_name = "CLASSES")]
  pub watch_list: Vec<String>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.45", value_name = "THRESHOLD")]
  pub iou: f32,

  /// 请求体最大字节数
  #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES, value_name = "BYTES")]
  pub max_body_bytes: usize,
}

impl Args {
  pub fn model_config(&self) -> ModelConfig {
    ModelConfig {
      confidence: self.confidence,
      iou: self.iou,
    }
  }

  pub fn address(&self) -> Result<SocketAddr, std::net::AddrParseError> {
    format!("{}:{}", self.host, self.port).parse()
  }
}
