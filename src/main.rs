// 该文件是 Swachhta （清洁看板） 项目的一部分。
// src/main.rs - HTTP 服务主程序
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

use anyhow::Result;
use clap::Parser;
use tracing::info;

use swachhta::{FromUrl, api, args::Args, model::Yolo26Builder, upload::Swachhta};

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("Swachhta 垃圾检测看板后端");
  info!("模型地址: {}", args.model);
  info!("置信度阈值: {}", args.confidence);
  info!("NMS 阈值: {}", args.iou);

  info!("正在加载模型...");
  let model = Yolo26Builder::from_url(&args.model)?
    .config(args.model_config())
    .build()?;

  let service = Swachhta::from_args(model, &args)?;
  api::serve(args.address()?, service, args.max_body_bytes).await
}
