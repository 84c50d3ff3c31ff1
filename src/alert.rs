// 该文件是 Swachhta （清洁看板） 项目的一部分。
// src/alert.rs - 告警日志存储
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

//! 告警日志：单个 JSON 数组文件，按时间戳追加、列出、删除。
//!
//! 所有读写都经过同一把进程内互斥锁，写入先落到临时文件再重命名，
//! 读者不会看到写了一半的文件。
//!
//! 修改时按原始 JSON 值读写，字段不全或带额外字段的记录原样保留。

use std::{
  fs,
  io::{self, Write},
  path::{Path, PathBuf},
  sync::{Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};
use serde_json::{Value, ser::PrettyFormatter};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::detector::Confidences;

/// 告警时间戳格式，精确到秒
pub const ALERT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Error, Debug)]
pub enum AlertStoreError {
  #[error("告警日志 I/O 错误: {0}")]
  IoError(#[from] io::Error),
  #[error("告警日志序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
}

/// 一条告警。缺少的字段按默认值读取。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertRecord {
  pub timestamp: String,
  pub classes: Vec<String>,
  /// 处理后图像的文件名，相对上传目录
  pub image_path: Option<String>,
  pub confidences: Confidences,
}

impl AlertRecord {
  /// `classes` 去重并保持顺序，置信度只保留这些类别；
  /// 缺少置信度的类别被丢弃，保证两者一一对应
  pub fn new<S: Into<String>>(
    timestamp: S,
    classes: &[String],
    image_path: S,
    confidences: &Confidences,
  ) -> Self {
    let mut kept: Vec<String> = Vec::with_capacity(classes.len());
    let mut sub = Confidences::new();
    for class in classes {
      if kept.contains(class) {
        continue;
      }
      if let Some(confidence) = confidences.get(class) {
        kept.push(class.clone());
        sub.insert(class.clone(), *confidence);
      }
    }

    AlertRecord {
      timestamp: timestamp.into(),
      classes: kept,
      image_path: Some(image_path.into()),
      confidences: sub,
    }
  }
}

pub struct AlertStore {
  path: PathBuf,
  image_dir: PathBuf,
  lock: Mutex<()>,
}

impl AlertStore {
  /// 打开告警日志，文件不存在时写入空数组
  pub fn open<P: Into<PathBuf>, Q: Into<PathBuf>>(
    path: P,
    image_dir: Q,
  ) -> Result<Self, AlertStoreError> {
    let store = AlertStore {
      path: path.into(),
      image_dir: image_dir.into(),
      lock: Mutex::new(()),
    };

    {
      let _guard = store.guard();
      if !store.path.exists() {
        info!("初始化告警日志: {}", store.path.display());
        store.write_all(&[])?;
      }
    }

    Ok(store)
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// 追加一条告警，整个文件重写
  pub fn append(&self, record: AlertRecord) -> Result<(), AlertStoreError> {
    let _guard = self.guard();
    let mut records = self.read_all()?;
    info!("记录告警: {} {:?}", record.timestamp, record.classes);
    records.push(serde_json::to_value(&record)?);
    self.write_all(&records)
  }

  /// 按追加顺序返回全部告警；文件不存在视为空，不是对象的条目跳过
  pub fn list_all(&self) -> Result<Vec<AlertRecord>, AlertStoreError> {
    let _guard = self.guard();
    let records = self
      .read_all()?
      .into_iter()
      .filter_map(|value| match serde_json::from_value(value) {
        Ok(record) => Some(record),
        Err(e) => {
          warn!("跳过无法识别的告警记录: {}", e);
          None
        }
      })
      .collect();
    Ok(records)
  }

  /// 删除所有时间戳完全相同的告警及其图像，返回是否删除了记录。
  /// 时间戳不存在不是错误。
  pub fn delete_by_timestamp(&self, timestamp: &str) -> Result<bool, AlertStoreError> {
    let _guard = self.guard();
    let (removed, kept): (Vec<Value>, Vec<Value>) = self
      .read_all()?
      .into_iter()
      .partition(|record| {
        record.get("timestamp").and_then(Value::as_str) == Some(timestamp)
      });

    self.write_all(&kept)?;

    for image_path in removed
      .iter()
      .filter_map(|record| record.get("image_path").and_then(Value::as_str))
    {
      self.remove_image(image_path);
    }

    if removed.is_empty() {
      debug!("没有时间戳为 {} 的告警", timestamp);
    } else {
      info!("删除 {} 条时间戳为 {} 的告警", removed.len(), timestamp);
    }
    Ok(!removed.is_empty())
  }

  fn guard(&self) -> MutexGuard<'_, ()> {
    // 锁只保护文件，不保护内存数据，中毒后仍可继续使用
    self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  /// 只有文件不是 JSON 数组时才按空日志处理
  fn read_all(&self) -> Result<Vec<Value>, AlertStoreError> {
    let content = match fs::read(&self.path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(e.into()),
    };

    match serde_json::from_slice(&content) {
      Ok(records) => Ok(records),
      Err(e) => {
        warn!(
          "告警日志 {} 已损坏，按空日志处理: {}",
          self.path.display(),
          e
        );
        Ok(Vec::new())
      }
    }
  }

  fn write_all(&self, records: &[Value]) -> Result<(), AlertStoreError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      fs::create_dir_all(parent)?;
    }

    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    records.serialize(&mut ser)?;

    let tmp = self.tmp_path();
    let written = fs::File::create(&tmp).and_then(|mut file| {
      file.write_all(&buf)?;
      file.sync_all()?;
      fs::rename(&tmp, &self.path)
    });
    if let Err(e) = written {
      let _ = fs::remove_file(&tmp);
      return Err(e.into());
    }
    Ok(())
  }

  fn tmp_path(&self) -> PathBuf {
    let mut name = self.path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
  }

  fn remove_image(&self, image_path: &str) {
    // 只取文件名，避免日志内容指向上传目录之外
    let Some(name) = Path::new(image_path).file_name() else {
      return;
    };
    let path = self.image_dir.join(name);
    match fs::remove_file(&path) {
      Ok(()) => info!("删除告警图像: {}", path.display()),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        debug!("告警图像已不存在: {}", path.display())
      }
      Err(e) => warn!("删除告警图像 {} 失败: {}", path.display(), e),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};

  static COUNTER: AtomicUsize = AtomicUsize::new(0);

  struct Scratch {
    dir: PathBuf,
  }

  impl Scratch {
    fn new() -> Self {
      let dir = std::env::temp_dir().join(format!(
        "swachhta-alert-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
      ));
      fs::create_dir_all(dir.join("uploads")).unwrap();
      Scratch { dir }
    }

    fn log(&self) -> PathBuf {
      self.dir.join("alerts.json")
    }

    fn uploads(&self) -> PathBuf {
      self.dir.join("uploads")
    }

    fn store(&self) -> AlertStore {
      AlertStore::open(self.log(), self.uploads()).unwrap()
    }
  }

  impl Drop for Scratch {
    fn drop(&mut self) {
      let _ = fs::remove_dir_all(&self.dir);
    }
  }

  fn record(timestamp: &str, image: &str) -> AlertRecord {
    let confidences = Confidences::from([("bottle".to_string(), 0.81)]);
    AlertRecord::new(timestamp, &["bottle".to_string()], image, &confidences)
  }

  #[test]
  fn open_creates_empty_log() {
    let scratch = Scratch::new();
    let store = scratch.store();

    assert_eq!(fs::read_to_string(scratch.log()).unwrap().trim(), "[]");
    assert!(store.list_all().unwrap().is_empty());
  }

  #[test]
  fn append_then_list_preserves_order() {
    let scratch = Scratch::new();
    let store = scratch.store();

    for i in 0..5 {
      store
        .append(record(&format!("2026-01-01 00:00:0{}", i), "a.jpg"))
        .unwrap();
    }

    let timestamps: Vec<String> = store
      .list_all()
      .unwrap()
      .into_iter()
      .map(|r| r.timestamp)
      .collect();
    assert_eq!(
      timestamps,
      (0..5)
        .map(|i| format!("2026-01-01 00:00:0{}", i))
        .collect::<Vec<_>>()
    );
  }

  #[test]
  fn log_file_is_indented_json_array() {
    let scratch = Scratch::new();
    let store = scratch.store();
    store.append(record("2026-01-01 10:00:00", "p.jpg")).unwrap();

    let content = fs::read_to_string(scratch.log()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&content).unwrap();

    assert!(content.contains("\n    {"));
    assert_eq!(value[0]["classes"][0], "bottle");
    assert_eq!(value[0]["image_path"], "p.jpg");
  }

  #[test]
  fn delete_removes_only_matching_record() {
    let scratch = Scratch::new();
    let store = scratch.store();
    store.append(record("2026-01-01 00:00:01", "one.jpg")).unwrap();
    store.append(record("2026-01-01 00:00:02", "two.jpg")).unwrap();
    store.append(record("2026-01-01 00:00:03", "three.jpg")).unwrap();

    assert!(store.delete_by_timestamp("2026-01-01 00:00:02").unwrap());

    let images: Vec<String> = store
      .list_all()
      .unwrap()
      .into_iter()
      .filter_map(|r| r.image_path)
      .collect();
    assert_eq!(images, vec!["one.jpg", "three.jpg"]);
  }

  #[test]
  fn delete_of_absent_timestamp_is_a_no_op() {
    let scratch = Scratch::new();
    let store = scratch.store();
    store.append(record("2026-01-01 00:00:01", "one.jpg")).unwrap();

    assert!(!store.delete_by_timestamp("1999-12-31 23:59:59").unwrap());
    assert_eq!(store.list_all().unwrap().len(), 1);
  }

  #[test]
  fn delete_removes_every_record_sharing_a_timestamp() {
    let scratch = Scratch::new();
    let store = scratch.store();
    store.append(record("2026-01-01 00:00:01", "a.jpg")).unwrap();
    store.append(record("2026-01-01 00:00:01", "b.jpg")).unwrap();
    store.append(record("2026-01-01 00:00:02", "c.jpg")).unwrap();

    assert!(store.delete_by_timestamp("2026-01-01 00:00:01").unwrap());
    assert_eq!(store.list_all().unwrap().len(), 1);
  }

  #[test]
  fn delete_removes_image_and_tolerates_missing_one() {
    let scratch = Scratch::new();
    let store = scratch.store();
    let image = scratch.uploads().join("processed_x.jpg");
    fs::write(&image, b"jpeg").unwrap();
    store.append(record("2026-01-01 00:00:01", "processed_x.jpg")).unwrap();
    store.append(record("2026-01-01 00:00:02", "processed_gone.jpg")).unwrap();

    assert!(store.delete_by_timestamp("2026-01-01 00:00:01").unwrap());
    assert!(!image.exists());

    assert!(store.delete_by_timestamp("2026-01-01 00:00:02").unwrap());
    assert!(store.list_all().unwrap().is_empty());
  }

  #[test]
  fn corrupt_log_reads_as_empty_and_heals_on_append() {
    let scratch = Scratch::new();
    let store = scratch.store();
    fs::write(scratch.log(), b"{ not json").unwrap();

    assert!(store.list_all().unwrap().is_empty());

    store.append(record("2026-01-01 00:00:01", "a.jpg")).unwrap();
    assert_eq!(store.list_all().unwrap().len(), 1);
  }

  #[test]
  fn partial_records_survive_append_and_delete() {
    let scratch = Scratch::new();
    let image = scratch.uploads().join("processed_old.jpg");
    fs::write(&image, b"jpeg").unwrap();
    fs::write(
      scratch.log(),
      r#"[
        {"timestamp": "2025-12-31 08:00:00", "classes": ["cup"], "image_path": "processed_old.jpg",
         "confidences": {"cup": 0.5}, "camera": "gate"},
        {"timestamp": "2025-12-31 09:00:00", "classes": ["bottle"], "confidences": {"bottle": 0.7}},
        {"timestamp": "2025-12-31 10:00:00", "classes": [], "image_path": null, "confidences": {}}
      ]"#,
    )
    .unwrap();
    let store = scratch.store();

    let listed = store.list_all().unwrap();
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[1].image_path, None);
    assert_eq!(listed[2].image_path, None);

    store.append(record("2026-01-01 00:00:01", "a.jpg")).unwrap();
    assert_eq!(store.list_all().unwrap().len(), 4);

    assert!(store.delete_by_timestamp("2025-12-31 09:00:00").unwrap());
    assert!(store.delete_by_timestamp("2025-12-31 08:00:00").unwrap());
    assert!(!image.exists());

    let value: Value = serde_json::from_str(&fs::read_to_string(scratch.log()).unwrap()).unwrap();
    let timestamps: Vec<&str> = value
      .as_array()
      .unwrap()
      .iter()
      .map(|r| r["timestamp"].as_str().unwrap())
      .collect();
    assert_eq!(timestamps, vec!["2025-12-31 10:00:00", "2026-01-01 00:00:01"]);
    assert!(value[0]["image_path"].is_null());
  }

  #[test]
  fn unknown_fields_are_kept_on_rewrite() {
    let scratch = Scratch::new();
    fs::write(
      scratch.log(),
      r#"[{"timestamp": "t", "classes": [], "image_path": "x.jpg", "confidences": {}, "camera": "gate"}]"#,
    )
    .unwrap();
    let store = scratch.store();

    store.append(record("2026-01-01 00:00:01", "a.jpg")).unwrap();

    let value: Value = serde_json::from_str(&fs::read_to_string(scratch.log()).unwrap()).unwrap();
    assert_eq!(value[0]["camera"], "gate");
  }

  #[test]
  fn stored_confidences_keep_full_precision() {
    let scratch = Scratch::new();
    fs::write(
      scratch.log(),
      r#"[{"timestamp": "t", "classes": ["bottle"], "image_path": "x.jpg", "confidences": {"bottle": 0.8123456789012345}}]"#,
    )
    .unwrap();
    let store = scratch.store();

    assert!(!store.delete_by_timestamp("nope").unwrap());

    let value: Value = serde_json::from_str(&fs::read_to_string(scratch.log()).unwrap()).unwrap();
    assert_eq!(value[0]["confidences"]["bottle"].as_f64(), Some(0.8123456789012345));
    assert_eq!(store.list_all().unwrap()[0].confidences["bottle"], 0.8123456789012345);
  }

  #[test]
  fn non_array_log_reads_as_empty() {
    let scratch = Scratch::new();
    let store = scratch.store();
    fs::write(scratch.log(), br#"{"timestamp": "t"}"#).unwrap();

    assert!(store.list_all().unwrap().is_empty());
  }

  #[test]
  fn failed_write_leaves_no_temp_file() {
    let scratch = Scratch::new();
    let store = scratch.store();
    fs::remove_file(scratch.log()).unwrap();
    fs::create_dir_all(scratch.log().join("blocker")).unwrap();

    assert!(store.write_all(&[]).is_err());
    assert!(!store.tmp_path().exists());
  }

  #[test]
  fn missing_log_after_open_reads_as_empty() {
    let scratch = Scratch::new();
    let store = scratch.store();
    fs::remove_file(scratch.log()).unwrap();

    assert!(store.list_all().unwrap().is_empty());
    store.append(record("2026-01-01 00:00:01", "a.jpg")).unwrap();
    assert_eq!(store.list_all().unwrap().len(), 1);
  }

  #[test]
  fn record_keeps_classes_and_confidences_in_step() {
    let confidences = Confidences::from([
      ("bottle".to_string(), 0.81),
      ("tree".to_string(), 0.9),
    ]);
    let classes = vec![
      "bottle".to_string(),
      "bottle".to_string(),
      "cup".to_string(),
    ];

    let record = AlertRecord::new("t", &classes, "p.jpg", &confidences);

    assert_eq!(record.classes, vec!["bottle"]);
    assert_eq!(record.confidences.len(), 1);
    assert_eq!(record.confidences["bottle"], 0.81);
  }

  #[test]
  fn concurrent_appends_are_not_lost() {
    let scratch = Scratch::new();
    let store = std::sync::Arc::new(scratch.store());

    let handles: Vec<_> = (0..8)
      .map(|i| {
        let store = store.clone();
        std::thread::spawn(move || {
          store
            .append(record(&format!("2026-01-01 00:00:{:02}", i), "a.jpg"))
            .unwrap();
        })
      })
      .collect();
    for handle in handles {
      handle.join().unwrap();
    }

    assert_eq!(store.list_all().unwrap().len(), 8);
  }
}
