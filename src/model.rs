// 该文件是 Huashan （华山花识） 项目的一部分。
// src/model.rs - 模型加载与前向推理
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};
use tract_onnx::prelude::*;

/// 默认模型输入宽度
pub const DEFAULT_INPUT_WIDTH: u32 = 416;
/// 默认模型输入高度
pub const DEFAULT_INPUT_HEIGHT: u32 = 416;

type RunnableOnnx = RunnableModel<TypedFact, Box<dyn TypedOp>, TypedModel>;

#[derive(Error, Debug)]
pub enum ModelLoadError {
  #[error("模型文件读取失败: {0}")]
  IoError(#[from] std::io::Error),
  #[error("模型解析或编译失败: {0}")]
  Graph(#[from] TractError),
  #[error("模型输入尺寸无效: {0}x{1}")]
  BadInputSize(u32, u32),
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("推理执行失败: {0}")]
  Execution(#[from] TractError),
  #[error("输入图像为空")]
  EmptyImage,
  #[error("推理超时: 超过 {0:?}")]
  Timeout(Duration),
}

/// 单个检测头的原始输出张量
///
/// data 为行优先排布的 f32 数据，dims 为推理引擎给出的张量维度。
/// 具体的 (格点 × 锚框 × (5 + 类别数)) 解释由解码器完成。
#[derive(Debug, Clone)]
pub struct RawHead {
  pub dims: Vec<usize>,
  pub data: Vec<f32>,
}

impl RawHead {
  pub fn new(dims: Vec<usize>, data: Vec<f32>) -> Self {
    RawHead { dims, data }
  }
}

/// 前向推理入口
///
/// 上下文通过该 trait 使用推理引擎，测试可以用合成输出的替身
/// 替换真实网络。
pub trait ForwardPass {
  /// 执行一次前向推理，返回每个检测头的原始输出
  fn forward(&self, image: &RgbImage) -> Result<Vec<RawHead>, InferenceError>;
}

/// 编译后的检测网络
///
/// 进程启动时加载一次，之后不可变。推理入口只借用 &self，
/// 可放入 Arc 在并发请求之间只读共享，无须重复加载模型。
pub struct NetworkGraph {
  plan: RunnableOnnx,
  input_width: u32,
  input_height: u32,
}

impl NetworkGraph {
  /// 从 ONNX 模型文件加载
  ///
  /// 拓扑与权重同在一个 ONNX blob 中，文件截断、损坏或与
  /// 声明的输入尺寸不兼容都会在此处报 ModelLoadError。
  pub fn load<P: AsRef<Path>>(
    path: P,
    input_width: u32,
    input_height: u32,
  ) -> Result<Self, ModelLoadError> {
    let path = path.as_ref();
    info!("加载模型文件: {}", path.display());
    let blob = std::fs::read(path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      blob.len() as f64 / (1024.0 * 1024.0)
    );
    Self::from_bytes(&blob, input_width, input_height)
  }

  /// 从内存中的模型数据构建推理图
  pub fn from_bytes(
    blob: &[u8],
    input_width: u32,
    input_height: u32,
  ) -> Result<Self, ModelLoadError> {
    if input_width == 0 || input_height == 0 {
      return Err(ModelLoadError::BadInputSize(input_width, input_height));
    }

    info!("编译推理图, 输入 {}x{}", input_width, input_height);
    let mut reader = std::io::Cursor::new(blob);
    let plan = tract_onnx::onnx()
      .model_for_read(&mut reader)?
      .with_input_fact(
        0,
        f32::fact([1, 3, input_height as usize, input_width as usize]).into(),
      )?
      .into_optimized()?
      .into_runnable()?;
    info!("模型加载完成");

    Ok(NetworkGraph {
      plan,
      input_width,
      input_height,
    })
  }

  pub fn input_width(&self) -> u32 {
    self.input_width
  }

  pub fn input_height(&self) -> u32 {
    self.input_height
  }

  /// 预处理图像: 缩放到模型输入尺寸, 归一化到 [0,1], NCHW 排布
  fn preprocess(&self, image: &RgbImage) -> Tensor {
    let resized = image::imageops::resize(
      image,
      self.input_width,
      self.input_height,
      image::imageops::FilterType::Triangle,
    );

    let (w, h) = (self.input_width as usize, self.input_height as usize);
    let plane = w * h;
    let mut data = vec![0f32; 3 * plane];
    for (x, y, pixel) in resized.enumerate_pixels() {
      let idx = y as usize * w + x as usize;
      data[idx] = pixel[0] as f32 / 255.0;
      data[plane + idx] = pixel[1] as f32 / 255.0;
      data[2 * plane + idx] = pixel[2] as f32 / 255.0;
    }

    // data 长度与形状一致，from_shape 不会失败
    Tensor::from_shape(&[1, 3, h, w], &data).expect("输入张量形状与数据长度不一致")
  }
}

impl ForwardPass for NetworkGraph {
  fn forward(&self, image: &RgbImage) -> Result<Vec<RawHead>, InferenceError> {
    if image.width() == 0 || image.height() == 0 {
      return Err(InferenceError::EmptyImage);
    }

    debug!("预处理输入图像 {}x{}", image.width(), image.height());
    let input = self.preprocess(image);

    debug!("执行模型推理");
    let outputs = self.plan.run(tvec!(input.into()))?;

    let mut heads = Vec::with_capacity(outputs.len());
    for (idx, output) in outputs.iter().enumerate() {
      let view = output.to_array_view::<f32>()?;
      let dims = view.shape().to_vec();
      let data: Vec<f32> = view.iter().copied().collect();
      debug!("检测头 {}: 维度 {:?}, 元素 {}", idx, dims, data.len());
      heads.push(RawHead::new(dims, data));
    }

    Ok(heads)
  }
}

/// 带时限的前向推理
///
/// 推理在单独的线程上执行，超过 timeout 时返回 Timeout 而不是无限阻塞。
/// 超时后的工作线程会在完成后自行结束，其结果被丢弃。
pub fn forward_with_timeout(
  graph: &Arc<dyn ForwardPass + Send + Sync>,
  image: &RgbImage,
  timeout: Option<Duration>,
) -> Result<Vec<RawHead>, InferenceError> {
  let Some(limit) = timeout else {
    return graph.forward(image);
  };

  let (tx, rx) = mpsc::channel();
  let graph = Arc::clone(graph);
  let image = image.clone();
  std::thread::spawn(move || {
    let _ = tx.send(graph.forward(&image));
  });

  match rx.recv_timeout(limit) {
    Ok(result) => result,
    Err(_) => Err(InferenceError::Timeout(limit)),
  }
}
