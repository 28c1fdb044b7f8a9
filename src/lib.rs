//! # roi_pool
//!
//! 目标检测网络（如Fast/Faster R-CNN）中的ROI池化算子：
//! 把原图坐标系下的候选框映射到卷积特征图上，按固定网格做最大池化得到定长特征，
//! 并能依据前向记录的argmax掩码把梯度散射回特征图。
//!
//! 算子以节点的形式挂在一个最小计算图上，图负责执行顺序、多消费者的梯度累加与中间结果的内存释放。
//!
//! ```ignore
//! use roi_pool::nn::{Graph, ImageSize, PoolSize, RoiBox, RoiPool, Value};
//! use roi_pool::tensor::Tensor;
//!
//! let mut graph = Graph::new();
//! graph.add_layer(
//!     "roi",
//!     RoiPool::new(PoolSize::new(7, 7)?)?,
//!     &["features", "im_size", "rois"],
//!     &["pooled", "mask"],
//!     &[],
//! )?;
//! graph.eval(
//!     vec![
//!         ("features", Value::from(features)),
//!         ("im_size", Value::from(ImageSize::new(600., 800.))),
//!         ("rois", Value::from(boxes)),
//!     ],
//!     vec![("pooled", der_pooled)],
//! )?;
//! let der_features = graph.der("features")?;
//! ```

#[cfg(test)]
mod utils;

pub mod errors;
pub mod nn;
pub mod tensor;
