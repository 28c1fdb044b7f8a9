/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : ROI池化（Region of Interest Pooling）的纯算法部分，与计算图无关：
 *                 - geometry: 框坐标到特征图坐标的映射、自适应分箱（bin）
 *                 - kernel:   前向最大池化，同时记录argmax掩码
 *                 - scatter:  反向传播，依据argmax掩码把上游梯度散射累加回输入
 *
 * 张量布局约定：
 * - 特征图：[H, W, C] 或 [H, W, C, N]（N为批内图像数，3阶时视作N=1）
 * - 池化输出与掩码：[poolH, poolW, C, R]（R为框的个数）
 */

mod geometry;
mod kernel;
mod scatter;

pub use geometry::{BinWindow, CoordinateMapper, FeatureDims};
pub use kernel::roi_max_pool;
pub use scatter::roi_max_unpool;

use crate::nn::GraphError;
use ndarray::Array4;
use serde::{Deserialize, Serialize};

/// 原图像素坐标系下的候选框。图像覆盖的连续区域为`[0, width] × [0, height]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiBox {
    /// 框所属图像在批内的序号（从0开始）
    pub image: usize,
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl RoiBox {
    pub const fn new(image: usize, x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            image,
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// 宽或高不为正，或含非有限坐标
    pub fn is_degenerate(&self) -> bool {
        let coords = [self.x_min, self.y_min, self.x_max, self.y_max];
        coords.iter().any(|v| !v.is_finite()) || self.x_max <= self.x_min || self.y_max <= self.y_min
    }
}

/// 原图尺寸（像素）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageSize {
    pub height: f32,
    pub width: f32,
}

impl ImageSize {
    pub const fn new(height: f32, width: f32) -> Self {
        Self { height, width }
    }
}

/// 池化输出网格，构造后在层的整个生命周期内不变
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolSize {
    pub height: usize,
    pub width: usize,
}

impl PoolSize {
    pub fn new(height: usize, width: usize) -> Result<Self, GraphError> {
        let pool = Self { height, width };
        pool.validate()?;
        Ok(pool)
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        if self.height == 0 || self.width == 0 {
            return Err(GraphError::InvalidGeometry(format!(
                "池化网格的高和宽必须为正，得到{}x{}",
                self.height, self.width
            )));
        }
        Ok(())
    }

    /// 网格中的单元格个数
    pub const fn cells(&self) -> usize {
        self.height * self.width
    }
}

/// 掩码条目解码后的源位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaskIndex {
    pub image: usize,
    pub row: usize,
    pub col: usize,
}

/// 前向池化的argmax掩码，与池化输出同形状`[poolH, poolW, C, R]`。
///
/// 每个条目为产生最大值的源元素在特征图上的展平空间索引`(image * H + row) * W + col`，
/// `None`表示窗口为空、不产生任何梯度。
/// 掩码由前向返回、由反向显式接收，两次调用之间不经过任何隐藏状态。
#[derive(Debug, Clone, PartialEq)]
pub struct ArgmaxMask {
    entries: Array4<Option<usize>>,
    feature_dims: FeatureDims,
}

impl ArgmaxMask {
    pub(crate) fn new(entries: Array4<Option<usize>>, feature_dims: FeatureDims) -> Self {
        Self {
            entries,
            feature_dims,
        }
    }

    /// `[poolH, poolW, C, R]`
    pub fn shape(&self) -> [usize; 4] {
        let dim = self.entries.dim();
        [dim.0, dim.1, dim.2, dim.3]
    }

    /// 产生本掩码的特征图尺寸
    pub const fn feature_dims(&self) -> FeatureDims {
        self.feature_dims
    }

    pub fn box_count(&self) -> usize {
        self.shape()[3]
    }

    pub fn flat_entry(&self, index: [usize; 4]) -> Option<usize> {
        self.entries.get(index).copied().flatten()
    }

    pub fn entry(&self, index: [usize; 4]) -> Option<MaskIndex> {
        self.flat_entry(index)
            .map(|flat| self.feature_dims.decode(flat))
    }

    /// 按`[i, j, c, r]`逐一遍历所有条目
    pub fn indexed_iter(&self) -> impl Iterator<Item = ([usize; 4], Option<MaskIndex>)> + '_ {
        self.entries.indexed_iter().map(|((i, j, c, r), entry)| {
            (
                [i, j, c, r],
                entry.map(|flat| self.feature_dims.decode(flat)),
            )
        })
    }

    /// 空窗口（哨兵）条目的个数
    pub fn sentinel_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_none()).count()
    }

    pub(crate) const fn entries(&self) -> &Array4<Option<usize>> {
        &self.entries
    }
}
