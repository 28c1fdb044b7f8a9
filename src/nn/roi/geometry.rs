/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 坐标映射：把原图坐标系下的框映射到特征图单元格，并划分为固定网格的池化窗口
 *
 * 映射规则：
 * - 各轴独立计算缩放比：scale_y = H_fm / 图像高，scale_x = W_fm / 图像宽
 * - 框的起点向下取整、终点向上取整，再截断到特征图范围内
 * - 长度为L的区域分为P份，边界为 start + round(k·L / P)（k = 0..=P），
 *   第k个窗口为[e_k, e_{k+1})：相邻窗口首尾相接，既不遗漏也不重叠
 * - 退化框（宽/高不为正、坐标非有限、完全落在特征图外、图像序号越界）的所有窗口均为空
 */

use super::{ImageSize, MaskIndex, PoolSize, RoiBox};
use crate::nn::GraphError;
use crate::tensor::Tensor;
use ndarray::{ArrayView4, Axis, Ix4};
use std::ops::Range;

/// 特征图的尺寸，由`[H, W, C]`或`[H, W, C, N]`解析而来
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FeatureDims {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
    pub images: usize,
}

impl FeatureDims {
    pub fn from_shape(shape: &[usize]) -> Result<Self, GraphError> {
        let dims = match *shape {
            [height, width, channels] => Self {
                height,
                width,
                channels,
                images: 1,
            },
            [height, width, channels, images] => Self {
                height,
                width,
                channels,
                images,
            },
            _ => {
                return Err(GraphError::InvalidGeometry(format!(
                    "特征图必须是3阶[H, W, C]或4阶[H, W, C, N]，得到{shape:?}"
                )));
            }
        };
        if dims.height == 0 || dims.width == 0 || dims.channels == 0 || dims.images == 0 {
            return Err(GraphError::InvalidGeometry(format!(
                "特征图各维度必须为正，得到{shape:?}"
            )));
        }
        Ok(dims)
    }

    /// 所有图像的空间位置总数（不含通道）
    pub const fn spatial_len(&self) -> usize {
        self.images * self.height * self.width
    }

    pub const fn flat_index(&self, image: usize, row: usize, col: usize) -> usize {
        (image * self.height + row) * self.width + col
    }

    pub const fn decode(&self, flat: usize) -> MaskIndex {
        let plane = self.height * self.width;
        let rest = flat % plane;
        MaskIndex {
            image: flat / plane,
            row: rest / self.width,
            col: rest % self.width,
        }
    }

    /// 以`[H, W, C, N]`的4阶视图读取特征图
    pub fn view4<'a>(&self, feature_map: &'a Tensor) -> Result<ArrayView4<'a, f32>, GraphError> {
        let view = feature_map.view();
        let view = if view.ndim() == 3 {
            view.insert_axis(Axis(3))
        } else {
            view
        };
        view.into_dimensionality::<Ix4>().map_err(|e| {
            GraphError::InvalidGeometry(format!(
                "无法把形状为{:?}的特征图视作4阶张量：{e}",
                feature_map.shape()
            ))
        })
    }
}

/// 单个输出单元格在特征图上的池化窗口（左闭右开）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinWindow {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

impl BinWindow {
    pub const fn empty() -> Self {
        Self {
            rows: 0..0,
            cols: 0..0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() || self.cols.is_empty()
    }

    pub fn area(&self) -> usize {
        self.rows.len() * self.cols.len()
    }
}

#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    dims: FeatureDims,
    scale_y: f32,
    scale_x: f32,
    pool: PoolSize,
}

impl CoordinateMapper {
    pub fn new(
        image_size: ImageSize,
        feature_shape: &[usize],
        pool: PoolSize,
    ) -> Result<Self, GraphError> {
        let dims = FeatureDims::from_shape(feature_shape)?;
        pool.validate()?;
        let ImageSize { height, width } = image_size;
        if !(height.is_finite() && width.is_finite() && height > 0. && width > 0.) {
            return Err(GraphError::InvalidGeometry(format!(
                "原图尺寸必须为正的有限值，得到{height}x{width}"
            )));
        }
        Ok(Self {
            dims,
            scale_y: dims.height as f32 / height,
            scale_x: dims.width as f32 / width,
            pool,
        })
    }

    pub const fn dims(&self) -> FeatureDims {
        self.dims
    }

    pub const fn pool(&self) -> PoolSize {
        self.pool
    }

    /// (scale_y, scale_x)
    pub const fn scale(&self) -> (f32, f32) {
        (self.scale_y, self.scale_x)
    }

    /// 框在特征图上覆盖的(行, 列)区域；退化框返回None
    pub fn map_box(&self, roi: &RoiBox) -> Option<(Range<usize>, Range<usize>)> {
        if roi.is_degenerate() || roi.image >= self.dims.images {
            return None;
        }
        let rows = project(roi.y_min, roi.y_max, self.scale_y, self.dims.height);
        let cols = project(roi.x_min, roi.x_max, self.scale_x, self.dims.width);
        if rows.is_empty() || cols.is_empty() {
            return None;
        }
        Some((rows, cols))
    }

    /// 按行优先顺序返回`poolH * poolW`个池化窗口（可能为空）
    pub fn bins(&self, roi: &RoiBox) -> Vec<BinWindow> {
        let Some((rows, cols)) = self.map_box(roi) else {
            return vec![BinWindow::empty(); self.pool.cells()];
        };
        let row_edges = split_edges(&rows, self.pool.height);
        let col_edges = split_edges(&cols, self.pool.width);

        let mut bins = Vec::with_capacity(self.pool.cells());
        for i in 0..self.pool.height {
            for j in 0..self.pool.width {
                bins.push(BinWindow {
                    rows: row_edges[i]..row_edges[i + 1],
                    cols: col_edges[j]..col_edges[j + 1],
                });
            }
        }
        bins
    }
}

/// 把原图坐标区间[lo, hi]投影到长度为`limit`的特征图轴上
fn project(lo: f32, hi: f32, scale: f32, limit: usize) -> Range<usize> {
    let clamp = |v: f32| v.clamp(0., limit as f32) as usize;
    let start = clamp((lo * scale).floor());
    let end = clamp((hi * scale).ceil());
    start..end.max(start)
}

/// 把区域等分为`parts`份，返回`parts + 1`个单调不减的边界
fn split_edges(range: &Range<usize>, parts: usize) -> Vec<usize> {
    let len = range.len() as f64;
    (0..=parts)
        .map(|k| range.start + (k as f64 * len / parts as f64).round() as usize)
        .collect()
}
