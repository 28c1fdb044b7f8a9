/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : ROI最大池化前向：对每个框、每个输出单元格、每个通道取窗口内最大值，
 *                 并记录最大值所在的源位置（argmax掩码）
 *
 * 设计决策：
 * - 窗口内按行优先扫描，只有严格大于当前最大值时才更新，故并列最大值取首个出现者
 * - 空窗口输出0，掩码记为None
 * - 使用 Rayon 在框的维度并行（各框独占自己的输出切片，无共享可变状态）
 */

use super::{ArgmaxMask, BinWindow, CoordinateMapper, FeatureDims, ImageSize, PoolSize, RoiBox};
use crate::nn::GraphError;
use crate::tensor::Tensor;
use ndarray::{Array4, ArrayView4};
use rayon::prelude::*;

/// 前向ROI最大池化
///
/// # 参数
/// - `feature_map`: `[H, W, C]`或`[H, W, C, N]`，须位于主机内存
/// - `image_size`: 原图尺寸，用于推算特征图与原图的缩放比
/// - `boxes`: 原图坐标系下的候选框，个数不限（可为0）
/// - `pool`: 输出网格
///
/// # 返回
/// `(pooled, mask)`，形状均为`[poolH, poolW, C, R]`
pub fn roi_max_pool(
    feature_map: &Tensor,
    image_size: ImageSize,
    boxes: &[RoiBox],
    pool: PoolSize,
) -> Result<(Tensor, ArgmaxMask), GraphError> {
    feature_map.ensure_on_host()?;
    let mapper = CoordinateMapper::new(image_size, feature_map.shape(), pool)?;
    let dims = mapper.dims();
    let features = dims.view4(feature_map)?;

    // 每个框的结果按[单元格][通道]排布
    let per_box: Vec<(Vec<f32>, Vec<Option<usize>>)> = boxes
        .par_iter()
        .map(|roi| pool_single_box(&features, &dims, roi.image, &mapper.bins(roi)))
        .collect();

    let shape = (pool.height, pool.width, dims.channels, boxes.len());
    let mut pooled = Array4::<f32>::zeros(shape);
    let mut entries = Array4::<Option<usize>>::from_elem(shape, None);
    for (r, (values, indices)) in per_box.into_iter().enumerate() {
        for cell in 0..pool.cells() {
            let (i, j) = (cell / pool.width, cell % pool.width);
            for c in 0..dims.channels {
                let k = cell * dims.channels + c;
                pooled[[i, j, c, r]] = values[k];
                entries[[i, j, c, r]] = indices[k];
            }
        }
    }

    Ok((
        Tensor::from_array(pooled.into_dyn()),
        ArgmaxMask::new(entries, dims),
    ))
}

fn pool_single_box(
    features: &ArrayView4<'_, f32>,
    dims: &FeatureDims,
    image: usize,
    bins: &[BinWindow],
) -> (Vec<f32>, Vec<Option<usize>>) {
    let len = bins.len() * dims.channels;
    let mut values = vec![0.0f32; len];
    let mut indices = vec![None; len];

    for (cell, bin) in bins.iter().enumerate() {
        if bin.is_empty() {
            continue;
        }
        for c in 0..dims.channels {
            let mut best = (bin.rows.start, bin.cols.start);
            let mut max_val = features[[best.0, best.1, c, image]];
            for row in bin.rows.clone() {
                for col in bin.cols.clone() {
                    let val = features[[row, col, c, image]];
                    if val > max_val {
                        max_val = val;
                        best = (row, col);
                    }
                }
            }
            let k = cell * dims.channels + c;
            values[k] = max_val;
            indices[k] = Some(dims.flat_index(image, best.0, best.1));
        }
    }
    (values, indices)
}
