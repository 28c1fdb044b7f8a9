/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : ROI最大池化反向：依据argmax掩码把上游梯度散射累加回特征图
 *
 * 最大池化的梯度：
 * - 被选为最大值的源元素：累加对应输出单元格的上游梯度
 * - 其他元素、哨兵条目：无贡献
 * 多个框或多个单元格选中同一源元素时梯度相加，绝不覆盖。
 * 使用 Rayon 在通道维度并行（各通道写入互不相交），通道内按(框, 行, 列)的固定顺序求和。
 */

use super::{ArgmaxMask, FeatureDims};
use crate::nn::GraphError;
use crate::tensor::Tensor;
use ndarray::{Array4, Ix4, IxDyn};
use rayon::prelude::*;

/// 反向ROI最大池化
///
/// # 参数
/// - `input_shape`: 前向时特征图的形状
/// - `mask`: 与之配对的前向调用返回的掩码
/// - `output_grad`: 池化输出的上游梯度，形状须与掩码一致
///
/// # 返回
/// 与特征图同形状的梯度
pub fn roi_max_unpool(
    input_shape: &[usize],
    mask: &ArgmaxMask,
    output_grad: &Tensor,
) -> Result<Tensor, GraphError> {
    output_grad.ensure_on_host()?;
    let dims = FeatureDims::from_shape(input_shape)?;
    if dims != mask.feature_dims() {
        let mask_dims = mask.feature_dims();
        return Err(GraphError::ShapeMismatch {
            expected: vec![dims.height, dims.width, dims.channels, dims.images],
            got: vec![
                mask_dims.height,
                mask_dims.width,
                mask_dims.channels,
                mask_dims.images,
            ],
            message: "argmax掩码并非由该形状的特征图产生".to_string(),
        });
    }
    let mask_shape = mask.shape();
    if output_grad.shape() != mask_shape {
        return Err(GraphError::ShapeMismatch {
            expected: mask_shape.to_vec(),
            got: output_grad.shape().to_vec(),
            message: "上游梯度的形状须与池化输出[poolH, poolW, C, R]一致".to_string(),
        });
    }
    let grad = output_grad
        .view()
        .into_dimensionality::<Ix4>()
        .map_err(|e| GraphError::ComputationError(format!("上游梯度无法视作4阶张量：{e}")))?;
    let [pool_h, pool_w, channels, rois] = mask_shape;
    let entries = mask.entries();
    let plane = dims.spatial_len();

    let per_channel: Vec<Vec<f32>> = (0..channels)
        .into_par_iter()
        .map(|c| {
            let mut acc = vec![0.0f32; plane];
            for r in 0..rois {
                for i in 0..pool_h {
                    for j in 0..pool_w {
                        if let Some(flat) = entries[[i, j, c, r]] {
                            acc[flat] += grad[[i, j, c, r]];
                        }
                    }
                }
            }
            acc
        })
        .collect();

    let mut input_grad = Array4::<f32>::zeros((dims.height, dims.width, dims.channels, dims.images));
    for (c, acc) in per_channel.iter().enumerate() {
        for (flat, &g) in acc.iter().enumerate() {
            if g != 0. {
                let src = dims.decode(flat);
                input_grad[[src.row, src.col, c, src.image]] = g;
            }
        }
    }
    let input_grad = input_grad
        .into_shape(IxDyn(input_shape))
        .map_err(|e| GraphError::ComputationError(format!("无法还原为输入形状{input_shape:?}：{e}")))?;
    Ok(Tensor::from_array(input_grad))
}
