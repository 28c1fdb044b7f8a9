mod node_roi_pool;

use crate::nn::roi::ArgmaxMask;
use crate::tensor::Tensor;

/// 4x4单通道特征图，值为1..=16（行优先）
fn feature_map_1_to_16() -> Tensor {
    let data = (1..=16).map(|x| x as f32).collect::<Vec<_>>();
    Tensor::new(&data, &[4, 4, 1])
}

/// 值互不相同、间隔为`step`的特征图（用于避免并列最大值）
fn distinct_feature_map(shape: &[usize], step: f32) -> Tensor {
    let len = shape.iter().product::<usize>();
    // 7919为素数，只要len不是它的倍数，(i * 7919) % len 就是0..len的一个排列
    let data = (0..len)
        .map(|i| ((i * 7919) % len) as f32 * step)
        .collect::<Vec<_>>();
    Tensor::new(&data, shape)
}

/// 每个源元素被掩码选中的次数，形状与特征图一致
fn selection_counts(mask: &ArgmaxMask, feature_shape: &[usize]) -> Tensor {
    let mut counts = Tensor::zeros(feature_shape);
    for ([_, _, c, _], entry) in mask.indexed_iter() {
        if let Some(src) = entry {
            if feature_shape.len() == 3 {
                counts[[src.row, src.col, c]] += 1.;
            } else {
                counts[[src.row, src.col, c, src.image]] += 1.;
            }
        }
    }
    counts
}
