/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : ROI池化的前向（roi_max_pool）、反向（roi_max_unpool）与 RoiPool 节点的单元测试
 */

use super::{distinct_feature_map, feature_map_1_to_16, selection_counts};
use crate::assert_err;
use crate::errors::TensorError;
use crate::nn::roi::{
    ArgmaxMask, CoordinateMapper, ImageSize, MaskIndex, PoolSize, RoiBox, roi_max_pool,
    roi_max_unpool,
};
use crate::nn::{GraphError, RoiPool, TraitNode, Value};
use crate::tensor::{Placement, Tensor};
use approx::assert_abs_diff_eq;

fn pool(h: usize, w: usize) -> PoolSize {
    PoolSize::new(h, w).unwrap()
}

fn at(image: usize, row: usize, col: usize) -> Option<MaskIndex> {
    Some(MaskIndex { image, row, col })
}

/// 直接在特征图上暴力求每个窗口的最大值，作为对照
fn brute_force_pool(
    feature_map: &Tensor,
    image_size: ImageSize,
    boxes: &[RoiBox],
    pool: PoolSize,
) -> Tensor {
    let mapper = CoordinateMapper::new(image_size, feature_map.shape(), pool).unwrap();
    let dims = mapper.dims();
    let mut expected = Tensor::zeros(&[pool.height, pool.width, dims.channels, boxes.len()]);
    for (r, roi) in boxes.iter().enumerate() {
        for (cell, bin) in mapper.bins(roi).iter().enumerate() {
            let (i, j) = (cell / pool.width, cell % pool.width);
            for c in 0..dims.channels {
                let mut best = f32::NEG_INFINITY;
                for row in bin.rows.clone() {
                    for col in bin.cols.clone() {
                        let v = if feature_map.dimension() == 3 {
                            feature_map[[row, col, c]]
                        } else {
                            feature_map[[row, col, c, roi.image]]
                        };
                        best = best.max(v);
                    }
                }
                expected[[i, j, c, r]] = if bin.is_empty() { 0. } else { best };
            }
        }
    }
    expected
}

/// 依据掩码读出源元素的值
fn value_at(feature_map: &Tensor, src: MaskIndex, c: usize) -> f32 {
    if feature_map.dimension() == 3 {
        feature_map[[src.row, src.col, c]]
    } else {
        feature_map[[src.row, src.col, c, src.image]]
    }
}

// ==================== 前向 ====================

#[test]
fn test_pool_whole_image_4x4() -> Result<(), GraphError> {
    let features = feature_map_1_to_16();
    let boxes = [RoiBox::new(0, 0., 0., 4., 4.)];
    let (pooled, mask) = roi_max_pool(&features, ImageSize::new(4., 4.), &boxes, pool(2, 2))?;

    assert_eq!(pooled.shape(), &[2, 2, 1, 1]);
    assert_eq!(mask.shape(), [2, 2, 1, 1]);
    assert_eq!(pooled, Tensor::new(&[6., 8., 14., 16.], &[2, 2, 1, 1]));
    assert_eq!(mask.entry([0, 0, 0, 0]), at(0, 1, 1));
    assert_eq!(mask.entry([0, 1, 0, 0]), at(0, 1, 3));
    assert_eq!(mask.entry([1, 0, 0, 0]), at(0, 3, 1));
    assert_eq!(mask.entry([1, 1, 0, 0]), at(0, 3, 3));
    assert_eq!(mask.flat_entry([1, 1, 0, 0]), Some(15));
    assert_eq!(mask.sentinel_count(), 0);
    Ok(())
}

#[test]
fn test_pool_matches_brute_force() -> Result<(), GraphError> {
    let features = distinct_feature_map(&[9, 11, 3], 0.25);
    let image_size = ImageSize::new(72., 88.); // 下采样8倍
    let boxes = [
        RoiBox::new(0, 0., 0., 88., 72.),
        RoiBox::new(0, 10., 5., 60., 40.),
        RoiBox::new(0, 33.3, 17.9, 34.1, 71.),
        RoiBox::new(0, -20., 50., 30., 200.),
        RoiBox::new(0, 80., 64., 87., 71.),
    ];
    for grid in [pool(1, 1), pool(2, 3), pool(3, 3), pool(4, 2)] {
        let (pooled, mask) = roi_max_pool(&features, image_size, &boxes, grid)?;
        let expected = brute_force_pool(&features, image_size, &boxes, grid);
        assert_eq!(pooled, expected, "grid = {grid:?}");

        // 掩码所指的源元素的值即为池化输出
        for ([i, j, c, r], entry) in mask.indexed_iter() {
            match entry {
                Some(src) => assert_eq!(value_at(&features, src, c), pooled[[i, j, c, r]]),
                None => assert_eq!(pooled[[i, j, c, r]], 0.),
            }
        }
    }
    Ok(())
}

#[test]
fn test_pool_is_deterministic() -> Result<(), GraphError> {
    let features = Tensor::new_random(-1., 1., &[8, 8, 4]);
    let boxes = [
        RoiBox::new(0, 1., 1., 7., 7.),
        RoiBox::new(0, 0., 3., 4., 8.),
    ];
    let image_size = ImageSize::new(8., 8.);
    let (pooled1, mask1) = roi_max_pool(&features, image_size, &boxes, pool(3, 3))?;
    let (pooled2, mask2) = roi_max_pool(&features, image_size, &boxes, pool(3, 3))?;
    assert_eq!(pooled1, pooled2);
    assert_eq!(mask1, mask2);
    Ok(())
}

#[test]
fn test_ties_pick_first_in_row_major_order() -> Result<(), GraphError> {
    let features = Tensor::new(&[5.; 16], &[4, 4, 1]);
    let boxes = [RoiBox::new(0, 0., 0., 4., 4.)];
    let (pooled, mask) = roi_max_pool(&features, ImageSize::new(4., 4.), &boxes, pool(2, 2))?;
    assert_eq!(pooled, Tensor::new(&[5.; 4], &[2, 2, 1, 1]));
    assert_eq!(mask.entry([0, 0, 0, 0]), at(0, 0, 0));
    assert_eq!(mask.entry([0, 1, 0, 0]), at(0, 0, 2));
    assert_eq!(mask.entry([1, 0, 0, 0]), at(0, 2, 0));
    assert_eq!(mask.entry([1, 1, 0, 0]), at(0, 2, 2));
    Ok(())
}

#[test]
fn test_negative_values_are_not_clipped() -> Result<(), GraphError> {
    let features = feature_map_1_to_16() * -1.;
    let boxes = [RoiBox::new(0, 0., 0., 4., 4.)];
    let (pooled, mask) = roi_max_pool(&features, ImageSize::new(4., 4.), &boxes, pool(1, 1))?;
    assert_eq!(pooled[[0, 0, 0, 0]], -1.);
    assert_eq!(mask.entry([0, 0, 0, 0]), at(0, 0, 0));
    Ok(())
}

#[test]
fn test_degenerate_box_gives_zeros_and_sentinels() -> Result<(), GraphError> {
    let features = feature_map_1_to_16();
    let boxes = [
        RoiBox::new(0, 0., 0., 4., 4.),
        RoiBox::new(0, 2., 2., 2., 3.),
        RoiBox::new(3, 0., 0., 4., 4.),
    ];
    let (pooled, mask) = roi_max_pool(&features, ImageSize::new(4., 4.), &boxes, pool(2, 2))?;
    assert_eq!(pooled.shape(), &[2, 2, 1, 3]);
    assert_eq!(mask.sentinel_count(), 8);
    for i in 0..2 {
        for j in 0..2 {
            for r in 1..3 {
                assert_eq!(pooled[[i, j, 0, r]], 0.);
                assert_eq!(mask.entry([i, j, 0, r]), None);
            }
        }
    }

    // 哨兵条目不产生梯度
    let grad = roi_max_unpool(features.shape(), &mask, &Tensor::ones(&[2, 2, 1, 3]))?;
    assert_eq!(grad.sum(), 4.);
    Ok(())
}

#[test]
fn test_zero_boxes() -> Result<(), GraphError> {
    let features = distinct_feature_map(&[4, 4, 2], 1.);
    let (pooled, mask) = roi_max_pool(&features, ImageSize::new(4., 4.), &[], pool(2, 2))?;
    assert_eq!(pooled.shape(), &[2, 2, 2, 0]);
    assert_eq!(mask.shape(), [2, 2, 2, 0]);
    assert_eq!(mask.box_count(), 0);

    let grad = roi_max_unpool(features.shape(), &mask, &Tensor::zeros(&[2, 2, 2, 0]))?;
    assert_eq!(grad, Tensor::zeros(&[4, 4, 2]));
    Ok(())
}

#[test]
fn test_channels_pool_independently() -> Result<(), GraphError> {
    // 通道0行优先递增，通道1行优先递减
    let mut features = Tensor::zeros(&[4, 4, 2]);
    for row in 0..4 {
        for col in 0..4 {
            let v = (row * 4 + col) as f32;
            features[[row, col, 0]] = v;
            features[[row, col, 1]] = -v;
        }
    }
    let boxes = [RoiBox::new(0, 0., 0., 4., 4.)];
    let (pooled, mask) = roi_max_pool(&features, ImageSize::new(4., 4.), &boxes, pool(1, 1))?;
    assert_eq!(pooled[[0, 0, 0, 0]], 15.);
    assert_eq!(pooled[[0, 0, 1, 0]], 0.);
    assert_eq!(mask.entry([0, 0, 0, 0]), at(0, 3, 3));
    assert_eq!(mask.entry([0, 0, 1, 0]), at(0, 0, 0));
    Ok(())
}

#[test]
fn test_batched_feature_map() -> Result<(), GraphError> {
    let mut features = Tensor::zeros(&[4, 4, 1, 2]);
    for row in 0..4 {
        for col in 0..4 {
            let v = (row * 4 + col + 1) as f32;
            features[[row, col, 0, 0]] = v;
            // 第二张图的最大值在左上角
            features[[row, col, 0, 1]] = 100. - v;
        }
    }
    let boxes = [
        RoiBox::new(1, 0., 0., 4., 4.),
        RoiBox::new(0, 0., 0., 4., 4.),
    ];
    let (pooled, mask) = roi_max_pool(&features, ImageSize::new(4., 4.), &boxes, pool(1, 1))?;
    assert_eq!(pooled.to_vec(), vec![99., 16.]);
    assert_eq!(mask.entry([0, 0, 0, 0]), at(1, 0, 0));
    assert_eq!(mask.entry([0, 0, 0, 1]), at(0, 3, 3));

    let grad = roi_max_unpool(features.shape(), &mask, &Tensor::new(&[2., 3.], &[1, 1, 1, 2]))?;
    assert_eq!(grad.shape(), &[4, 4, 1, 2]);
    assert_eq!(grad[[0, 0, 0, 1]], 2.);
    assert_eq!(grad[[3, 3, 0, 0]], 3.);
    assert_eq!(grad.count_nonzero(), 2);
    Ok(())
}

// ==================== 反向 ====================

#[test]
fn test_unpool_whole_image_4x4() -> Result<(), GraphError> {
    let features = feature_map_1_to_16();
    let boxes = [RoiBox::new(0, 0., 0., 4., 4.)];
    let (_, mask) = roi_max_pool(&features, ImageSize::new(4., 4.), &boxes, pool(2, 2))?;
    let grad = roi_max_unpool(features.shape(), &mask, &Tensor::ones(&[2, 2, 1, 1]))?;

    let mut expected = Tensor::zeros(&[4, 4, 1]);
    for (row, col) in [(1, 1), (1, 3), (3, 1), (3, 3)] {
        expected[[row, col, 0]] = 1.;
    }
    assert_eq!(grad, expected);
    Ok(())
}

#[test]
fn test_unpool_of_ones_counts_selections() -> Result<(), GraphError> {
    let features = distinct_feature_map(&[7, 6, 2], 0.5);
    let image_size = ImageSize::new(14., 12.);
    let boxes = [
        RoiBox::new(0, 0., 0., 12., 14.),
        RoiBox::new(0, 2., 2., 9., 11.),
        RoiBox::new(0, 2., 2., 9., 11.),
        RoiBox::new(0, 5., 0., 6., 1.),
    ];
    let (_, mask) = roi_max_pool(&features, image_size, &boxes, pool(3, 2))?;
    let grad = roi_max_unpool(features.shape(), &mask, &Tensor::ones(&[3, 2, 2, 4]))?;
    assert_eq!(grad, selection_counts(&mask, features.shape()));
    Ok(())
}

#[test]
fn test_overlapping_boxes_accumulate() -> Result<(), GraphError> {
    let features = feature_map_1_to_16();
    // 两个框的最大值都落在(3, 3)
    let boxes = [
        RoiBox::new(0, 0., 0., 4., 4.),
        RoiBox::new(0, 2., 2., 4., 4.),
    ];
    let (_, mask) = roi_max_pool(&features, ImageSize::new(4., 4.), &boxes, pool(1, 1))?;
    let der = Tensor::new(&[0.5, 1.25], &[1, 1, 1, 2]);
    let grad = roi_max_unpool(features.shape(), &mask, &der)?;
    assert_abs_diff_eq!(grad[[3, 3, 0]], 1.75);
    assert_eq!(grad.count_nonzero(), 1);
    Ok(())
}

#[test]
fn test_unpool_preserves_gradient_mass() -> Result<(), GraphError> {
    let features = distinct_feature_map(&[10, 10, 3], 0.1);
    let boxes = [
        RoiBox::new(0, 0., 0., 10., 10.),
        RoiBox::new(0, 3., 1., 8., 9.),
        RoiBox::new(0, 4.5, 4.5, 4.5, 9.), // 退化
    ];
    let (_, mask) = roi_max_pool(&features, ImageSize::new(10., 10.), &boxes, pool(2, 2))?;
    let der = Tensor::new_random(0.5, 1.5, &[2, 2, 3, 3]);
    let grad = roi_max_unpool(features.shape(), &mask, &der)?;

    let mut expected_mass = 0.;
    for (index, entry) in mask.indexed_iter() {
        if entry.is_some() {
            expected_mass += der[index];
        }
    }
    assert_abs_diff_eq!(grad.sum(), expected_mass, epsilon = 1e-4);
    Ok(())
}

#[test]
fn test_unpool_shape_errors() -> Result<(), GraphError> {
    let features = feature_map_1_to_16();
    let boxes = [RoiBox::new(0, 0., 0., 4., 4.)];
    let (_, mask) = roi_max_pool(&features, ImageSize::new(4., 4.), &boxes, pool(2, 2))?;

    assert_err!(
        roi_max_unpool(features.shape(), &mask, &Tensor::ones(&[2, 2, 1, 2])),
        GraphError::ShapeMismatch(
            [2, 2, 1, 1],
            [2, 2, 1, 2],
            "上游梯度的形状须与池化输出[poolH, poolW, C, R]一致"
        )
    );
    assert_err!(
        roi_max_unpool(&[4, 4, 2], &mask, &Tensor::ones(&[2, 2, 1, 1])),
        GraphError::ShapeMismatch { expected, got, .. }
            if expected == &[4, 4, 2, 1] && got == &[4, 4, 1, 1]
    );
    assert_err!(
        roi_max_unpool(&[4, 4], &mask, &Tensor::ones(&[2, 2, 1, 1])),
        GraphError::InvalidGeometry(_)
    );
    Ok(())
}

#[test]
fn test_kernel_requires_host_memory() {
    let features = feature_map_1_to_16().to_device();
    let boxes = [RoiBox::new(0, 0., 0., 4., 4.)];
    assert_err!(
        roi_max_pool(&features, ImageSize::new(4., 4.), &boxes, pool(2, 2)),
        GraphError::Tensor(TensorError::NotOnHost(Placement::Device))
    );
}

// ==================== RoiPool 节点 ====================

#[test]
fn test_node_new_rejects_empty_grid() {
    assert_err!(
        RoiPool::new(PoolSize {
            height: 2,
            width: 0
        }),
        GraphError::InvalidGeometry(_)
    );
}

#[test]
fn test_node_on_device_round_trip() -> Result<(), GraphError> {
    let node = RoiPool::new(pool(2, 2))?;
    let features = feature_map_1_to_16().to_device();
    let boxes = [RoiBox::new(0, 0., 0., 4., 4.)];
    let (pooled, mask) = node.pool_boxes(&features, ImageSize::new(4., 4.), &boxes)?;
    assert_eq!(pooled.placement(), Placement::Device);
    assert_eq!(pooled.to_host(), Tensor::new(&[6., 8., 14., 16.], &[2, 2, 1, 1]));

    let der = Tensor::ones(&[2, 2, 1, 1]).to_device();
    let grad = node.unpool_grad(features.shape(), &mask, &der)?;
    assert_eq!(grad.placement(), Placement::Device);
    assert_eq!(grad.sum(), 4.);
    Ok(())
}

#[test]
fn test_node_forward_backward_via_trait() -> Result<(), GraphError> {
    let node = RoiPool::new(pool(2, 2))?;
    assert_eq!(node.num_inputs(), 3);
    assert_eq!(node.num_outputs(), 2);
    assert_eq!(node.differentiable_outputs(), vec![0]);

    let features = Value::from(feature_map_1_to_16());
    let image_size = Value::from(ImageSize::new(4., 4.));
    let boxes = Value::from(vec![RoiBox::new(0, 0., 0., 4., 4.)]);
    let inputs = [&features, &image_size, &boxes];

    let outputs = node.forward(&inputs, &[])?;
    assert_eq!(outputs.len(), 2);
    let pooled = outputs[0].expect_tensor("pooled")?;
    let mask: &ArgmaxMask = outputs[1].expect_mask("mask")?;
    assert_eq!(pooled.to_vec(), vec![6., 8., 14., 16.]);
    assert_eq!(mask.entry([0, 0, 0, 0]), at(0, 1, 1));

    let der = Tensor::new(&[1., 2., 3., 4.], &[2, 2, 1, 1]);
    let grads = node.backward(
        &inputs,
        &[],
        &[Some(&outputs[0]), Some(&outputs[1])],
        &[Some(&der), None],
    )?;
    assert_eq!(grads.inputs.len(), 3);
    assert!(grads.inputs[1].is_none() && grads.inputs[2].is_none());
    let grad = grads.inputs[0].as_ref().unwrap();
    assert_eq!(grad[[1, 1, 0]], 1.);
    assert_eq!(grad[[1, 3, 0]], 2.);
    assert_eq!(grad[[3, 1, 0]], 3.);
    assert_eq!(grad[[3, 3, 0]], 4.);
    assert_eq!(grad.sum(), 10.);

    // 掩码输出已被释放时无法反向
    assert_err!(
        node.backward(&inputs, &[], &[Some(&outputs[0]), None], &[Some(&der), None]),
        GraphError::ComputationError(_)
    );
    Ok(())
}

#[test]
fn test_node_rejects_wrong_input_kinds() -> Result<(), GraphError> {
    let node = RoiPool::new(pool(2, 2))?;
    let features = Value::from(feature_map_1_to_16());
    let image_size = Value::from(ImageSize::new(4., 4.));
    let boxes = Value::from(vec![RoiBox::new(0, 0., 0., 4., 4.)]);

    assert_err!(
        node.forward(&[&features, &boxes, &image_size], &[]),
        GraphError::InvalidOperation(msg) if msg.contains("ImageSize")
    );
    assert_err!(
        node.forward(&[&features, &image_size], &[]),
        GraphError::InvalidOperation(_)
    );
    Ok(())
}
