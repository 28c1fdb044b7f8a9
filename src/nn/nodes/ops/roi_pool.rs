/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : ROI池化节点
 *
 * 输入：
 * - inputs[0]: 特征图 [H, W, C] 或 [H, W, C, N]（可导）
 * - inputs[1]: 原图尺寸（不可导）
 * - inputs[2]: 候选框列表（不可导，个数每次调用可变）
 * 输出：
 * - outputs[0]: 池化结果 [poolH, poolW, C, R]（可导）
 * - outputs[1]: argmax掩码（不可导，供相邻节点使用，反向时由图显式回传给本节点）
 *
 * 设备上的特征图先搬运到主机内存计算，结果再搬回原位置。
 */

use crate::nn::nodes::{NodeGrads, TraitNode, required_der};
use crate::nn::roi::{
    ArgmaxMask, FeatureDims, ImageSize, PoolSize, RoiBox, roi_max_pool, roi_max_unpool,
};
use crate::nn::{GraphError, Value};
use crate::tensor::Tensor;
use std::borrow::Cow;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoiPool {
    pool: PoolSize,
}

impl RoiPool {
    /// 创建 `RoiPool` 节点，`pool`为唯一的构造期配置
    pub fn new(pool: PoolSize) -> Result<Self, GraphError> {
        pool.validate()?;
        Ok(Self { pool })
    }

    pub const fn pool(&self) -> PoolSize {
        self.pool
    }

    /// 前向池化，返回`(pooled, mask)`；掩码须原样交给配对的`unpool_grad`
    pub fn pool_boxes(
        &self,
        feature_map: &Tensor,
        image_size: ImageSize,
        boxes: &[RoiBox],
    ) -> Result<(Tensor, ArgmaxMask), GraphError> {
        let placement = feature_map.placement();
        let host = on_host(feature_map);
        let (pooled, mask) = roi_max_pool(&host, image_size, boxes, self.pool)?;

        let channels = FeatureDims::from_shape(feature_map.shape())?.channels;
        let expected = [self.pool.height, self.pool.width, channels, boxes.len()];
        if pooled.shape() != expected || mask.shape() != expected {
            return Err(GraphError::ShapeMismatch {
                expected: expected.to_vec(),
                got: pooled.shape().to_vec(),
                message: "RoiPool 的输出须为[poolH, poolW, C, R]且与掩码同形状".to_string(),
            });
        }
        log::debug!(
            "RoiPool 前向：特征图{:?}，{}个框，输出{:?}，空窗口条目{}个",
            feature_map.shape(),
            boxes.len(),
            pooled.shape(),
            mask.sentinel_count()
        );
        Ok((pooled.into_placement(placement), mask))
    }

    /// 反向：把池化输出的梯度依据掩码散射回特征图
    pub fn unpool_grad(
        &self,
        feature_shape: &[usize],
        mask: &ArgmaxMask,
        der_pooled: &Tensor,
    ) -> Result<Tensor, GraphError> {
        let placement = der_pooled.placement();
        let host = on_host(der_pooled);
        let grad = roi_max_unpool(feature_shape, mask, &host)?;
        log::debug!(
            "RoiPool 反向：{}个框的梯度散射回{:?}",
            mask.box_count(),
            feature_shape
        );
        Ok(grad.into_placement(placement))
    }
}

fn on_host(tensor: &Tensor) -> Cow<'_, Tensor> {
    if tensor.is_on_host() {
        Cow::Borrowed(tensor)
    } else {
        Cow::Owned(tensor.to_host())
    }
}

impl TraitNode for RoiPool {
    fn type_name(&self) -> &'static str {
        "RoiPool"
    }

    fn num_inputs(&self) -> usize {
        3
    }

    fn num_outputs(&self) -> usize {
        2
    }

    fn differentiable_outputs(&self) -> Vec<usize> {
        vec![0]
    }

    fn forward(&self, inputs: &[&Value], _params: &[&Tensor]) -> Result<Vec<Value>, GraphError> {
        let [feature_map, image_size, boxes] = inputs else {
            return Err(GraphError::InvalidOperation(format!(
                "RoiPool 节点需要恰好3个输入，得到{}个",
                inputs.len()
            )));
        };
        let (pooled, mask) = self.pool_boxes(
            feature_map.expect_tensor("RoiPool 的特征图")?,
            image_size.expect_image_size("RoiPool 的原图尺寸")?,
            boxes.expect_boxes("RoiPool 的候选框")?,
        )?;
        Ok(vec![Value::Tensor(pooled), Value::Mask(mask)])
    }

    fn backward(
        &self,
        inputs: &[&Value],
        _params: &[&Tensor],
        outputs: &[Option<&Value>],
        der_outputs: &[Option<&Tensor>],
    ) -> Result<NodeGrads, GraphError> {
        let feature_map = inputs
            .first()
            .ok_or_else(|| GraphError::ComputationError("RoiPool 缺少特征图输入".to_string()))?
            .expect_tensor("RoiPool 的特征图")?;
        let mask = outputs
            .get(1)
            .copied()
            .flatten()
            .ok_or_else(|| {
                GraphError::ComputationError(
                    "RoiPool 的掩码输出没有值（可能已被释放），无法反向传播".to_string(),
                )
            })?
            .expect_mask("RoiPool 的掩码")?;
        let der_pooled = required_der(der_outputs, 0, "RoiPool")?;

        let grad = self.unpool_grad(feature_map.shape(), mask, der_pooled)?;
        Ok(NodeGrads {
            inputs: vec![Some(grad), None, None],
            params: Vec::new(),
        })
    }
}
