/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : ChannelScale 节点 - 逐通道缩放
 *
 * 数学：y[.., .., c, ..] = x[.., .., c, ..] * w[c]，通道位于第2轴
 * （特征图[H, W, C(, N)]与池化输出[poolH, poolW, C, R]的通道轴一致）
 * 梯度：dx = dy * w[c]；dw[c] = Σ x * dy（对通道以外的所有轴求和）
 *
 * 参数：
 * - params[0]: w，形状 [C]，初始为全1
 */

use crate::nn::nodes::{NodeGrads, TraitNode, required_der};
use crate::nn::{GraphError, Value};
use crate::tensor::Tensor;
use ndarray::Axis;

const CHANNEL_AXIS: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelScale {
    channels: usize,
}

impl ChannelScale {
    pub fn new(channels: usize) -> Result<Self, GraphError> {
        if channels == 0 {
            return Err(GraphError::InvalidOperation(
                "ChannelScale 的通道数必须为正".to_string(),
            ));
        }
        Ok(Self { channels })
    }

    pub const fn channels(&self) -> usize {
        self.channels
    }

    fn check_shapes(&self, x: &Tensor, w: &Tensor) -> Result<(), GraphError> {
        if x.dimension() <= CHANNEL_AXIS || x.shape()[CHANNEL_AXIS] != self.channels {
            return Err(GraphError::ShapeMismatch {
                expected: vec![0, 0, self.channels],
                got: x.shape().to_vec(),
                message: format!("ChannelScale 的输入第{CHANNEL_AXIS}轴须为{}个通道", self.channels),
            });
        }
        if w.shape() != [self.channels] {
            return Err(GraphError::ShapeMismatch {
                expected: vec![self.channels],
                got: w.shape().to_vec(),
                message: "ChannelScale 的参数形状须为[C]".to_string(),
            });
        }
        Ok(())
    }

    fn scale(x: &Tensor, w: &Tensor) -> Tensor {
        let mut y = x.data().clone();
        for (c, mut lane) in y.axis_iter_mut(Axis(CHANNEL_AXIS)).enumerate() {
            lane *= w[[c]];
        }
        Tensor::from_array(y).into_placement(x.placement())
    }
}

impl TraitNode for ChannelScale {
    fn type_name(&self) -> &'static str {
        "ChannelScale"
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn num_params(&self) -> usize {
        1
    }

    fn init_params(&self) -> Vec<Tensor> {
        vec![Tensor::ones(&[self.channels])]
    }

    fn forward(&self, inputs: &[&Value], params: &[&Tensor]) -> Result<Vec<Value>, GraphError> {
        let (x, w) = unpack(inputs, params)?;
        self.check_shapes(x, w)?;
        Ok(vec![Value::Tensor(Self::scale(x, w))])
    }

    fn backward(
        &self,
        inputs: &[&Value],
        params: &[&Tensor],
        _outputs: &[Option<&Value>],
        der_outputs: &[Option<&Tensor>],
    ) -> Result<NodeGrads, GraphError> {
        let (x, w) = unpack(inputs, params)?;
        self.check_shapes(x, w)?;
        let dy = required_der(der_outputs, 0, "ChannelScale")?;
        if !dy.is_same_shape(x) {
            return Err(GraphError::ShapeMismatch {
                expected: x.shape().to_vec(),
                got: dy.shape().to_vec(),
                message: "ChannelScale 的上游梯度须与输入同形状".to_string(),
            });
        }

        let dx = Self::scale(dy, w);
        let mut dw = Tensor::zeros(&[self.channels]);
        let x_lanes = x.data().axis_iter(Axis(CHANNEL_AXIS));
        let dy_lanes = dy.data().axis_iter(Axis(CHANNEL_AXIS));
        for (c, (x_lane, dy_lane)) in x_lanes.zip(dy_lanes).enumerate() {
            dw[[c]] = (&x_lane * &dy_lane).sum();
        }
        Ok(NodeGrads {
            inputs: vec![Some(dx)],
            params: vec![Some(dw.into_placement(w.placement()))],
        })
    }
}

fn unpack<'a>(
    inputs: &[&'a Value],
    params: &[&'a Tensor],
) -> Result<(&'a Tensor, &'a Tensor), GraphError> {
    let x = inputs
        .first()
        .ok_or_else(|| GraphError::ComputationError("ChannelScale 缺少输入".to_string()))?
        .expect_tensor("ChannelScale")?;
    let w = params
        .first()
        .copied()
        .ok_or_else(|| GraphError::ComputationError("ChannelScale 缺少参数".to_string()))?;
    Ok((x, w))
}
