/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : ReLU 节点：y = max(x, 0)，梯度 dx = dy * [x > 0]
 */

use crate::nn::nodes::{NodeGrads, TraitNode, required_der};
use crate::nn::{GraphError, Value};
use crate::tensor::Tensor;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relu;

impl Relu {
    pub const fn new() -> Self {
        Self
    }
}

impl TraitNode for Relu {
    fn type_name(&self) -> &'static str {
        "Relu"
    }

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn forward(&self, inputs: &[&Value], _params: &[&Tensor]) -> Result<Vec<Value>, GraphError> {
        let x = first_tensor(inputs)?;
        Ok(vec![Value::Tensor(x.mapv(|v| v.max(0.)))])
    }

    fn backward(
        &self,
        inputs: &[&Value],
        _params: &[&Tensor],
        _outputs: &[Option<&Value>],
        der_outputs: &[Option<&Tensor>],
    ) -> Result<NodeGrads, GraphError> {
        let x = first_tensor(inputs)?;
        let dy = required_der(der_outputs, 0, "Relu")?;
        let local_grad = x.where_with_f32(|v| v > 0., |_| 1., |_| 0.);
        if !local_grad.is_same_shape(dy) {
            return Err(GraphError::ShapeMismatch {
                expected: x.shape().to_vec(),
                got: dy.shape().to_vec(),
                message: "Relu 的上游梯度须与输入同形状".to_string(),
            });
        }
        Ok(NodeGrads {
            inputs: vec![Some(dy * &local_grad)],
            params: Vec::new(),
        })
    }
}

fn first_tensor<'a>(inputs: &[&'a Value]) -> Result<&'a Tensor, GraphError> {
    inputs
        .first()
        .ok_or_else(|| GraphError::ComputationError("Relu 缺少输入".to_string()))?
        .expect_tensor("Relu")
}
