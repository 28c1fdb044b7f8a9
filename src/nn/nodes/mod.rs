/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 计算图中的节点（层）种类。种类集合在编译期即已确定，
 *                 故用 enum_dispatch 做静态分发，而非 trait object。
 */

mod ops;

pub use ops::{ChannelScale, Relu, RoiPool};

use crate::nn::{GraphError, Value};
use crate::tensor::Tensor;
use enum_dispatch::enum_dispatch;

#[enum_dispatch]
#[derive(Debug, Clone)]
pub enum NodeType {
    RoiPool,
    Relu,
    ChannelScale,
}

/// 单个节点一次反向计算的结果
///
/// `None`表示对应输入（或参数）不可导，不参与累加
#[derive(Debug, Clone, Default)]
pub struct NodeGrads {
    pub inputs: Vec<Option<Tensor>>,
    pub params: Vec<Option<Tensor>>,
}

#[enum_dispatch(NodeType)]
pub trait TraitNode {
    /// 节点类型名，用于日志与错误信息
    fn type_name(&self) -> &'static str;

    fn num_inputs(&self) -> usize;

    fn num_outputs(&self) -> usize;

    fn num_params(&self) -> usize {
        0
    }

    /// 反向传播时需要上游梯度的输出位置，只有这些输出参与“梯度是否就绪”的检查。
    /// 不可导的次要输出（如ROI池化的掩码）永远不会收到梯度，必须排除在外，否则节点将永远等待。
    fn differentiable_outputs(&self) -> Vec<usize> {
        (0..self.num_outputs()).collect()
    }

    /// 参数的初始值，个数须等于`num_params()`
    fn init_params(&self) -> Vec<Tensor> {
        Vec::new()
    }

    /// 根据输入与参数计算所有输出（注意：由于该接口只在Graph中使用，调用时输入的个数与存在性已被校验）
    fn forward(&self, inputs: &[&Value], params: &[&Tensor]) -> Result<Vec<Value>, GraphError>;

    /// 根据上游梯度计算对各输入、各参数的梯度。
    /// `der_outputs`中`differentiable_outputs()`所列位置保证为`Some`。
    fn backward(
        &self,
        inputs: &[&Value],
        params: &[&Tensor],
        outputs: &[Option<&Value>],
        der_outputs: &[Option<&Tensor>],
    ) -> Result<NodeGrads, GraphError>;
}

/// 取出第`index`个上游梯度，缺失时报错（供各节点的`backward`使用）
pub(crate) fn required_der<'a>(
    der_outputs: &[Option<&'a Tensor>],
    index: usize,
    who: &str,
) -> Result<&'a Tensor, GraphError> {
    der_outputs.get(index).copied().flatten().ok_or_else(|| {
        GraphError::ComputationError(format!("{who}缺少第{index}个输出的上游梯度"))
    })
}
