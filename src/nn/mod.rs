/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 负责ROI池化算子及承载它的计算图
 */

mod graph;
mod nodes;
pub mod roi;
mod value;

pub use graph::{
    Accumulation, BackwardContext, BackwardReport, Graph, GraphConfig, GraphError, NodeBackward,
    NodeId, ParamId, VarId,
};
pub use nodes::{ChannelScale, NodeGrads, NodeType, Relu, RoiPool, TraitNode};
pub use roi::{ArgmaxMask, ImageSize, MaskIndex, PoolSize, RoiBox};
pub use value::Value;

#[cfg(test)]
mod tests;
