/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : Graph 模块的类型定义：变量、参数、节点的存储结构与ID
 */

use crate::nn::Value;
use crate::nn::nodes::NodeType;
use crate::tensor::Tensor;
use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            pub const fn index(&self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

define_id!(
    /// 变量在图中的位置
    VarId
);
define_id!(
    /// 参数在图中的位置
    ParamId
);
define_id!(
    /// 节点在图中的位置（即添加顺序）
    NodeId
);

/// 图变量：值与导数。
/// `precious`为true的变量在节省内存模式下也不会被释放
#[derive(Debug, Clone)]
pub(crate) struct Variable {
    pub(crate) name: String,
    pub(crate) value: Option<Value>,
    pub(crate) der: Option<Tensor>,
    pub(crate) precious: bool,
}

impl Variable {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: None,
            der: None,
            precious: false,
        }
    }
}

/// 可学习参数。其导数跨多次`eval`保留，是否累加由`GraphConfig::accumulate_param_ders`决定
#[derive(Debug, Clone)]
pub(crate) struct Param {
    pub(crate) name: String,
    pub(crate) value: Tensor,
    pub(crate) der: Option<Tensor>,
}

/// 图中的一个节点及其连接关系
#[derive(Debug, Clone)]
pub(crate) struct GraphNode {
    pub(crate) name: String,
    pub(crate) node: NodeType,
    pub(crate) inputs: Vec<VarId>,
    pub(crate) outputs: Vec<VarId>,
    pub(crate) params: Vec<ParamId>,
}

/// 单个节点在一次反向扫描中的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeBackward {
    /// 已计算并把梯度累加到输入变量/参数
    Done,
    /// 所需的上游梯度尚未全部就绪，本次什么也不做
    Deferred,
}

/// 一次`eval`中反向扫描的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackwardReport {
    pub executed: Vec<NodeId>,
    pub deferred: Vec<NodeId>,
}
