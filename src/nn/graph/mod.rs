/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : Graph 模块：承载ROI池化等节点的最小计算图
 *
 * - 变量与参数按名称存储，节点按拓扑顺序执行
 * - 前向：`forward`（仅推理）或`eval`（推理后紧接一次反向扫描）
 * - 反向：每次扫描新建`BackwardContext`，按待处理引用计数覆盖/累加导数
 */

mod backward;
mod config;
mod context;
mod core;
mod error;
mod types;

pub use config::GraphConfig;
pub use context::{Accumulation, BackwardContext};
pub use error::GraphError;
pub use types::{BackwardReport, NodeBackward, NodeId, ParamId, VarId};

use std::collections::HashMap;
use types::{GraphNode, Param, Variable};

#[derive(Debug, Clone)]
pub struct Graph {
    name: String,
    vars: Vec<Variable>,
    params: Vec<Param>,
    nodes: Vec<GraphNode>,
    var_index: HashMap<String, VarId>,
    param_index: HashMap<String, ParamId>,
    node_index: HashMap<String, NodeId>,
    config: GraphConfig,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
