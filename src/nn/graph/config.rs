use super::GraphError;
use serde::{Deserialize, Serialize};

/// 计算图的全局开关，由执行器在每次扫描时显式读取
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// 释放不再需要的非precious中间变量（值与导数），以降低峰值内存
    pub conserve_memory: bool,
    /// 参数导数跨多次`eval`累加（而非每次覆盖）
    pub accumulate_param_ders: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            conserve_memory: true,
            accumulate_param_ders: false,
        }
    }
}

impl GraphConfig {
    /// 从JSON读取配置，缺省字段取默认值
    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        serde_json::from_str(json).map_err(|e| GraphError::Config(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        serde_json::to_string_pretty(self).map_err(|e| GraphError::Config(e.to_string()))
    }
}
