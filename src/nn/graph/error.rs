/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : Graph 模块的错误类型
 *
 * 缺失上游梯度不是错误：节点此时直接推迟（见`NodeBackward::Deferred`）。
 */

use crate::errors::TensorError;
use thiserror::Error;

/// Graph 操作错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// 特征图、原图或池化网格的尺寸在结构上无效（不可恢复）
    #[error("几何尺寸无效：{0}")]
    InvalidGeometry(String),
    #[error("形状不匹配：期望{expected:?}，实际{got:?}。{message}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
        message: String,
    },
    #[error("无效操作：{0}")]
    InvalidOperation(String),
    #[error("变量`{0}`不存在")]
    VariableNotFound(String),
    #[error("参数`{0}`不存在")]
    ParamNotFound(String),
    #[error("名称`{0}`重复")]
    DuplicateName(String),
    #[error("计算错误：{0}")]
    ComputationError(String),
    #[error("配置错误：{0}")]
    Config(String),
    #[error(transparent)]
    Tensor(#[from] TensorError),
}
