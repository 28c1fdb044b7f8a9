use super::Tensor;
use crate::errors::TensorError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 张量数据的存放位置
///
/// 本库并不真正驱动加速器，`Device`仅作为位置标记：
/// 调用方在接口边界通过`to_host()`/`to_device()`显式搬运，算法本身只定义在主机内存上。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Placement {
    #[default]
    Host,
    Device,
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "主机内存"),
            Self::Device => write!(f, "设备内存"),
        }
    }
}

impl Tensor {
    pub const fn placement(&self) -> Placement {
        self.placement
    }

    pub fn is_on_host(&self) -> bool {
        self.placement == Placement::Host
    }

    /// 返回位于主机内存上的副本
    pub fn to_host(&self) -> Self {
        self.to_placement(Placement::Host)
    }

    /// 返回位于设备内存上的副本
    pub fn to_device(&self) -> Self {
        self.to_placement(Placement::Device)
    }

    pub fn to_placement(&self, placement: Placement) -> Self {
        Self {
            data: self.data.clone(),
            placement,
        }
    }

    /// 将自身搬运到`placement`（无拷贝）
    pub fn into_placement(mut self, placement: Placement) -> Self {
        self.placement = placement;
        self
    }

    /// 校验张量位于主机内存，供只能在主机上执行的算法使用
    pub fn ensure_on_host(&self) -> Result<(), TensorError> {
        if self.is_on_host() {
            Ok(())
        } else {
            Err(TensorError::NotOnHost(self.placement))
        }
    }
}
