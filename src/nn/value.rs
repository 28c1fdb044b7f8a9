use crate::nn::GraphError;
use crate::nn::roi::{ArgmaxMask, ImageSize, RoiBox};
use crate::tensor::Tensor;

/// 计算图中变量所承载的值
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Tensor(Tensor),
    /// ROI池化前向产生的argmax掩码（不可导）
    Mask(ArgmaxMask),
    Boxes(Vec<RoiBox>),
    ImageSize(ImageSize),
}

impl Value {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Tensor(_) => "Tensor",
            Self::Mask(_) => "Mask",
            Self::Boxes(_) => "Boxes",
            Self::ImageSize(_) => "ImageSize",
        }
    }

    pub const fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Self::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub const fn as_mask(&self) -> Option<&ArgmaxMask> {
        match self {
            Self::Mask(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_boxes(&self) -> Option<&[RoiBox]> {
        match self {
            Self::Boxes(b) => Some(b),
            _ => None,
        }
    }

    pub const fn as_image_size(&self) -> Option<ImageSize> {
        match self {
            Self::ImageSize(s) => Some(*s),
            _ => None,
        }
    }

    /// 取出张量，类型不符时报错（`who`用于错误信息）
    pub fn expect_tensor(&self, who: &str) -> Result<&Tensor, GraphError> {
        self.as_tensor().ok_or_else(|| mismatch(who, "Tensor", self))
    }

    pub fn expect_mask(&self, who: &str) -> Result<&ArgmaxMask, GraphError> {
        self.as_mask().ok_or_else(|| mismatch(who, "Mask", self))
    }

    pub fn expect_boxes(&self, who: &str) -> Result<&[RoiBox], GraphError> {
        self.as_boxes().ok_or_else(|| mismatch(who, "Boxes", self))
    }

    pub fn expect_image_size(&self, who: &str) -> Result<ImageSize, GraphError> {
        self.as_image_size()
            .ok_or_else(|| mismatch(who, "ImageSize", self))
    }
}

fn mismatch(who: &str, expected: &str, got: &Value) -> GraphError {
    GraphError::InvalidOperation(format!(
        "{who}期望输入类型为{expected}，实际为{}",
        got.kind()
    ))
}

impl From<Tensor> for Value {
    fn from(t: Tensor) -> Self {
        Self::Tensor(t)
    }
}

impl From<ArgmaxMask> for Value {
    fn from(m: ArgmaxMask) -> Self {
        Self::Mask(m)
    }
}

impl From<Vec<RoiBox>> for Value {
    fn from(b: Vec<RoiBox>) -> Self {
        Self::Boxes(b)
    }
}

impl From<ImageSize> for Value {
    fn from(s: ImageSize) -> Self {
        Self::ImageSize(s)
    }
}
