use thiserror::Error;

/// 张量层面的错误（与计算图无关）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TensorError {
    #[error("数据长度{data_len}与形状{shape:?}所需的元素个数不一致")]
    DataShapeMismatch { data_len: usize, shape: Vec<usize> },
    // 张量二元运算
    #[error(
        "形状不一致，故无法{operator}：第一个张量的形状为{tensor1_shape:?}，第二个张量的形状为{tensor2_shape:?}"
    )]
    OperatorError {
        operator: Operator,
        tensor1_shape: Vec<usize>,
        tensor2_shape: Vec<usize>,
    },
    #[error("张量位于{0}，该运算只能在主机（host）内存上执行")]
    NotOnHost(crate::tensor::Placement),
}

/// 张量的二元运算符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    AddAssign,
    Mul,
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let operation_name = match self {
            Self::Add => "相加",
            Self::AddAssign => "自相加",
            Self::Mul => "逐元素相乘",
        };
        write!(f, "{operation_name}")
    }
}
