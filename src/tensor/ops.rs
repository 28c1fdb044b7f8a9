/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 张量的逐元素运算。仅支持形状严格一致的两个张量（不做广播），
 *                 以及张量与纯数之间的运算。结果的存放位置与左操作数一致。
 */

use crate::errors::{Operator, TensorError};
use crate::tensor::Tensor;
use ndarray::{Array, IxDyn};
use std::ops::{Add, AddAssign, Index, IndexMut, Mul};

impl Tensor {
    fn assert_same_shape(&self, other: &Self, operator: Operator) {
        assert!(
            self.is_same_shape(other),
            "{}",
            TensorError::OperatorError {
                operator,
                tensor1_shape: self.shape().to_vec(),
                tensor2_shape: other.shape().to_vec(),
            }
        );
    }

    /// `+=`的非panic版本，形状不一致时返回错误而不修改自身
    pub fn try_add_assign(&mut self, other: &Self) -> Result<(), TensorError> {
        if !self.is_same_shape(other) {
            return Err(TensorError::OperatorError {
                operator: Operator::AddAssign,
                tensor1_shape: self.shape().to_vec(),
                tensor2_shape: other.shape().to_vec(),
            });
        }
        self.data += &other.data;
        Ok(())
    }

    /// 逐元素映射
    pub fn mapv(&self, f: impl Fn(f32) -> f32) -> Self {
        Self {
            data: self.data.mapv(f),
            placement: self.placement,
        }
    }

    /// 逐元素按条件取值：满足`cond`的元素取`if_true(x)`，否则取`if_false(x)`
    pub fn where_with_f32(
        &self,
        cond: impl Fn(f32) -> bool,
        if_true: impl Fn(f32) -> f32,
        if_false: impl Fn(f32) -> f32,
    ) -> Self {
        self.mapv(|x| if cond(x) { if_true(x) } else { if_false(x) })
    }
}

/*↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓加法↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓*/
impl Add for &Tensor {
    type Output = Tensor;

    fn add(self, other: &Tensor) -> Tensor {
        self.assert_same_shape(other, Operator::Add);
        Tensor {
            data: &self.data + &other.data,
            placement: self.placement,
        }
    }
}

impl Add for Tensor {
    type Output = Tensor;

    fn add(self, other: Tensor) -> Tensor {
        &self + &other
    }
}

impl AddAssign<&Tensor> for Tensor {
    fn add_assign(&mut self, other: &Tensor) {
        self.assert_same_shape(other, Operator::AddAssign);
        self.data += &other.data;
    }
}
/*↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑加法↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑*/

/*↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓乘法↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓*/
impl Mul for &Tensor {
    type Output = Tensor;

    /// 逐元素相乘（Hadamard积）
    fn mul(self, other: &Tensor) -> Tensor {
        self.assert_same_shape(other, Operator::Mul);
        Tensor {
            data: &self.data * &other.data,
            placement: self.placement,
        }
    }
}

impl Mul<f32> for &Tensor {
    type Output = Tensor;

    fn mul(self, scalar: f32) -> Tensor {
        Tensor {
            data: &self.data * scalar,
            placement: self.placement,
        }
    }
}

impl Mul<f32> for Tensor {
    type Output = Tensor;

    fn mul(self, scalar: f32) -> Tensor {
        &self * scalar
    }
}
/*↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑乘法↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑*/

/*↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓索引↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓↓*/
impl<const N: usize> Index<[usize; N]> for Tensor {
    type Output = f32;

    fn index(&self, index: [usize; N]) -> &f32 {
        &self.data[&index[..]]
    }
}

impl<const N: usize> IndexMut<[usize; N]> for Tensor {
    fn index_mut(&mut self, index: [usize; N]) -> &mut f32 {
        &mut self.data[&index[..]]
    }
}
/*↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑索引↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑↑*/

impl From<Array<f32, IxDyn>> for Tensor {
    fn from(data: Array<f32, IxDyn>) -> Self {
        Self::from_array(data)
    }
}
