/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 张量（Tensor）：基于ndarray的f32多维数组，附带显式的存放位置（placement）标记
 */

use ndarray::{Array, ArrayD, IxDyn};
use rand::distributions::{Distribution, Uniform};
use serde::{Deserialize, Serialize};

use crate::errors::TensorError;

mod ops;
mod placement;
mod print;
mod property;

pub use placement::Placement;


/// 定义张量的结构体。其可以是标量、向量、矩阵或更高维度的数组。
/// 注：算法层面（如ROI池化）只接受位于主机内存（`Placement::Host`）上的张量，
/// 设备上的张量需先经`to_host()`显式搬运。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    data: ArrayD<f32>,
    #[serde(default)]
    placement: Placement,
}

impl Tensor {
    /// 创建一个位于主机内存上的张量。
    /// 注：`data`的长度必须和`shape`中所有元素的乘积相等，否则会panic。
    pub fn new(data: &[f32], shape: &[usize]) -> Self {
        match Self::try_new(data, shape) {
            Ok(tensor) => tensor,
            Err(e) => panic!("{e}"),
        }
    }

    /// `new`的非panic版本
    pub fn try_new(data: &[f32], shape: &[usize]) -> Result<Self, TensorError> {
        let data = Array::from_shape_vec(IxDyn(shape), data.to_vec()).map_err(|_| {
            TensorError::DataShapeMismatch {
                data_len: data.len(),
                shape: shape.to_vec(),
            }
        })?;
        Ok(Self::from_array(data))
    }

    pub fn from_array(data: ArrayD<f32>) -> Self {
        Self {
            data,
            placement: Placement::Host,
        }
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::from_array(ArrayD::zeros(IxDyn(shape)))
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self::from_array(ArrayD::ones(IxDyn(shape)))
    }

    /// 创建一个随机张量，其值在[min, max]的闭区间
    pub fn new_random(min: f32, max: f32, shape: &[usize]) -> Self {
        let mut rng = rand::thread_rng();
        let uniform = Uniform::from(min..=max);
        let data = (0..shape.iter().product::<usize>())
            .map(|_| uniform.sample(&mut rng))
            .collect::<Vec<_>>();
        Self::new(&data, shape)
    }

    /// 创建一个形状为`shape`、值为0,1,2...（按行优先递增）的张量，多用于单元测试
    pub fn arange(shape: &[usize]) -> Self {
        let len = shape.iter().product::<usize>();
        let data = (0..len).map(|x| x as f32).collect::<Vec<_>>();
        Self::new(&data, shape)
    }
}
