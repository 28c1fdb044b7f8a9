/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : 单次反向扫描的梯度累加上下文
 *
 * 每次扫描新建一个上下文，记录“变量 → (导数, 待处理引用计数)”。
 * 累加规则（变量v，计数c）：
 * - c == 0 或v尚无导数：覆盖
 * - 否则：相加
 * 写入后c加1。同一变量被多个下游节点使用时，每个下游的贡献恰好被加一次。
 * 参数的规则相同，但只有在不跨调用累加（accumulate_param_ders为false）时c == 0才触发覆盖。
 * 参数导数以图中已有的导数为初值暂存在上下文里，扫描成功后才连同变量导数一起写回图。
 */

use super::config::GraphConfig;
use super::types::{ParamId, VarId};
use super::GraphError;
use crate::tensor::Tensor;

/// 一次写入的方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accumulation {
    Overwritten,
    Added,
}

#[derive(Debug, Clone)]
pub struct BackwardContext {
    ders: Vec<Option<Tensor>>,
    param_ders: Vec<Option<Tensor>>,
    pending_var_refs: Vec<usize>,
    pending_param_refs: Vec<usize>,
    accumulate_param_ders: bool,
}

impl BackwardContext {
    /// `param_ders`为各参数在扫描开始前的导数
    pub fn new(num_vars: usize, param_ders: Vec<Option<Tensor>>, config: &GraphConfig) -> Self {
        let num_params = param_ders.len();
        Self {
            ders: vec![None; num_vars],
            param_ders,
            pending_var_refs: vec![0; num_vars],
            pending_param_refs: vec![0; num_params],
            accumulate_param_ders: config.accumulate_param_ders,
        }
    }

    pub fn der(&self, var: VarId) -> Option<&Tensor> {
        self.ders.get(var.0).and_then(Option::as_ref)
    }

    pub fn param_der(&self, param: ParamId) -> Option<&Tensor> {
        self.param_ders.get(param.0).and_then(Option::as_ref)
    }

    pub fn pending(&self, var: VarId) -> usize {
        self.pending_var_refs.get(var.0).copied().unwrap_or(0)
    }

    pub fn param_pending(&self, param: ParamId) -> usize {
        self.pending_param_refs.get(param.0).copied().unwrap_or(0)
    }

    /// 设置扫描起点的导数（计数不变）
    pub fn seed(&mut self, var: VarId, der: Tensor) -> Result<(), GraphError> {
        *self.var_slot(var)? = Some(der);
        Ok(())
    }

    /// 把一个下游节点对变量`var`的贡献按累加规则写入
    pub fn accumulate_var(
        &mut self,
        var: VarId,
        contribution: Tensor,
    ) -> Result<Accumulation, GraphError> {
        let pending = self.pending(var);
        let written = write(self.var_slot(var)?, contribution, pending == 0)?;
        self.pending_var_refs[var.0] += 1;
        Ok(written)
    }

    /// 把一个节点对参数`param`的贡献写入暂存的参数导数
    pub fn accumulate_param(
        &mut self,
        param: ParamId,
        contribution: Tensor,
    ) -> Result<Accumulation, GraphError> {
        let (Some(counter), Some(slot)) = (
            self.pending_param_refs.get_mut(param.0),
            self.param_ders.get_mut(param.0),
        ) else {
            return Err(GraphError::ParamNotFound(param.to_string()));
        };
        let overwrite = *counter == 0 && !self.accumulate_param_ders;
        let written = write(slot, contribution, overwrite)?;
        *counter += 1;
        Ok(written)
    }

    /// 丢弃变量的导数（节省内存模式下由图调用）
    pub fn release(&mut self, var: VarId) {
        if let Some(slot) = self.ders.get_mut(var.0) {
            *slot = None;
        }
    }

    /// 拆出（变量导数, 参数导数）
    pub fn into_ders(self) -> (Vec<Option<Tensor>>, Vec<Option<Tensor>>) {
        (self.ders, self.param_ders)
    }

    fn var_slot(&mut self, var: VarId) -> Result<&mut Option<Tensor>, GraphError> {
        self.ders
            .get_mut(var.0)
            .ok_or_else(|| GraphError::VariableNotFound(var.to_string()))
    }
}

fn write(
    slot: &mut Option<Tensor>,
    contribution: Tensor,
    overwrite: bool,
) -> Result<Accumulation, GraphError> {
    if let (false, Some(existing)) = (overwrite, slot.as_mut()) {
        if !existing.is_same_shape(&contribution) {
            return Err(GraphError::ShapeMismatch {
                expected: existing.shape().to_vec(),
                got: contribution.shape().to_vec(),
                message: "累加的导数须与已有导数同形状".to_string(),
            });
        }
        *existing += &contribution;
        return Ok(Accumulation::Added);
    }
    *slot = Some(contribution);
    Ok(Accumulation::Overwritten)
}
