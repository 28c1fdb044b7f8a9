/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : Graph 反向传播
 *
 * 按执行顺序的逆序逐个调用节点：
 * 1. 就绪检查：节点的可导输出必须都已有导数，否则推迟（不是错误）
 * 2. 节点计算对输入/参数的梯度，经`BackwardContext`按引用计数覆盖或累加
 * 3. 节省内存模式下，释放该节点非precious输出的值与导数
 */

use super::context::BackwardContext;
use super::types::{BackwardReport, NodeBackward, NodeId};
use super::{Graph, GraphError};
use crate::nn::Value;
use crate::nn::nodes::{NodeGrads, TraitNode};
use crate::tensor::Tensor;

impl Graph {
    /// 前向传播后紧接一次反向扫描
    ///
    /// # 参数
    /// - `inputs`: 输入变量的值
    /// - `der_outputs`: 反向扫描起点（通常是损失或网络输出）的导数
    ///
    /// # 返回
    /// 本次扫描中实际执行与被推迟的节点
    pub fn eval(
        &mut self,
        inputs: Vec<(&str, Value)>,
        der_outputs: Vec<(&str, Tensor)>,
    ) -> Result<BackwardReport, GraphError> {
        let order = self.run_forward(inputs, true)?;
        let mut ctx = self.backward_context();

        for (name, der) in der_outputs {
            let id = self.var_id(name)?;
            match &self.vars[id.0].value {
                Some(Value::Tensor(value)) if !value.is_same_shape(&der) => {
                    return Err(GraphError::ShapeMismatch {
                        expected: value.shape().to_vec(),
                        got: der.shape().to_vec(),
                        message: format!("变量`{name}`的导数须与其值同形状"),
                    });
                }
                Some(Value::Tensor(_)) => {}
                Some(other) => {
                    return Err(GraphError::InvalidOperation(format!(
                        "变量`{name}`的值类型为{}，不可导",
                        other.kind()
                    )));
                }
                None => log::warn!("变量`{name}`没有值，仍以给定导数作为反向起点"),
            }
            ctx.seed(id, der)?;
        }

        let mut report = BackwardReport::default();
        for id in order.into_iter().rev() {
            match self.backward_node(id, &mut ctx)? {
                NodeBackward::Done => report.executed.push(id),
                NodeBackward::Deferred => report.deferred.push(id),
            }
        }

        // 扫描全部成功后才写回，失败时图中的导数保持原样
        let (var_ders, param_ders) = ctx.into_ders();
        for (var, der) in self.vars.iter_mut().zip(var_ders) {
            var.der = der;
        }
        for (param, der) in self.params.iter_mut().zip(param_ders) {
            param.der = der;
        }
        Ok(report)
    }

    /// 为一次反向扫描新建上下文，参数导数以图中当前的导数为初值
    pub fn backward_context(&self) -> BackwardContext {
        let param_ders = self.params.iter().map(|p| p.der.clone()).collect();
        BackwardContext::new(self.vars.len(), param_ders, &self.config)
    }

    /// 对单个节点执行反向计算并把梯度写入上下文
    pub fn backward_node(
        &mut self,
        id: NodeId,
        ctx: &mut BackwardContext,
    ) -> Result<NodeBackward, GraphError> {
        let node = self
            .nodes
            .get(id.index())
            .ok_or_else(|| GraphError::InvalidOperation(format!("{id}不存在")))?;

        for k in node.node.differentiable_outputs() {
            let ready = node.outputs.get(k).is_some_and(|&v| ctx.der(v).is_some());
            if !ready {
                log::trace!(
                    "节点`{}`第{k}个输出的导数尚未就绪，推迟反向计算",
                    node.name
                );
                return Ok(NodeBackward::Deferred);
            }
        }

        let grads = {
            let inputs = self.input_values(node)?;
            let params: Vec<&Tensor> =
                node.params.iter().map(|p| &self.params[p.0].value).collect();
            let outputs: Vec<Option<&Value>> = node
                .outputs
                .iter()
                .map(|v| self.vars[v.0].value.as_ref())
                .collect();
            let der_outputs: Vec<Option<&Tensor>> =
                node.outputs.iter().map(|&v| ctx.der(v)).collect();
            node.node.backward(&inputs, &params, &outputs, &der_outputs)?
        };
        let NodeGrads {
            inputs: input_grads,
            params: param_grads,
        } = grads;
        if input_grads.len() != node.inputs.len() || param_grads.len() != node.params.len() {
            return Err(GraphError::ComputationError(format!(
                "节点`{}`返回了{}个输入梯度、{}个参数梯度，期望{}个、{}个",
                node.name,
                input_grads.len(),
                param_grads.len(),
                node.inputs.len(),
                node.params.len()
            )));
        }
        log::debug!("节点`{}`（{}）反向完成", node.name, node.node.type_name());

        let (input_ids, param_ids, output_ids) =
            (node.inputs.clone(), node.params.clone(), node.outputs.clone());
        for (var, grad) in input_ids.into_iter().zip(input_grads) {
            if let Some(grad) = grad {
                ctx.accumulate_var(var, grad)?;
            }
        }
        for (param, grad) in param_ids.into_iter().zip(param_grads) {
            if let Some(grad) = grad {
                ctx.accumulate_param(param, grad)?;
            }
        }

        if self.config.conserve_memory {
            for var in output_ids {
                let variable = &mut self.vars[var.0];
                if !variable.precious {
                    log::trace!("释放变量`{}`的值与导数", variable.name);
                    variable.value = None;
                    ctx.release(var);
                }
            }
        }
        Ok(NodeBackward::Done)
    }
}
