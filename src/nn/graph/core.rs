/*
 * @Author       : 老董
 * @Date         : 2026-10-19
 * @Description  : Graph 核心操作：构建、访问器、执行顺序与前向传播
 */

use super::types::{GraphNode, NodeId, Param, ParamId, VarId, Variable};
use super::{Graph, GraphConfig, GraphError};
use crate::nn::Value;
use crate::nn::nodes::{NodeType, TraitNode};
use crate::tensor::Tensor;
use std::collections::HashMap;

impl Graph {
    // ========== 创建 ==========

    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self::with_name_and_config("default_graph", config)
    }

    pub fn with_name_and_config(name: &str, config: GraphConfig) -> Self {
        Self {
            name: name.to_string(),
            vars: Vec::new(),
            params: Vec::new(),
            nodes: Vec::new(),
            var_index: HashMap::new(),
            param_index: HashMap::new(),
            node_index: HashMap::new(),
            config,
        }
    }

    /// 添加一个节点。输入/输出变量与参数按名称引用，不存在时自动创建；
    /// 新参数以节点的`init_params()`初始化，同名参数在节点间共享。
    pub fn add_layer(
        &mut self,
        name: &str,
        node: impl Into<NodeType>,
        inputs: &[&str],
        outputs: &[&str],
        params: &[&str],
    ) -> Result<NodeId, GraphError> {
        let node: NodeType = node.into();
        if self.node_index.contains_key(name) {
            return Err(GraphError::DuplicateName(name.to_string()));
        }
        let type_name = node.type_name();
        for (what, got, expected) in [
            ("输入", inputs.len(), node.num_inputs()),
            ("输出", outputs.len(), node.num_outputs()),
            ("参数", params.len(), node.num_params()),
        ] {
            if got != expected {
                return Err(GraphError::InvalidOperation(format!(
                    "{type_name} 节点`{name}`需要{expected}个{what}，得到{got}个"
                )));
            }
        }
        for output in outputs {
            if let Some(producer) = self.producer_of_name(output) {
                return Err(GraphError::InvalidOperation(format!(
                    "变量`{output}`已由节点`{producer}`产生，不能重复作为输出"
                )));
            }
        }

        let input_ids = inputs.iter().map(|n| self.get_or_create_var(n)).collect();
        let output_ids = outputs.iter().map(|n| self.get_or_create_var(n)).collect();
        let init_values = node.init_params();
        let mut param_ids = Vec::with_capacity(params.len());
        for (i, param_name) in params.iter().enumerate() {
            let init = init_values.get(i).cloned().ok_or_else(|| {
                GraphError::InvalidOperation(format!("{type_name} 未提供第{i}个参数的初值"))
            })?;
            param_ids.push(self.get_or_create_param(param_name, init));
        }

        let id = NodeId(self.nodes.len());
        self.nodes.push(GraphNode {
            name: name.to_string(),
            node,
            inputs: input_ids,
            outputs: output_ids,
            params: param_ids,
        });
        self.node_index.insert(name.to_string(), id);
        log::debug!("图`{}`添加{type_name}节点`{name}`（{id}）", self.name);
        Ok(id)
    }

    fn get_or_create_var(&mut self, name: &str) -> VarId {
        if let Some(&id) = self.var_index.get(name) {
            return id;
        }
        let id = VarId(self.vars.len());
        self.vars.push(Variable::new(name));
        self.var_index.insert(name.to_string(), id);
        id
    }

    fn get_or_create_param(&mut self, name: &str, init: Tensor) -> ParamId {
        if let Some(&id) = self.param_index.get(name) {
            return id;
        }
        let id = ParamId(self.params.len());
        self.params.push(Param {
            name: name.to_string(),
            value: init,
            der: None,
        });
        self.param_index.insert(name.to_string(), id);
        id
    }

    fn producer_of_name(&self, var_name: &str) -> Option<&str> {
        let id = self.var_index.get(var_name)?;
        self.nodes
            .iter()
            .find(|n| n.outputs.contains(id))
            .map(|n| n.name.as_str())
    }

    // ========== 基础访问器 ==========

    pub fn name(&self) -> &str {
        &self.name
    }

    pub const fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub const fn config_mut(&mut self) -> &mut GraphConfig {
        &mut self.config
    }

    pub fn nodes_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_id(&self, name: &str) -> Result<NodeId, GraphError> {
        self.node_index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::InvalidOperation(format!("节点`{name}`不存在")))
    }

    pub fn node_name(&self, id: NodeId) -> Option<&str> {
        self.nodes.get(id.0).map(|n| n.name.as_str())
    }

    pub fn var_id(&self, name: &str) -> Result<VarId, GraphError> {
        self.var_index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::VariableNotFound(name.to_string()))
    }

    pub fn param_id(&self, name: &str) -> Result<ParamId, GraphError> {
        self.param_index
            .get(name)
            .copied()
            .ok_or_else(|| GraphError::ParamNotFound(name.to_string()))
    }

    /// 变量当前的值（可能尚未计算或已被释放）
    pub fn value(&self, name: &str) -> Result<Option<&Value>, GraphError> {
        Ok(self.vars[self.var_id(name)?.0].value.as_ref())
    }

    /// 变量当前的值，要求是张量
    pub fn tensor(&self, name: &str) -> Result<Option<&Tensor>, GraphError> {
        self.value(name)?
            .map(|v| v.expect_tensor(name))
            .transpose()
    }

    /// 变量在最近一次反向扫描后的导数
    pub fn der(&self, name: &str) -> Result<Option<&Tensor>, GraphError> {
        Ok(self.vars[self.var_id(name)?.0].der.as_ref())
    }

    pub fn set_value(&mut self, name: &str, value: impl Into<Value>) -> Result<(), GraphError> {
        let id = self.var_id(name)?;
        self.vars[id.0].value = Some(value.into());
        Ok(())
    }

    pub fn is_precious(&self, name: &str) -> Result<bool, GraphError> {
        Ok(self.vars[self.var_id(name)?.0].precious)
    }

    /// 标记变量为precious：节省内存模式下也保留其值与导数
    pub fn set_precious(&mut self, name: &str, precious: bool) -> Result<(), GraphError> {
        let id = self.var_id(name)?;
        self.vars[id.0].precious = precious;
        Ok(())
    }

    pub fn param_value(&self, name: &str) -> Result<&Tensor, GraphError> {
        Ok(&self.params[self.param_id(name)?.0].value)
    }

    pub fn set_param_value(&mut self, name: &str, value: Tensor) -> Result<(), GraphError> {
        let id = self.param_id(name)?;
        let param = &mut self.params[id.index()];
        if !param.value.is_same_shape(&value) {
            return Err(GraphError::ShapeMismatch {
                expected: param.value.shape().to_vec(),
                got: value.shape().to_vec(),
                message: format!("参数`{name}`的新值须与原值同形状"),
            });
        }
        param.value = value;
        Ok(())
    }

    pub fn param_der(&self, name: &str) -> Result<Option<&Tensor>, GraphError> {
        Ok(self.params[self.param_id(name)?.0].der.as_ref())
    }

    /// 清空所有参数的导数（跨调用累加时由训练循环在更新参数后调用）
    pub fn clear_param_ders(&mut self) {
        for param in &mut self.params {
            param.der = None;
        }
    }

    // ========== 执行顺序 ==========

    /// 节点的拓扑顺序：一个节点排在所有产生其输入变量的节点之后；无依赖关系时保持添加顺序
    pub fn execution_order(&self) -> Result<Vec<NodeId>, GraphError> {
        let mut producer: HashMap<VarId, usize> = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            for &out in &node.outputs {
                producer.insert(out, i);
            }
        }
        let deps: Vec<Vec<usize>> = self
            .nodes
            .iter()
            .map(|n| n.inputs.iter().filter_map(|v| producer.get(v).copied()).collect())
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut scheduled = vec![false; self.nodes.len()];
        while order.len() < self.nodes.len() {
            let next = (0..self.nodes.len())
                .find(|&i| !scheduled[i] && deps[i].iter().all(|&d| scheduled[d]));
            let Some(i) = next else {
                let stuck: Vec<&str> = (0..self.nodes.len())
                    .filter(|&i| !scheduled[i])
                    .map(|i| self.nodes[i].name.as_str())
                    .collect();
                return Err(GraphError::InvalidOperation(format!(
                    "计算图存在环，无法排序的节点：{stuck:?}"
                )));
            };
            scheduled[i] = true;
            order.push(NodeId(i));
        }
        Ok(order)
    }

    // ========== 前向传播 ==========

    /// 设置输入并按拓扑顺序执行所有节点（仅推理，不计算导数）
    pub fn forward(&mut self, inputs: Vec<(&str, Value)>) -> Result<(), GraphError> {
        self.run_forward(inputs, false).map(|_| ())
    }

    pub(super) fn run_forward(
        &mut self,
        inputs: Vec<(&str, Value)>,
        computing_derivative: bool,
    ) -> Result<Vec<NodeId>, GraphError> {
        for (name, value) in inputs {
            self.set_value(name, value)?;
        }
        for var in &mut self.vars {
            var.der = None;
        }
        let order = self.execution_order()?;
        let release = self.config.conserve_memory && !computing_derivative;

        // 每个变量还剩多少个消费者未执行
        let mut pending_consumers = vec![0usize; self.vars.len()];
        for node in &self.nodes {
            for &input in &node.inputs {
                pending_consumers[input.0] += 1;
            }
        }

        for &id in &order {
            let outputs = self.forward_node(id)?;
            let node = &self.nodes[id.0];
            let (output_ids, input_ids) = (node.outputs.clone(), node.inputs.clone());
            for (var, value) in output_ids.iter().zip(outputs) {
                self.vars[var.0].value = Some(value);
            }
            if release {
                for input in input_ids {
                    pending_consumers[input.0] -= 1;
                    let var = &mut self.vars[input.0];
                    if pending_consumers[input.0] == 0 && !var.precious && var.value.is_some() {
                        log::trace!("释放变量`{}`的值", var.name);
                        var.value = None;
                    }
                }
            }
        }
        Ok(order)
    }

    fn forward_node(&self, id: NodeId) -> Result<Vec<Value>, GraphError> {
        let node = &self.nodes[id.0];
        let inputs = self.input_values(node)?;
        let params: Vec<&Tensor> = node.params.iter().map(|p| &self.params[p.0].value).collect();

        let outputs = node.node.forward(&inputs, &params)?;
        if outputs.len() != node.outputs.len() {
            return Err(GraphError::ComputationError(format!(
                "节点`{}`产生了{}个输出，期望{}个",
                node.name,
                outputs.len(),
                node.outputs.len()
            )));
        }
        log::debug!("节点`{}`（{}）前向完成", node.name, node.node.type_name());
        Ok(outputs)
    }

    pub(super) fn input_values<'a>(&'a self, node: &GraphNode) -> Result<Vec<&'a Value>, GraphError> {
        node.inputs
            .iter()
            .map(|v| {
                let var = &self.vars[v.0];
                var.value.as_ref().ok_or_else(|| {
                    GraphError::ComputationError(format!(
                        "节点`{}`的输入变量`{}`没有值",
                        node.name, var.name
                    ))
                })
            })
            .collect()
    }
}
